//! Gates and shared primitives.
//!
//! Leaf-first: `gate_result` and `schema` have no crate dependencies;
//! `validator` and `preflight` build the patch-package admission path;
//! `lint_compile` gates source trees independently.

pub mod error;
pub mod evidence;
pub mod gate_result;
pub mod intake;
pub mod lint_compile;
pub mod output;
pub mod paths;
pub mod policy;
pub mod preflight;
pub mod registry;
pub mod repo_probe;
pub mod schema;
pub mod time;
pub mod validator;
