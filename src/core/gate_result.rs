//! Uniform gate outcome.
//!
//! Every gate returns a [`GateResult`]. The two recording operations keep
//! `ok == errors.is_empty()` and `exit_code == 0 <=> ok` true after every
//! mutation, so a caller can trust any of the three views.

use serde::Serialize;

/// Exit code of the patch-package gates (schema validation and preflight).
pub const EXIT_PRE: i32 = 39;

/// Exit code of the lint/compile gate.
pub const EXIT_LINTCOMPILE: i32 = 40;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateResult {
    ok: bool,
    exit_code: i32,
    errors: Vec<String>,
    evidence: Vec<String>,
    #[serde(skip)]
    failure_code: i32,
}

impl GateResult {
    /// Fresh passing result for a gate whose failure exit code is `failure_code`.
    pub fn new(failure_code: i32) -> Self {
        Self {
            ok: true,
            exit_code: 0,
            errors: Vec::new(),
            evidence: Vec::new(),
            failure_code,
        }
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
        self.ok = false;
        self.exit_code = self.failure_code;
    }

    pub fn add_evidence(&mut self, msg: impl Into<String>) {
        self.evidence.push(msg.into());
    }

    pub fn ok(&self) -> bool {
        self.ok
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn evidence(&self) -> &[String] {
        &self.evidence
    }

    pub fn has_error_containing(&self, needle: &str) -> bool {
        self.errors.iter().any(|e| e.contains(needle))
    }

    pub fn has_evidence_containing(&self, needle: &str) -> bool {
        self.evidence.iter().any(|e| e.contains(needle))
    }
}
