//! Gate policy: scope limits, denylist and lint settings.
//!
//! Loaded from TOML. Every field has a built-in default, so an absent file
//! or a partial file is valid.

use crate::core::error::PatchGateError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const POLICY_REL_PATH: &str = ".patchgate/policy.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub preflight: PreflightPolicy,
    pub lint: LintPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightPolicy {
    pub soft_files: u64,
    pub soft_lines: u64,
    pub hard_files: u64,
    pub hard_lines: u64,
    /// Raw payload size above which a slow review lane is recommended.
    pub soft_payload_bytes: usize,
    pub hard_new_file_bytes: u64,
    pub hard_new_files_total_bytes: u64,
    pub deny_prefixes: Vec<String>,
}

impl Default for PreflightPolicy {
    fn default() -> Self {
        Self {
            soft_files: 3,
            soft_lines: 80,
            hard_files: 6,
            hard_lines: 200,
            soft_payload_bytes: 200 * 1024,
            hard_new_file_bytes: 2 * 1024 * 1024,
            hard_new_files_total_bytes: 5 * 1024 * 1024,
            deny_prefixes: [".git/", "0_SYSTEM/", "dist/", "runner/", "sandbox/", "gui/"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LintPolicy {
    pub max_columns: usize,
    pub timeout_secs: u64,
    /// Compiler used for standalone crate roots.
    pub rustc: String,
    /// Used for sources that belong to a Cargo package.
    pub cargo: String,
    pub edition: String,
}

impl Default for LintPolicy {
    fn default() -> Self {
        Self {
            max_columns: 120,
            timeout_secs: 120,
            rustc: "rustc".to_string(),
            cargo: "cargo".to_string(),
            edition: "2021".to_string(),
        }
    }
}

impl LintPolicy {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub fn parse_policy(raw: &str) -> Result<PolicyConfig, PatchGateError> {
    let config: PolicyConfig = toml::from_str(raw)?;
    if config.preflight.soft_files > config.preflight.hard_files
        || config.preflight.soft_lines > config.preflight.hard_lines
    {
        return Err(PatchGateError::ValidationError(format!(
            "soft scope limits must not exceed hard limits (files {}/{}, lines {}/{})",
            config.preflight.soft_files,
            config.preflight.hard_files,
            config.preflight.soft_lines,
            config.preflight.hard_lines
        )));
    }
    Ok(config)
}

/// Resolve policy: an explicit file wins, then `<repo>/.patchgate/policy.toml`,
/// then built-in defaults.
pub fn load_policy(
    explicit: Option<&Path>,
    repo_root: &Path,
) -> Result<(PolicyConfig, Option<PathBuf>), PatchGateError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(PatchGateError::NotFound(format!(
                "policy file {}",
                path.display()
            )));
        }
        let raw = fs::read_to_string(path)?;
        return Ok((parse_policy(&raw)?, Some(path.to_path_buf())));
    }

    let candidate = repo_root.join(POLICY_REL_PATH);
    if candidate.exists() {
        let raw = fs::read_to_string(&candidate)?;
        return Ok((parse_policy(&raw)?, Some(candidate)));
    }

    Ok((PolicyConfig::default(), None))
}
