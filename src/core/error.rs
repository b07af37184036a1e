use std::io;
use thiserror::Error;

/// Host-level failures. Submission problems never surface here; gates record
/// them in a [`crate::core::gate_result::GateResult`] instead.
#[derive(Error, Debug)]
pub enum PatchGateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
}
