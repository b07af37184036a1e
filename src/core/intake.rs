//! Admission pipeline: payload text -> schema validation -> preflight.

use crate::core::gate_result::GateResult;
use crate::core::policy::PreflightPolicy;
use crate::core::preflight;
use crate::core::registry::SubmissionRegistry;
use crate::core::repo_probe::RepoProbe;
use crate::core::validator::{self, PatchPackage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct Admission {
    pub payload_sha256: String,
    pub schema: GateResult,
    /// Absent when schema validation rejected the payload.
    pub preflight: Option<GateResult>,
    #[serde(skip)]
    pub document: Option<PatchPackage>,
}

impl Admission {
    pub fn admitted(&self) -> bool {
        self.schema.ok() && self.preflight.as_ref().is_some_and(GateResult::ok)
    }

    /// The result that decided the outcome: preflight when it ran, else schema.
    pub fn decisive(&self) -> &GateResult {
        self.preflight.as_ref().unwrap_or(&self.schema)
    }

    pub fn exit_code(&self) -> i32 {
        self.decisive().exit_code()
    }
}

pub fn payload_sha256(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn admit(
    raw: &str,
    probe: &dyn RepoProbe,
    registry: &SubmissionRegistry,
    policy: &PreflightPolicy,
) -> Admission {
    let hash = payload_sha256(raw);
    let validation = validator::validate_payload(raw);

    let Some(mut document) = validation.document else {
        info!(payload = %hash, "payload rejected by schema validation");
        return Admission {
            payload_sha256: hash,
            schema: validation.result,
            preflight: None,
            document: None,
        };
    };

    document.payload_sha256 = Some(hash.clone());
    let result = preflight::preflight(&document, probe, registry, policy);
    info!(payload = %hash, admitted = result.ok(), "admission decided");
    Admission {
        payload_sha256: hash,
        schema: validation.result,
        preflight: Some(result),
        document: Some(document),
    }
}
