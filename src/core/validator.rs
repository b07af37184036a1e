//! Patch package schema validation.
//!
//! `validate_payload` parses the raw JSON once and then runs every field
//! check without short-circuiting, so a rejected submission carries its
//! complete diagnostic set. Only a parse failure (or a non-object payload)
//! stops early, because there is no document left to inspect.
//!
//! On success the caller receives a typed [`PatchPackage`] decorated with
//! the derived sizes preflight needs. On failure no document is returned.

use crate::core::gate_result::{EXIT_PRE, GateResult};
use crate::core::paths;
use crate::core::schema::{Field, PROVENANCE_REQUIRED, SCHEMA_VERSION};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

static HEX40: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{40}$").expect("valid sha regex"));

type Object = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScopeSize {
    pub files: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    pub llm_vendor: String,
    pub llm_model: String,
    pub timestamp_utc: String,
    pub prompt_header: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFile {
    /// Path as submitted.
    pub path: String,
    /// NFC-composed, `/`-separated form used for policy checks.
    pub normalized_path: String,
    pub mode: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSet {
    DiffUnified(String),
    NewFiles(Vec<NewFile>),
}

/// A structurally valid patch package.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchPackage {
    pub schema_version: String,
    pub base_branch: String,
    pub base_commit_sha: String,
    pub commit_message: String,
    pub scope_size: ScopeSize,
    pub provenance: Provenance,
    pub change_set: ChangeSet,
    pub affected_tests: Option<Value>,
    pub acceptance_checks: Option<Value>,
    pub notes_for_reviewer: Option<Value>,
    /// UTF-8 byte length of the raw payload.
    pub raw_len: Option<usize>,
    /// Sum of UTF-8 byte lengths of every `new_files[i].content`.
    pub new_files_total_bytes: u64,
    /// Hex SHA-256 of the raw payload, set by the host after validation.
    /// Submitted internal keys are never trusted.
    pub payload_sha256: Option<String>,
}

impl PatchPackage {
    pub fn diff(&self) -> Option<&str> {
        match &self.change_set {
            ChangeSet::DiffUnified(diff) => Some(diff),
            ChangeSet::NewFiles(_) => None,
        }
    }

    pub fn new_files(&self) -> &[NewFile] {
        match &self.change_set {
            ChangeSet::NewFiles(files) => files,
            ChangeSet::DiffUnified(_) => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub result: GateResult,
    pub document: Option<PatchPackage>,
}

struct NewFilesCheck {
    files: Vec<NewFile>,
    total_bytes: u64,
}

pub fn validate_payload(payload: &str) -> Validation {
    let mut res = GateResult::new(EXIT_PRE);

    let doc: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            res.add_error(format!("JSON parse error: {}", e));
            return Validation {
                result: res,
                document: None,
            };
        }
    };
    let Some(obj) = doc.as_object() else {
        res.add_error("payload must be a JSON object");
        return Validation {
            result: res,
            document: None,
        };
    };

    check_key_set(obj, &mut res);
    let schema_version = check_schema_version(obj, &mut res);
    let base_branch = check_text(obj, Field::BaseBranch, false, &mut res);
    let base_commit_sha = check_commit_sha(obj, &mut res);
    let commit_message = check_text(obj, Field::CommitMessage, true, &mut res);
    let scope_size = check_scope_size(obj, &mut res);
    let provenance = check_provenance(obj, &mut res);
    let new_files = check_new_files(obj, &mut res);
    let diff = check_diff_unified(obj, &mut res);
    check_change_set_xor(obj, &mut res);

    let new_files_total_bytes = new_files.as_ref().map_or(0, |nf| nf.total_bytes);
    let change_set = match (diff, new_files) {
        (Some(d), None) => Some(ChangeSet::DiffUnified(d)),
        (None, Some(nf)) => Some(ChangeSet::NewFiles(nf.files)),
        _ => None,
    };

    debug!(
        errors = res.errors().len(),
        raw_len = payload.len(),
        "schema validation finished"
    );

    if !res.ok() {
        return Validation {
            result: res,
            document: None,
        };
    }

    let (
        Some(schema_version),
        Some(base_branch),
        Some(base_commit_sha),
        Some(commit_message),
        Some(scope_size),
        Some(provenance),
        Some(change_set),
    ) = (
        schema_version,
        base_branch,
        base_commit_sha,
        commit_message,
        scope_size,
        provenance,
        change_set,
    )
    else {
        res.add_error("document could not be assembled from the validated fields");
        return Validation {
            result: res,
            document: None,
        };
    };

    let document = PatchPackage {
        schema_version,
        base_branch,
        base_commit_sha,
        commit_message,
        scope_size,
        provenance,
        change_set,
        affected_tests: obj.get(Field::AffectedTests.key()).cloned(),
        acceptance_checks: obj.get(Field::AcceptanceChecks.key()).cloned(),
        notes_for_reviewer: obj.get(Field::NotesForReviewer.key()).cloned(),
        raw_len: Some(payload.len()),
        new_files_total_bytes,
        payload_sha256: None,
    };

    res.add_evidence("Schema OK");
    Validation {
        result: res,
        document: Some(document),
    }
}

fn check_key_set(obj: &Object, res: &mut GateResult) {
    let missing: Vec<&str> = Field::required()
        .filter(|f| !obj.contains_key(f.key()))
        .map(Field::key)
        .collect();
    if !missing.is_empty() {
        res.add_error(format!("missing required fields: {}", missing.join(", ")));
    }

    let mut unexpected: Vec<&str> = obj
        .keys()
        .filter(|k| Field::from_key(k).is_none())
        .map(String::as_str)
        .collect();
    unexpected.sort_unstable();
    if !unexpected.is_empty() {
        res.add_error(format!("unexpected fields: {}", unexpected.join(", ")));
    }
}

fn check_schema_version(obj: &Object, res: &mut GateResult) -> Option<String> {
    match obj.get(Field::SchemaVersion.key()).and_then(Value::as_str) {
        Some(v) if v == SCHEMA_VERSION => Some(v.to_string()),
        _ => {
            res.add_error(format!("schema_version must equal \"{}\"", SCHEMA_VERSION));
            None
        }
    }
}

fn check_text(obj: &Object, field: Field, trim: bool, res: &mut GateResult) -> Option<String> {
    let text = obj.get(field.key()).and_then(Value::as_str);
    match text.map(|s| (s, if trim { s.trim() } else { s })) {
        Some((s, significant)) if !significant.is_empty() => Some(s.to_string()),
        _ => {
            res.add_error(format!("{} must be a non-empty string", field.key()));
            None
        }
    }
}

fn check_commit_sha(obj: &Object, res: &mut GateResult) -> Option<String> {
    match obj.get(Field::BaseCommitSha.key()).and_then(Value::as_str) {
        Some(sha) if HEX40.is_match(sha) => Some(sha.to_string()),
        _ => {
            res.add_error("base_commit_sha must be exactly 40 hex characters");
            None
        }
    }
}

fn check_scope_size(obj: &Object, res: &mut GateResult) -> Option<ScopeSize> {
    let Some(ss) = obj.get(Field::ScopeSize.key()).and_then(Value::as_object) else {
        res.add_error("scope_size must be an object {files: int, lines: int}");
        return None;
    };
    let (Some(files), Some(lines)) = (
        ss.get("files").and_then(as_integer),
        ss.get("lines").and_then(as_integer),
    ) else {
        res.add_error("scope_size.files and scope_size.lines must be integers");
        return None;
    };
    match (u64::try_from(files), u64::try_from(lines)) {
        (Ok(files), Ok(lines)) => Some(ScopeSize { files, lines }),
        _ => {
            res.add_error("scope_size must not be negative");
            None
        }
    }
}

fn as_integer(v: &Value) -> Option<i128> {
    v.as_u64()
        .map(i128::from)
        .or_else(|| v.as_i64().map(i128::from))
}

fn check_provenance(obj: &Object, res: &mut GateResult) -> Option<Provenance> {
    let Some(p) = obj.get(Field::Provenance.key()).and_then(Value::as_object) else {
        res.add_error("provenance must be an object");
        return None;
    };

    let mut values = Vec::with_capacity(PROVENANCE_REQUIRED.len());
    for key in PROVENANCE_REQUIRED {
        match p.get(key).and_then(Value::as_str) {
            Some(s) if !s.is_empty() => values.push(s.to_string()),
            _ => res.add_error(format!("provenance.{} must be a non-empty string", key)),
        }
    }

    let prompt_header = match p.get("prompt_header") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            res.add_error("provenance.prompt_header must be a string when present");
            None
        }
    };

    let [llm_vendor, llm_model, timestamp_utc]: [String; 3] = values.try_into().ok()?;
    Some(Provenance {
        llm_vendor,
        llm_model,
        timestamp_utc,
        prompt_header,
    })
}

fn check_new_files(obj: &Object, res: &mut GateResult) -> Option<NewFilesCheck> {
    let entries = match obj.get(Field::NewFiles.key()) {
        None | Some(Value::Null) => return None,
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            res.add_error("new_files must be a list");
            return None;
        }
    };

    let mut files = Vec::with_capacity(entries.len());
    let mut total_bytes: u64 = 0;
    for (i, entry) in entries.iter().enumerate() {
        let Some(item) = entry.as_object() else {
            res.add_error(format!("new_files[{}] must be an object", i));
            continue;
        };
        let (Some(path), Some(mode), Some(content)) = (
            item.get("path").and_then(Value::as_str),
            item.get("mode").and_then(Value::as_str),
            item.get("content").and_then(Value::as_str),
        ) else {
            res.add_error(format!(
                "new_files[{}] path, mode and content must be strings",
                i
            ));
            continue;
        };

        if content.contains('\0') {
            res.add_error(format!(
                "new_files[{}] content contains a NUL byte (binary content is not allowed)",
                i
            ));
        }
        match paths::normalize_relative(path) {
            Ok(normalized_path) => files.push(NewFile {
                path: path.to_string(),
                normalized_path,
                mode: mode.to_string(),
                content: content.to_string(),
            }),
            Err(violations) => {
                for violation in violations {
                    res.add_error(format!(
                        "new_files[{}] invalid path {:?}: {}",
                        i, path, violation
                    ));
                }
            }
        }
        total_bytes += content.len() as u64;
    }

    Some(NewFilesCheck { files, total_bytes })
}

fn check_diff_unified(obj: &Object, res: &mut GateResult) -> Option<String> {
    match obj.get(Field::DiffUnified.key()) {
        None | Some(Value::Null) => None,
        Some(Value::String(diff)) => {
            if diff.contains('\0') {
                res.add_error("diff_unified contains a NUL byte (binary content is not allowed)");
            }
            Some(diff.clone())
        }
        Some(_) => {
            res.add_error("diff_unified must be a string");
            None
        }
    }
}

fn check_change_set_xor(obj: &Object, res: &mut GateResult) {
    let have_diff = obj
        .get(Field::DiffUnified.key())
        .is_some_and(Value::is_string);
    let have_new = obj.get(Field::NewFiles.key()).is_some_and(Value::is_array);
    if have_diff == have_new {
        res.add_error("exactly one of diff_unified or new_files is required");
    }
}
