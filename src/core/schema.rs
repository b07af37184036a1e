//! Closed field schema for patch package v1.
//!
//! The set of accepted top-level keys is an enum so that adding a field
//! forces every `match` over [`Field`] to be revisited.

pub const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    SchemaVersion,
    BaseBranch,
    BaseCommitSha,
    CommitMessage,
    ScopeSize,
    Provenance,
    DiffUnified,
    NewFiles,
    AffectedTests,
    AcceptanceChecks,
    NotesForReviewer,
    RawLen,
    NewFilesTotalBytes,
    PayloadSha256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Required,
    Optional,
    /// Exactly one member of this group must be present.
    ChangeSet,
    /// Attached by the pipeline itself; tolerated on input, overwritten.
    Internal,
}

impl Field {
    pub const ALL: [Field; 14] = [
        Field::SchemaVersion,
        Field::BaseBranch,
        Field::BaseCommitSha,
        Field::CommitMessage,
        Field::ScopeSize,
        Field::Provenance,
        Field::DiffUnified,
        Field::NewFiles,
        Field::AffectedTests,
        Field::AcceptanceChecks,
        Field::NotesForReviewer,
        Field::RawLen,
        Field::NewFilesTotalBytes,
        Field::PayloadSha256,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::SchemaVersion => "schema_version",
            Field::BaseBranch => "base_branch",
            Field::BaseCommitSha => "base_commit_sha",
            Field::CommitMessage => "commit_message",
            Field::ScopeSize => "scope_size",
            Field::Provenance => "provenance",
            Field::DiffUnified => "diff_unified",
            Field::NewFiles => "new_files",
            Field::AffectedTests => "affected_tests",
            Field::AcceptanceChecks => "acceptance_checks",
            Field::NotesForReviewer => "notes_for_reviewer",
            Field::RawLen => "_raw_len",
            Field::NewFilesTotalBytes => "_nf_total_bytes",
            Field::PayloadSha256 => "_payload_sha256",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::SchemaVersion
            | Field::BaseBranch
            | Field::BaseCommitSha
            | Field::CommitMessage
            | Field::ScopeSize
            | Field::Provenance => FieldKind::Required,
            Field::DiffUnified | Field::NewFiles => FieldKind::ChangeSet,
            Field::AffectedTests | Field::AcceptanceChecks | Field::NotesForReviewer => {
                FieldKind::Optional
            }
            Field::RawLen | Field::NewFilesTotalBytes | Field::PayloadSha256 => {
                FieldKind::Internal
            }
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn required() -> impl Iterator<Item = Field> {
        Field::ALL
            .into_iter()
            .filter(|f| f.kind() == FieldKind::Required)
    }
}

/// Provenance sub-fields that must be non-empty strings.
pub const PROVENANCE_REQUIRED: [&str; 3] = ["llm_vendor", "llm_model", "timestamp_utc"];

/// Reserved filename characters rejected inside any path segment.
pub const RESERVED_PATH_CHARS: [char; 7] = ['<', '>', ':', '"', '|', '?', '*'];
