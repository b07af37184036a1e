//! Evidence record for a packaged tree.
//!
//! The archive itself is produced elsewhere; this module hashes it and
//! writes the record other components consume:
//! `{archive, sha256, entries, size, ts_utc}`.

use crate::core::error::PatchGateError;
use crate::core::time;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const EVIDENCE_FILE: &str = "evidence.json";
pub const HISTORY_FILE: &str = "history.jsonl";

const CHUNK: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub archive: String,
    pub sha256: String,
    pub entries: u64,
    pub size: u64,
    pub ts_utc: String,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryLine<'a> {
    #[serde(flatten)]
    record: &'a EvidenceRecord,
    summary: String,
    ok: bool,
}

pub fn sha256_file(path: &Path) -> Result<String, PatchGateError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

impl EvidenceRecord {
    pub fn for_archive(archive: &Path, entries: u64) -> Result<Self, PatchGateError> {
        if !archive.is_file() {
            return Err(PatchGateError::NotFound(format!(
                "archive {}",
                archive.display()
            )));
        }
        let resolved = fs::canonicalize(archive)?;
        Ok(Self {
            archive: resolved.to_string_lossy().to_string(),
            sha256: sha256_file(&resolved)?,
            entries,
            size: fs::metadata(&resolved)?.len(),
            ts_utc: time::utc_now_seconds(),
        })
    }

    pub fn summary(&self) -> String {
        let short: String = self.sha256.chars().take(7).collect();
        format!(
            "package ready: ENTRIES={}, SIZE={}, SHA={}",
            self.entries, self.size, short
        )
    }
}

pub fn write_evidence_json(
    record: &EvidenceRecord,
    dest_dir: &Path,
) -> Result<PathBuf, PatchGateError> {
    fs::create_dir_all(dest_dir)?;
    let path = dest_dir.join(EVIDENCE_FILE);
    fs::write(&path, serde_json::to_string_pretty(record)?)?;
    Ok(path)
}

/// Append one JSON line for `record` to `<dir>/history.jsonl`.
pub fn append_history(record: &EvidenceRecord, dir: &Path) -> Result<PathBuf, PatchGateError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(HISTORY_FILE);
    let line = HistoryLine {
        record,
        summary: record.summary(),
        ok: true,
    };
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", serde_json::to_string(&line)?)?;
    Ok(path)
}
