//! Preflight gate: repository state, scope limits, denylist and duplicate
//! suppression for a schema-valid patch package.
//!
//! All checks run and accumulate into one [`GateResult`]. The gate never
//! returns early and never mutates the repository.

use crate::core::gate_result::{EXIT_PRE, GateResult};
use crate::core::policy::PreflightPolicy;
use crate::core::registry::SubmissionRegistry;
use crate::core::repo_probe::RepoProbe;
use crate::core::validator::PatchPackage;
use tracing::{debug, info};

/// File and line counts measured from a unified diff body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiffScope {
    pub files: u64,
    pub lines: u64,
}

/// Textual scope heuristic: one file per `diff --git ` header, one line per
/// added or removed content line (`+++` / `---` markers excluded).
pub fn diff_scope(diff_text: &str) -> DiffScope {
    let mut scope = DiffScope::default();
    for line in diff_text.lines() {
        if line.starts_with("diff --git ") {
            scope.files += 1;
        } else if line.starts_with(['+', '-'])
            && !line.starts_with("+++")
            && !line.starts_with("---")
        {
            scope.lines += 1;
        }
    }
    scope
}

/// Denylisted prefixes a diff appears to touch. Textual and approximate: a
/// prefix matches when `/<prefix>` occurs anywhere in the body or the body
/// starts with it. False positives are accepted.
pub fn denied_prefixes_in_diff<'a>(diff_text: &str, deny_prefixes: &'a [String]) -> Vec<&'a str> {
    deny_prefixes
        .iter()
        .filter(|prefix| {
            diff_text.contains(&format!("/{}", prefix)) || diff_text.starts_with(prefix.as_str())
        })
        .map(String::as_str)
        .collect()
}

pub fn preflight(
    doc: &PatchPackage,
    probe: &dyn RepoProbe,
    registry: &SubmissionRegistry,
    policy: &PreflightPolicy,
) -> GateResult {
    let mut res = GateResult::new(EXIT_PRE);

    check_working_tree(probe, &mut res);
    check_base_commit(doc, probe, &mut res);
    check_payload_size(doc, policy, &mut res);

    let declared = DiffScope {
        files: doc.scope_size.files,
        lines: doc.scope_size.lines,
    };
    let measured = doc.diff().map(diff_scope);
    if let Some(m) = measured {
        res.add_evidence(format!(
            "diff-derived scope: files={}, lines={}",
            m.files, m.lines
        ));
    }
    check_scope_limits("declared", declared, policy, &mut res);
    if let Some(m) = measured {
        check_scope_limits("diff-derived", m, policy, &mut res);
    }

    check_new_file_bytes(doc, policy, &mut res);
    check_denylist(doc, policy, &mut res);
    check_duplicate(doc, registry, &mut res);
    check_apply(doc, probe, &mut res);

    info!(
        ok = res.ok(),
        errors = res.errors().len(),
        base = %doc.base_commit_sha,
        "preflight decision"
    );
    res
}

fn check_working_tree(probe: &dyn RepoProbe, res: &mut GateResult) {
    if probe.is_working_tree_clean() {
        res.add_evidence("working tree clean");
    } else {
        res.add_error(
            "working tree is not clean: commit or revert local changes before submitting a patch",
        );
    }
}

fn check_base_commit(doc: &PatchPackage, probe: &dyn RepoProbe, res: &mut GateResult) {
    if probe.commit_exists(&doc.base_commit_sha) {
        res.add_evidence(format!("base_commit_sha OK: {}", doc.base_commit_sha));
    } else {
        res.add_error(format!(
            "base_commit_sha {} not found in the local repository",
            doc.base_commit_sha
        ));
    }
}

fn check_payload_size(doc: &PatchPackage, policy: &PreflightPolicy, res: &mut GateResult) {
    match doc.raw_len {
        Some(raw_len) if raw_len > policy.soft_payload_bytes => {
            res.add_evidence(format!(
                "oversize package (raw_len={} bytes, soft limit {}): slow review lane recommended",
                raw_len, policy.soft_payload_bytes
            ));
        }
        Some(_) => {}
        None => res.add_evidence("raw payload length not available"),
    }
}

fn check_scope_limits(
    label: &str,
    scope: DiffScope,
    policy: &PreflightPolicy,
    res: &mut GateResult,
) {
    debug!(label, files = scope.files, lines = scope.lines, "checking scope limits");
    if scope.files > policy.hard_files || scope.lines > policy.hard_lines {
        res.add_error(format!(
            "{} scope exceeds hard limit: files={} (max {}), lines={} (max {})",
            label, scope.files, policy.hard_files, scope.lines, policy.hard_lines
        ));
    } else if scope.files > policy.soft_files || scope.lines > policy.soft_lines {
        res.add_evidence(format!(
            "{} scope above soft limit: files={}, lines={}: slow review lane recommended",
            label, scope.files, scope.lines
        ));
    }
}

fn check_new_file_bytes(doc: &PatchPackage, policy: &PreflightPolicy, res: &mut GateResult) {
    for file in doc.new_files() {
        let size = file.content.len() as u64;
        if size > policy.hard_new_file_bytes {
            res.add_error(format!(
                "new file {} is {} bytes, exceeding the per-file limit of {} bytes",
                file.normalized_path, size, policy.hard_new_file_bytes
            ));
        }
    }

    let total = doc.new_files_total_bytes;
    if total > policy.hard_new_files_total_bytes {
        res.add_error(format!(
            "new files total {} bytes, exceeding the limit of {} bytes",
            total, policy.hard_new_files_total_bytes
        ));
    } else if total > 0 {
        res.add_evidence(format!("new files total size: {} bytes", total));
    }
}

fn check_denylist(doc: &PatchPackage, policy: &PreflightPolicy, res: &mut GateResult) {
    if let Some(diff) = doc.diff() {
        for prefix in denied_prefixes_in_diff(diff, &policy.deny_prefixes) {
            res.add_error(format!("diff touches denylisted path prefix: {}", prefix));
        }
    }
    for file in doc.new_files() {
        if let Some(prefix) = policy
            .deny_prefixes
            .iter()
            .find(|p| file.normalized_path.starts_with(p.as_str()))
        {
            res.add_error(format!(
                "new file {} is under denylisted path prefix: {}",
                file.normalized_path, prefix
            ));
        }
    }
}

fn check_duplicate(doc: &PatchPackage, registry: &SubmissionRegistry, res: &mut GateResult) {
    let Some(hash) = doc.payload_sha256.as_deref() else {
        return;
    };
    if registry.check_and_record(hash) {
        res.add_evidence(format!("payload hash registered for this session: {}", hash));
    } else {
        res.add_error(format!(
            "duplicate submission: payload {} was already submitted in this session",
            hash
        ));
    }
}

fn check_apply(doc: &PatchPackage, probe: &dyn RepoProbe, res: &mut GateResult) {
    let Some(diff) = doc.diff() else {
        return;
    };
    let check = probe.dry_run_apply(diff);
    if check.applies {
        res.add_evidence("git apply --check OK");
    } else {
        res.add_error(format!(
            "git apply --check failed: {}",
            check.diagnostic.trim()
        ));
    }
}
