//! Read-only probes against live version-control state.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Outcome of a non-mutating apply check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyCheck {
    pub applies: bool,
    pub diagnostic: String,
}

/// Queries preflight needs from the target repository. Implementations
/// must not modify repository content.
pub trait RepoProbe {
    fn is_working_tree_clean(&self) -> bool;
    fn commit_exists(&self, sha: &str) -> bool;
    fn dry_run_apply(&self, diff_text: &str) -> ApplyCheck;
}

/// [`RepoProbe`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitProbe {
    repo_root: PathBuf,
}

struct GitOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl GitProbe {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn git(&self, args: &[&str]) -> Result<GitOutput, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|e| format!("git failed: {}", e))?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

impl RepoProbe for GitProbe {
    fn is_working_tree_clean(&self) -> bool {
        match self.git(&["status", "--porcelain"]) {
            // Outside a repository the tree counts as dirty.
            Ok(out) if out.success => out.stdout.trim().is_empty(),
            Ok(out) => {
                debug!(stderr = %out.stderr.trim(), "git status failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "git status could not run");
                false
            }
        }
    }

    fn commit_exists(&self, sha: &str) -> bool {
        match self.git(&["cat-file", "-t", sha]) {
            Ok(out) if out.success => matches!(out.stdout.trim(), "commit" | "tag"),
            _ => false,
        }
    }

    fn dry_run_apply(&self, diff_text: &str) -> ApplyCheck {
        // Removed when `staged` drops, on every return path.
        let mut staged = match tempfile::Builder::new()
            .prefix("patchgate-apply-")
            .suffix(".diff")
            .tempfile()
        {
            Ok(f) => f,
            Err(e) => {
                return ApplyCheck {
                    applies: false,
                    diagnostic: format!("could not stage diff for apply check: {}", e),
                };
            }
        };
        if let Err(e) = staged
            .write_all(diff_text.as_bytes())
            .and_then(|()| staged.flush())
        {
            return ApplyCheck {
                applies: false,
                diagnostic: format!("could not stage diff for apply check: {}", e),
            };
        }

        let staged_path = staged.path().to_string_lossy().to_string();
        match self.git(&["apply", "--check", &staged_path]) {
            Ok(out) if out.success => ApplyCheck {
                applies: true,
                diagnostic: out.stdout,
            },
            Ok(out) => ApplyCheck {
                applies: false,
                diagnostic: out.stderr,
            },
            Err(e) => ApplyCheck {
                applies: false,
                diagnostic: e,
            },
        }
    }
}
