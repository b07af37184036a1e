//! CLI struct definitions for the patchgate command-line interface.
//!
//! All clap-derived types live here. Dispatch lives in `lib.rs`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    name = "patchgate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Admission gates for machine-generated patch packages and the source trees they target."
)]
pub(crate) struct Cli {
    /// Output format.
    #[clap(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Command {
    /// Check payloads against patch package schema v1 only
    Validate(ValidateCli),
    /// Validate, then preflight each payload against the repository
    Admit(AdmitCli),
    /// Run the lint/compile gate over files and directories
    Lint(LintCli),
    /// Hash a packaged archive and record its evidence
    Evidence(EvidenceCli),
}

#[derive(clap::Args, Debug)]
pub(crate) struct ValidateCli {
    /// Payload files (JSON).
    #[clap(required = true)]
    pub payloads: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct AdmitCli {
    /// Payload files (JSON). Payloads in one invocation share a duplicate registry.
    #[clap(required = true)]
    pub payloads: Vec<PathBuf>,
    /// Repository to check against (defaults to the current directory).
    #[clap(long)]
    pub repo: Option<PathBuf>,
    /// Policy file (defaults to `<repo>/.patchgate/policy.toml`, then built-ins).
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LintCli {
    /// Files or directories to check.
    #[clap(required = true)]
    pub paths: Vec<PathBuf>,
    /// Skip the compile sub-check.
    #[clap(long)]
    pub lint_only: bool,
    /// Policy file (defaults to `./.patchgate/policy.toml`, then built-ins).
    #[clap(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub(crate) struct EvidenceCli {
    /// Archive produced by the packaging step.
    pub archive: PathBuf,
    /// Number of entries in the archive.
    #[clap(long)]
    pub entries: u64,
    /// Directory for `evidence.json` and `history.jsonl` (defaults to the archive's directory).
    #[clap(long)]
    pub out: Option<PathBuf>,
}
