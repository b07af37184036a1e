//! patchgate: admission control for machine-generated patches
//!
//! **patchgate is the trust boundary between an untrusted change proposal
//! and a protected working tree.**
//!
//! A patch package (a unified diff, or a set of whole new files, plus
//! provenance) is validated, scoped against size and risk limits, checked
//! against live git state, and then either admitted with an evidence trail
//! or rejected with every diagnostic found.
//!
//! # Gates
//!
//! - **Schema** ([`core::validator`]): closed key set, literal
//!   `schema_version`, 40-hex base commit, typed scope and provenance, safe
//!   relative paths, `diff_unified` XOR `new_files`
//! - **Preflight** ([`core::preflight`]): clean tree, base commit present,
//!   soft/hard scope limits (declared and diff-derived), new-file byte
//!   budgets, path denylist, duplicate suppression, `git apply --check`
//! - **Lint/compile** ([`core::lint_compile`]): per-file lint and a
//!   metadata-only compile over a Rust source tree, each under a
//!   wall-clock budget
//!
//! Every gate returns a [`core::gate_result::GateResult`]. A failed gate is
//! terminal for that submission; nothing here retries.
//!
//! # Examples
//!
//! ```bash
//! # Schema check only
//! patchgate validate change.json
//!
//! # Full admission against the repository in the current directory
//! patchgate admit change.json
//!
//! # Can this tree be packaged?
//! patchgate lint src/
//! ```

mod cli;
pub mod core;

use cli::{AdmitCli, Cli, Command, EvidenceCli, LintCli, OutputFormat, ValidateCli};
use crate::core::{
    error, evidence, intake, lint_compile, output, policy,
    registry::SubmissionRegistry,
    repo_probe::GitProbe,
    time, validator,
};

use clap::Parser;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `PATCHGATE_LOG` overrides the default
/// `warn` filter. Safe to call more than once.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_env("PATCHGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Parse the command line, run the requested gate and return the process
/// exit code: the first failing gate's code, or 0.
pub fn run() -> Result<i32, error::PatchGateError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Validate(args) => run_validate(args, cli.format),
        Command::Admit(args) => run_admit(args, cli.format, &current_dir),
        Command::Lint(args) => run_lint(args, cli.format, &current_dir),
        Command::Evidence(args) => run_evidence(args, cli.format),
    }
}

fn read_payload(path: &Path) -> Result<String, error::PatchGateError> {
    if !path.is_file() {
        return Err(error::PatchGateError::NotFound(format!(
            "payload {}",
            path.display()
        )));
    }
    Ok(fs::read_to_string(path)?)
}

fn status_of(code: i32) -> &'static str {
    if code == 0 { "ok" } else { "error" }
}

fn run_validate(args: ValidateCli, format: OutputFormat) -> Result<i32, error::PatchGateError> {
    let mut exit_code = 0;
    let mut reports = Vec::new();

    for path in &args.payloads {
        let raw = read_payload(path)?;
        let validation = validator::validate_payload(&raw);
        let res = validation.result;
        if exit_code == 0 {
            exit_code = res.exit_code();
        }
        match format {
            OutputFormat::Text => print!(
                "{}",
                output::render_result(&format!("schema {}", path.display()), &res)
            ),
            OutputFormat::Json => reports.push(json!({
                "payload": path.display().to_string(),
                "result": res,
            })),
        }
    }

    if format == OutputFormat::Json {
        let envelope = time::command_envelope(
            "validate",
            status_of(exit_code),
            json!({ "results": reports }),
        );
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(exit_code)
}

fn run_admit(
    args: AdmitCli,
    format: OutputFormat,
    current_dir: &Path,
) -> Result<i32, error::PatchGateError> {
    let repo_root = args.repo.unwrap_or_else(|| current_dir.to_path_buf());
    let (config, policy_source) = policy::load_policy(args.config.as_deref(), &repo_root)?;
    tracing::debug!(
        repo = %repo_root.display(),
        policy = ?policy_source,
        "admission session starting"
    );

    let probe = GitProbe::new(&repo_root);
    let registry = SubmissionRegistry::new();
    let mut exit_code = 0;
    let mut reports = Vec::new();

    for path in &args.payloads {
        let raw = read_payload(path)?;
        let admission = intake::admit(&raw, &probe, &registry, &config.preflight);
        if exit_code == 0 {
            exit_code = admission.exit_code();
        }
        match format {
            OutputFormat::Text => {
                print!(
                    "{}",
                    output::render_result(&format!("schema {}", path.display()), &admission.schema)
                );
                if let Some(pre) = &admission.preflight {
                    print!(
                        "{}",
                        output::render_result(&format!("preflight {}", path.display()), pre)
                    );
                }
            }
            OutputFormat::Json => reports.push(json!({
                "payload": path.display().to_string(),
                "admitted": admission.admitted(),
                "admission": admission,
            })),
        }
    }

    if format == OutputFormat::Json {
        let envelope = time::command_envelope(
            "admit",
            status_of(exit_code),
            json!({ "results": reports }),
        );
        println!("{}", serde_json::to_string_pretty(&envelope)?);
    }
    Ok(exit_code)
}

fn run_lint(
    args: LintCli,
    format: OutputFormat,
    current_dir: &Path,
) -> Result<i32, error::PatchGateError> {
    let (config, _) = policy::load_policy(args.config.as_deref(), current_dir)?;
    let paths: Vec<PathBuf> = args.paths;

    let res = if args.lint_only {
        lint_compile::run_lint(&paths, &config.lint)
    } else {
        let backend = lint_compile::RustcBackend::from_policy(&config.lint);
        lint_compile::run_lint_compile(&paths, &config.lint, &backend)
    };

    match format {
        OutputFormat::Text => print!("{}", output::render_result("lint/compile", &res)),
        OutputFormat::Json => {
            let envelope = time::command_envelope(
                "lint",
                status_of(res.exit_code()),
                json!({ "result": res }),
            );
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
    }
    Ok(res.exit_code())
}

fn run_evidence(args: EvidenceCli, format: OutputFormat) -> Result<i32, error::PatchGateError> {
    let record = evidence::EvidenceRecord::for_archive(&args.archive, args.entries)?;
    let out_dir = match args.out {
        Some(dir) => dir,
        None => Path::new(&record.archive)
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                error::PatchGateError::ValidationError(format!(
                    "archive {} has no parent directory",
                    record.archive
                ))
            })?,
    };
    let evidence_path = evidence::write_evidence_json(&record, &out_dir)?;
    let history_path = evidence::append_history(&record, &out_dir)?;

    match format {
        OutputFormat::Text => {
            println!("{}", record.summary());
            println!("  evidence: {}", evidence_path.display());
            println!("  history:  {}", history_path.display());
        }
        OutputFormat::Json => {
            let envelope = time::command_envelope(
                "evidence",
                "ok",
                json!({
                    "record": record,
                    "evidence_path": evidence_path.display().to_string(),
                    "history_path": history_path.display().to_string(),
                }),
            );
            println!("{}", serde_json::to_string_pretty(&envelope)?);
        }
    }
    Ok(0)
}
