//! Lint/compile gate for Rust source trees
//!
//! Two sub-checks over the same discovered file set, each under its own
//! wall-clock budget:
//!
//! - **lint**: tabs, over-long lines, missing trailing newline and a
//!   syntax-only parse (`syn`), reported per file as `path:line: message`
//! - **compile**: one metadata-only check per compile unit. Sources inside
//!   a Cargo package are checked through `cargo check` on the nearest
//!   manifest; loose sources are grouped under the crate roots their
//!   `mod` declarations lead back to and checked with `rustc`. Compiler
//!   output always goes to a scratch directory that is removed afterwards
//!
//! The budget is checked between files (lint) or units (compile). Work
//! already in progress is never interrupted.

use crate::core::gate_result::{EXIT_LINTCOMPILE, GateResult};
use crate::core::output;
use crate::core::policy::LintPolicy;
use crate::core::time;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use syn::ext::IdentExt;
use tracing::{debug, info, warn};

const SKIPPED_DIRS: [&str; 2] = [".git", "target"];
const DIAGNOSTIC_MAX_CHARS: usize = 600;
const MANIFEST: &str = "Cargo.toml";
/// Directories whose direct `.rs` children are crate roots by convention.
const ROOT_DIRS: [&str; 4] = ["bin", "tests", "examples", "benches"];

/// What a single compiler invocation checks.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompileUnit {
    /// A Cargo package, checked through its manifest.
    Package(PathBuf),
    /// A standalone crate root. Its `mod` tree is compiled with it.
    CrateRoot(PathBuf),
}

impl CompileUnit {
    pub fn path(&self) -> &Path {
        match self {
            Self::Package(manifest) => manifest,
            Self::CrateRoot(root) => root,
        }
    }
}

/// A compile unit and the discovered sources it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilePlan {
    pub unit: CompileUnit,
    pub sources: Vec<PathBuf>,
}

/// Compiles one unit without leaving artifacts next to the sources.
pub trait CompileBackend {
    fn compile(&self, unit: &CompileUnit) -> Result<(), String>;
}

/// `cargo check` for packages and `rustc --emit=metadata` for crate roots,
/// both writing into a scoped temporary directory.
#[derive(Debug, Clone)]
pub struct RustcBackend {
    rustc: String,
    cargo: String,
    edition: String,
}

impl RustcBackend {
    pub fn new(rustc: impl Into<String>, edition: impl Into<String>) -> Self {
        Self {
            rustc: rustc.into(),
            cargo: "cargo".to_string(),
            edition: edition.into(),
        }
    }

    pub fn with_cargo(mut self, cargo: impl Into<String>) -> Self {
        self.cargo = cargo.into();
        self
    }

    pub fn from_policy(policy: &LintPolicy) -> Self {
        Self::new(policy.rustc.clone(), policy.edition.clone()).with_cargo(policy.cargo.clone())
    }

    fn check_crate_root(&self, root: &Path, scratch: &Path) -> Result<(), String> {
        let output = Command::new(&self.rustc)
            .arg("--edition")
            .arg(&self.edition)
            .args([
                "--crate-type",
                "lib",
                "--crate-name",
                "gated_crate",
                "--emit=metadata",
                "--cap-lints",
                "allow",
                "--error-format=short",
            ])
            .arg("--out-dir")
            .arg(scratch)
            .arg(root)
            .output()
            .map_err(|e| format!("could not run {}: {}", self.rustc, e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }

    fn check_package(&self, manifest: &Path, scratch: &Path) -> Result<(), String> {
        // cargo writes a lockfile next to a manifest that has none.
        let lockfile = manifest.with_file_name("Cargo.lock");
        let had_lockfile = lockfile.exists();

        let output = Command::new(&self.cargo)
            .args([
                "check",
                "--quiet",
                "--offline",
                "--all-targets",
                "--message-format",
                "short",
            ])
            .arg("--manifest-path")
            .arg(manifest)
            .arg("--target-dir")
            .arg(scratch)
            .output();

        if !had_lockfile && lockfile.exists() {
            if let Err(e) = fs::remove_file(&lockfile) {
                warn!(path = %lockfile.display(), error = %e, "could not remove generated lockfile");
            }
        }

        let output = output.map_err(|e| format!("could not run {}: {}", self.cargo, e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(String::from_utf8_lossy(&output.stderr).trim().to_string())
        }
    }
}

impl CompileBackend for RustcBackend {
    fn compile(&self, unit: &CompileUnit) -> Result<(), String> {
        let scratch = tempfile::Builder::new()
            .prefix("patchgate-compile-")
            .tempdir()
            .map_err(|e| format!("could not create scratch directory: {}", e))?;

        match unit {
            CompileUnit::Package(manifest) => self.check_package(manifest, scratch.path()),
            CompileUnit::CrateRoot(root) => self.check_crate_root(root, scratch.path()),
        }
    }
}

fn is_rust_source(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "rs")
}

/// Every `.rs` file named directly or found below a named directory,
/// absolute, deduplicated and sorted.
pub fn discover_sources(paths: &[PathBuf]) -> Vec<PathBuf> {
    fn walk(dir: &Path, out: &mut BTreeSet<PathBuf>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            if is_dir {
                let name = entry.file_name();
                if SKIPPED_DIRS.iter().any(|s| name == *s) {
                    continue;
                }
                walk(&path, out);
            } else if path.is_file() && is_rust_source(&path) {
                out.insert(path);
            }
        }
    }

    let mut found = BTreeSet::new();
    for p in paths {
        let abs = std::path::absolute(p).unwrap_or_else(|_| p.clone());
        if abs.is_file() {
            if is_rust_source(&abs) {
                found.insert(abs);
            }
        } else if abs.is_dir() {
            walk(&abs, &mut found);
        } else {
            warn!(path = %abs.display(), "lint input does not exist; skipping");
        }
    }
    found.into_iter().collect()
}

/// An out-of-line `mod name;` found in a source file.
#[derive(Debug, Clone)]
struct ModDecl {
    /// Inline `mod` blocks enclosing the declaration.
    nesting: Vec<String>,
    name: String,
    path_attr: Option<String>,
}

fn path_attribute(attrs: &[syn::Attribute]) -> Option<String> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("path") {
            return None;
        }
        match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Some(s.value()),
                _ => None,
            },
            _ => None,
        }
    })
}

fn collect_mod_decls(items: &[syn::Item], nesting: &mut Vec<String>, out: &mut Vec<ModDecl>) {
    for item in items {
        let syn::Item::Mod(m) = item else {
            continue;
        };
        let name = m.ident.unraw().to_string();
        match &m.content {
            Some((_, inner)) => {
                nesting.push(name);
                collect_mod_decls(inner, nesting, out);
                nesting.pop();
            }
            None => out.push(ModDecl {
                nesting: nesting.clone(),
                name,
                path_attr: path_attribute(&m.attrs),
            }),
        }
    }
}

fn mod_decls(path: &Path) -> Vec<ModDecl> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };
    let Ok(file) = syn::parse_file(&text) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    collect_mod_decls(&file.items, &mut Vec::new(), &mut out);
    out
}

/// `lib.rs`, `main.rs`, `mod.rs` and conventional root files resolve child
/// modules in their own directory. Other files use `<dir>/<stem>/`.
fn owns_directory_by_name(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let parent = path
        .parent()
        .and_then(Path::file_name)
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    matches!(name, "lib.rs" | "main.rs" | "mod.rs") || ROOT_DIRS.contains(&parent)
}

/// Files a source's `mod` declarations resolve to, in rustc's lookup order.
fn module_candidates(path: &Path, decls: &[ModDecl], owns_directory: bool) -> Vec<PathBuf> {
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    let base = if owns_directory {
        parent.to_path_buf()
    } else {
        let stem = path.file_stem().map(PathBuf::from).unwrap_or_default();
        parent.join(stem)
    };

    let mut out = Vec::new();
    for decl in decls {
        let mut dir = base.clone();
        for segment in &decl.nesting {
            dir.push(segment);
        }
        match &decl.path_attr {
            Some(rel) if decl.nesting.is_empty() => out.push(parent.join(rel)),
            Some(rel) => out.push(dir.join(rel)),
            None => {
                out.push(dir.join(format!("{}.rs", decl.name)));
                out.push(dir.join(&decl.name).join("mod.rs"));
            }
        }
    }
    out
}

/// Group discovered sources into compile units. Sources below a
/// `Cargo.toml` belong to that package. Loose sources are attached to the
/// crate root whose `mod` tree reaches them. A loose source nothing
/// declares is a root itself.
pub fn plan_compile_units(sources: &[PathBuf]) -> Vec<CompilePlan> {
    let mut packages: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    let mut loose = Vec::new();
    for source in sources {
        let manifest = source
            .ancestors()
            .skip(1)
            .map(|dir| dir.join(MANIFEST))
            .find(|m| m.is_file());
        match manifest {
            Some(m) => packages.entry(m).or_default().push(source.clone()),
            None => loose.push(source.clone()),
        }
    }

    let mut plans: Vec<CompilePlan> = packages
        .into_iter()
        .map(|(manifest, sources)| CompilePlan {
            unit: CompileUnit::Package(manifest),
            sources,
        })
        .collect();
    plans.extend(plan_crate_roots(&loose));
    plans
}

fn plan_crate_roots(files: &[PathBuf]) -> Vec<CompilePlan> {
    let known: BTreeSet<&PathBuf> = files.iter().collect();
    let decls: BTreeMap<&PathBuf, Vec<ModDecl>> =
        files.iter().map(|f| (f, mod_decls(f))).collect();
    let children = |file: &PathBuf, owns_directory: bool| -> Vec<PathBuf> {
        let Some(d) = decls.get(file) else {
            return Vec::new();
        };
        module_candidates(file, d, owns_directory)
            .into_iter()
            .filter(|c| c != file && known.contains(c))
            .collect()
    };

    let mut claimed: BTreeSet<PathBuf> = BTreeSet::new();
    for file in files {
        claimed.extend(children(file, owns_directory_by_name(file)));
    }
    // An unclaimed file is a crate root, and a crate root owns its directory.
    let candidates: Vec<&PathBuf> = files.iter().filter(|f| !claimed.contains(*f)).collect();
    for root in &candidates {
        if !owns_directory_by_name(root) {
            claimed.extend(children(root, true));
        }
    }
    let roots: Vec<&PathBuf> = candidates
        .into_iter()
        .filter(|f| !claimed.contains(*f))
        .collect();

    let mut covered: BTreeSet<PathBuf> = BTreeSet::new();
    let mut plans = Vec::new();
    loop {
        // Files only reachable through a module cycle get their own unit.
        let next = roots
            .iter()
            .copied()
            .find(|r| !covered.contains(*r))
            .or_else(|| files.iter().find(|f| !covered.contains(*f)));
        let Some(root) = next.cloned() else {
            break;
        };

        let mut reached = BTreeSet::new();
        let mut stack = vec![(root.clone(), true)];
        while let Some((file, is_root)) = stack.pop() {
            if !reached.insert(file.clone()) {
                continue;
            }
            let owns_directory = is_root || owns_directory_by_name(&file);
            for child in children(&file, owns_directory) {
                stack.push((child, false));
            }
        }
        covered.extend(reached.iter().cloned());
        plans.push(CompilePlan {
            unit: CompileUnit::CrateRoot(root),
            sources: reached.into_iter().collect(),
        });
    }

    plans.sort_by(|a, b| a.unit.cmp(&b.unit));
    plans
}

/// Line number of the last line, counted the same way as the
/// missing-newline check.
fn last_line_number(text: &str) -> usize {
    let newlines = text.matches('\n').count();
    if text.ends_with('\n') {
        newlines.max(1)
    } else {
        newlines + 1
    }
}

fn describe_syntax_error(text: &str, err: &syn::Error) -> (usize, String) {
    let body = text.strip_prefix('\u{feff}').unwrap_or(text);
    let lexable = if body.starts_with("#!") && !body.starts_with("#![") {
        // Blank out a shebang line but keep its newline so lines stay aligned.
        match body.find('\n') {
            Some(end) => body[end..].to_string(),
            None => String::new(),
        }
    } else {
        body.to_string()
    };

    if let Err(lex) = lexable.parse::<proc_macro2::TokenStream>() {
        let line = match lex.span().start().line {
            0 => last_line_number(text),
            n => n,
        };
        return (line, "unbalanced delimiter or invalid token".to_string());
    }

    let message = err.to_string();
    if message.starts_with("unexpected end of input") {
        return (last_line_number(text), message);
    }
    (err.span().start().line.max(1), message)
}

/// Positioned lint findings for one file; empty when the file is clean.
pub fn lint_file(path: &Path, max_columns: usize) -> Vec<String> {
    let shown = path.display();
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) => return vec![format!("{}:0: cannot read file: {}", shown, e)],
    };
    let text = String::from_utf8_lossy(&bytes);

    let mut msgs = Vec::new();
    for (idx, line) in text.split_inclusive('\n').enumerate() {
        let lineno = idx + 1;
        if line.contains('\t') {
            msgs.push(format!("{}:{}: tab character", shown, lineno));
        }
        let body = line.strip_suffix('\n').unwrap_or(line);
        let body = body.strip_suffix('\r').unwrap_or(body);
        let width = body.chars().count();
        if width > max_columns {
            msgs.push(format!(
                "{}:{}: line too long ({} > {} columns)",
                shown, lineno, width, max_columns
            ));
        }
    }

    if !text.is_empty() && !text.ends_with('\n') {
        msgs.push(format!(
            "{}:{}: missing trailing newline",
            shown,
            last_line_number(&text)
        ));
    }

    if let Err(e) = syn::parse_file(&text) {
        let (line, message) = describe_syntax_error(&text, &e);
        msgs.push(format!("{}:{}: syntax error: {}", shown, line, message));
    }

    msgs
}

pub fn run_lint(paths: &[PathBuf], policy: &LintPolicy) -> GateResult {
    let start = Instant::now();
    let budget = policy.timeout();
    let mut res = GateResult::new(EXIT_LINTCOMPILE);
    res.add_evidence(format!("lint.start={}", time::utc_now_seconds()));

    for file in discover_sources(paths) {
        if start.elapsed() > budget {
            res.add_error(format!("timeout: lint exceeded {}s budget", budget.as_secs()));
            res.add_evidence("lint.timeout=1");
            warn!(budget_secs = budget.as_secs(), "lint budget exhausted");
            return res;
        }
        debug!(file = %file.display(), "linting");
        for msg in lint_file(&file, policy.max_columns) {
            res.add_error(msg);
        }
    }

    res.add_evidence(format!("lint.end={}", time::utc_now_seconds()));
    res
}

/// Compile every unit the discovered sources belong to. A successful unit
/// records `compiled=<file>` for each source it covers; a failing one
/// records a line-0 error at the manifest or crate root.
pub fn run_compile(
    paths: &[PathBuf],
    policy: &LintPolicy,
    backend: &dyn CompileBackend,
) -> GateResult {
    let start = Instant::now();
    let budget = policy.timeout();
    let mut res = GateResult::new(EXIT_LINTCOMPILE);
    res.add_evidence(format!("compile.start={}", time::utc_now_seconds()));

    for plan in plan_compile_units(&discover_sources(paths)) {
        if start.elapsed() > budget {
            res.add_error(format!(
                "timeout: compile exceeded {}s budget",
                budget.as_secs()
            ));
            res.add_evidence("compile.timeout=1");
            warn!(budget_secs = budget.as_secs(), "compile budget exhausted");
            return res;
        }
        debug!(unit = %plan.unit.path().display(), sources = plan.sources.len(), "compiling");
        match backend.compile(&plan.unit) {
            Ok(()) => {
                for source in &plan.sources {
                    res.add_evidence(format!("compiled={}", source.display()));
                }
            }
            Err(diag) => res.add_error(format!(
                "{}:0: compile error: {}",
                plan.unit.path().display(),
                output::compact_line(&diag, DIAGNOSTIC_MAX_CHARS)
            )),
        }
    }

    res.add_evidence(format!("compile.end={}", time::utc_now_seconds()));
    res
}

/// Lint, then compile only if lint passed. A failing sub-check's result is
/// returned as is.
pub fn run_lint_compile(
    paths: &[PathBuf],
    policy: &LintPolicy,
    backend: &dyn CompileBackend,
) -> GateResult {
    let lint = run_lint(paths, policy);
    if !lint.ok() {
        info!(errors = lint.errors().len(), "lint failed; compile skipped");
        return lint;
    }
    let compile = run_compile(paths, policy, backend);
    if !compile.ok() {
        info!(errors = compile.errors().len(), "compile failed");
        return compile;
    }

    let mut res = GateResult::new(EXIT_LINTCOMPILE);
    for line in lint.evidence().iter().chain(compile.evidence()) {
        res.add_evidence(line.clone());
    }
    info!("lint/compile gate passed");
    res
}
