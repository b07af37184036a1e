use patchgate::core::gate_result::EXIT_LINTCOMPILE;
use patchgate::core::lint_compile::{
    CompileBackend, CompileUnit, RustcBackend, run_compile, run_lint, run_lint_compile,
};
use patchgate::core::policy::LintPolicy;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingBackend {
    fail_on: Option<&'static str>,
    compiled: RefCell<Vec<CompileUnit>>,
}

impl CompileBackend for RecordingBackend {
    fn compile(&self, unit: &CompileUnit) -> Result<(), String> {
        self.compiled.borrow_mut().push(unit.clone());
        match self.fail_on {
            Some(name) if unit.path().ends_with(name) => {
                Err("error[E0425]: cannot find value `y`\n  in this scope".to_string())
            }
            _ => Ok(()),
        }
    }
}

fn tree(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (name, body) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(&path, body).expect("write source");
    }
    dir
}

fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("read_dir")
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn lint_failure_short_circuits_compile() {
    let dir = tree(&[
        ("src/good.rs", "pub fn good() {}\n"),
        ("src/bad.rs", "pub fn bad() {\n\tlet _y = 2;\n}\n"),
    ]);
    let backend = RecordingBackend::default();
    let res = run_lint_compile(
        &[dir.path().to_path_buf()],
        &LintPolicy::default(),
        &backend,
    );
    assert!(!res.ok());
    assert_eq!(res.exit_code(), EXIT_LINTCOMPILE);
    assert!(res.has_error_containing("bad.rs:2: tab character"));
    assert!(backend.compiled.borrow().is_empty());
    assert!(!res.has_evidence_containing("compile.start"));
}

#[test]
fn passing_gate_concatenates_lint_then_compile_evidence() {
    let dir = tree(&[
        ("a.rs", "pub fn a() {}\n"),
        ("nested/b.rs", "pub fn b() {}\n"),
    ]);
    let backend = RecordingBackend::default();
    let res = run_lint_compile(
        &[dir.path().to_path_buf()],
        &LintPolicy::default(),
        &backend,
    );
    assert!(res.ok(), "{:?}", res.errors());
    assert_eq!(res.exit_code(), 0);

    let ev = res.evidence();
    assert!(ev[0].starts_with("lint.start="));
    assert!(ev[1].starts_with("lint.end="));
    assert!(ev[2].starts_with("compile.start="));
    assert!(ev.last().expect("evidence").starts_with("compile.end="));
    assert_eq!(
        ev.iter().filter(|l| l.starts_with("compiled=")).count(),
        2
    );
    assert_eq!(backend.compiled.borrow().len(), 2);
}

#[test]
fn compile_failure_is_positioned_and_compacted() {
    let dir = tree(&[("broken.rs", "pub fn f() -> u8 { y }\n"), ("fine.rs", "\n")]);
    let backend = RecordingBackend {
        fail_on: Some("broken.rs"),
        ..RecordingBackend::default()
    };
    let res = run_compile(&[dir.path().to_path_buf()], &LintPolicy::default(), &backend);
    assert!(!res.ok());
    assert_eq!(res.exit_code(), EXIT_LINTCOMPILE);
    let err = &res.errors()[0];
    assert!(err.contains("broken.rs:0: compile error: error[E0425]"), "{err}");
    assert!(!err.contains('\n'), "{err}");
    assert!(res.has_evidence_containing("fine.rs"));
    assert!(res.has_evidence_containing("compile.end="));
}

#[test]
fn zero_budget_times_out_lint() {
    let dir = tree(&[("a.rs", "pub fn a() {}\n")]);
    let policy = LintPolicy {
        timeout_secs: 0,
        ..LintPolicy::default()
    };
    let res = run_lint(&[dir.path().to_path_buf()], &policy);
    assert!(!res.ok());
    assert_eq!(res.exit_code(), EXIT_LINTCOMPILE);
    assert!(res.has_error_containing("timeout: lint exceeded 0s budget"));
    assert!(res.has_evidence_containing("lint.timeout=1"));
    assert!(!res.has_evidence_containing("lint.end="));
}

#[test]
fn zero_budget_times_out_compile() {
    let dir = tree(&[("a.rs", "pub fn a() {}\n")]);
    let policy = LintPolicy {
        timeout_secs: 0,
        ..LintPolicy::default()
    };
    let backend = RecordingBackend::default();
    let res = run_compile(&[dir.path().to_path_buf()], &policy, &backend);
    assert!(res.has_error_containing("timeout: compile exceeded"));
    assert!(res.has_evidence_containing("compile.timeout=1"));
    assert!(backend.compiled.borrow().is_empty());
}

#[test]
fn empty_tree_passes() {
    let dir = tree(&[("README.md", "# nothing to lint\n")]);
    let res = run_lint_compile(
        &[dir.path().to_path_buf()],
        &LintPolicy::default(),
        &RecordingBackend::default(),
    );
    assert!(res.ok());
}

#[test]
fn missing_input_is_skipped() {
    let dir = tree(&[("a.rs", "pub fn a() {}\n")]);
    let res = run_lint(
        &[dir.path().join("does-not-exist"), dir.path().join("a.rs")],
        &LintPolicy::default(),
    );
    assert!(res.ok(), "{:?}", res.errors());
}

#[test]
fn every_lint_finding_is_collected() {
    let two = format!("// {}\npub fn two() {{}}", "x".repeat(130));
    let dir = tree(&[
        ("one.rs", "pub fn one() {\n\tlet _a = 1;\n}\n"),
        ("two.rs", two.as_str()),
    ]);
    let res = run_lint(&[dir.path().to_path_buf()], &LintPolicy::default());
    assert!(res.has_error_containing("one.rs:2: tab character"));
    assert!(res.has_error_containing("two.rs:1: line too long (133 > 120 columns)"));
    assert!(res.has_error_containing("two.rs:2: missing trailing newline"));
    assert_eq!(res.errors().len(), 3, "{:?}", res.errors());
}

#[test]
fn rustc_backend_accepts_valid_source_without_leaving_artifacts() {
    let dir = tree(&[("lib.rs", "pub fn double(x: u32) -> u32 {\n    x * 2\n}\n")]);
    let before = listing(dir.path());
    let backend = RustcBackend::from_policy(&LintPolicy::default());
    let outcome = backend.compile(&CompileUnit::CrateRoot(dir.path().join("lib.rs")));
    assert!(outcome.is_ok(), "{outcome:?}");
    assert_eq!(listing(dir.path()), before);
}

#[test]
fn rustc_backend_rejects_type_errors() {
    let dir = tree(&[("lib.rs", "pub fn broken() -> u32 {\n    \"nope\"\n}\n")]);
    let backend = RustcBackend::new("rustc", "2021");
    let diag = backend
        .compile(&CompileUnit::CrateRoot(dir.path().join("lib.rs")))
        .expect_err("type error must fail");
    assert!(diag.contains("error"), "{diag}");
    assert_eq!(listing(dir.path()), vec!["lib.rs".to_string()]);
}

#[test]
fn missing_compiler_is_a_compile_error() {
    let dir = tree(&[("lib.rs", "pub fn a() {}\n")]);
    let policy = LintPolicy {
        rustc: "patchgate-no-such-compiler".to_string(),
        ..LintPolicy::default()
    };
    let backend = RustcBackend::from_policy(&policy);
    let res = run_lint_compile(&[dir.path().to_path_buf()], &policy, &backend);
    assert!(!res.ok());
    assert!(res.has_error_containing("could not run patchgate-no-such-compiler"));
}

#[test]
fn module_tree_is_compiled_once_from_its_root() {
    let dir = tree(&[
        ("src/lib.rs", "pub mod util;\n"),
        ("src/util.rs", "pub fn u() {}\n"),
    ]);
    let backend = RecordingBackend::default();
    let res = run_compile(&[dir.path().to_path_buf()], &LintPolicy::default(), &backend);
    assert!(res.ok(), "{:?}", res.errors());
    assert_eq!(
        *backend.compiled.borrow(),
        vec![CompileUnit::CrateRoot(dir.path().join("src/lib.rs"))]
    );
    assert!(res.has_evidence_containing("lib.rs"));
    assert!(res.has_evidence_containing("util.rs"));
}

#[test]
fn rustc_backend_accepts_crate_split_across_modules() {
    let dir = tree(&[
        (
            "src/lib.rs",
            "pub mod util;\n\npub fn base() -> u32 {\n    1\n}\n\npub fn top() -> u32 {\n    util::helper() + 1\n}\n",
        ),
        ("src/util.rs", "pub fn helper() -> u32 {\n    crate::base()\n}\n"),
    ]);
    let backend = RustcBackend::from_policy(&LintPolicy::default());
    let res = run_lint_compile(&[dir.path().to_path_buf()], &LintPolicy::default(), &backend);
    assert!(res.ok(), "{:?}", res.errors());
    let compiled: Vec<&String> = res
        .evidence()
        .iter()
        .filter(|l| l.starts_with("compiled="))
        .collect();
    assert_eq!(compiled.len(), 2, "{compiled:?}");
    assert!(compiled.iter().any(|l| l.ends_with("util.rs")));
    assert_eq!(listing(&dir.path().join("src")), vec!["lib.rs", "util.rs"]);
}

#[test]
fn cargo_package_is_checked_through_its_manifest() {
    let dir = tree(&[
        (
            "Cargo.toml",
            "[package]\nname = \"gated\"\nversion = \"0.1.0\"\nedition = \"2021\"\n\n[dependencies]\n",
        ),
        ("src/lib.rs", "mod util;\n\npub fn top() -> u32 {\n    util::helper()\n}\n"),
        ("src/util.rs", "pub fn helper() -> u32 {\n    7\n}\n"),
    ]);
    let backend = RustcBackend::from_policy(&LintPolicy::default()).with_cargo(env!("CARGO"));
    let res = run_lint_compile(&[dir.path().join("src")], &LintPolicy::default(), &backend);
    assert!(res.ok(), "{:?}", res.errors());
    assert_eq!(
        res.evidence()
            .iter()
            .filter(|l| l.starts_with("compiled="))
            .count(),
        2
    );
    assert_eq!(listing(dir.path()), vec!["Cargo.toml", "src"]);
}

#[test]
fn failing_package_is_reported_at_its_manifest() {
    let dir = tree(&[
        ("Cargo.toml", "[package]\nname = \"gated\"\n"),
        ("src/lib.rs", "pub fn a() {}\n"),
    ]);
    let backend = RecordingBackend {
        fail_on: Some("Cargo.toml"),
        ..RecordingBackend::default()
    };
    let res = run_compile(&[dir.path().to_path_buf()], &LintPolicy::default(), &backend);
    assert!(res.has_error_containing("Cargo.toml:0: compile error:"));
    assert!(!res.has_evidence_containing("compiled="));
}
