use patchgate::core::gate_result::EXIT_PRE;
use patchgate::core::schema::Field;
use patchgate::core::validator::{ChangeSet, validate_payload};
use serde_json::{Value, json};

const SHA: &str = "4f2a9c1e8b7d6a5f4e3d2c1b0a9f8e7d6c5b4a39";

fn valid_diff_payload() -> Value {
    json!({
        "schema_version": "1",
        "base_branch": "main",
        "base_commit_sha": SHA,
        "commit_message": "feat: add retry budget to fetcher",
        "scope_size": {"files": 1, "lines": 4},
        "provenance": {
            "llm_vendor": "acme",
            "llm_model": "coder-7",
            "timestamp_utc": "2026-10-14T08:00:00Z"
        },
        "diff_unified": "diff --git a/src/fetch.rs b/src/fetch.rs\n--- a/src/fetch.rs\n+++ b/src/fetch.rs\n@@ -1 +1 @@\n-old\n+new\n",
        "affected_tests": ["fetch::retries"],
        "notes_for_reviewer": "small change"
    })
}

fn valid_new_files_payload() -> Value {
    let mut doc = valid_diff_payload();
    let obj = doc.as_object_mut().expect("object");
    obj.remove("diff_unified");
    obj.insert(
        "new_files".to_string(),
        json!([
            {"path": "src/retry.rs", "mode": "100644", "content": "pub fn retry() {}\n"},
            {"path": "docs/retry.md", "mode": "100644", "content": "# Retry\n"}
        ]),
    );
    doc
}

#[test]
fn well_formed_diff_payload_is_accepted() {
    let v = validate_payload(&valid_diff_payload().to_string());
    assert!(v.result.ok(), "{:?}", v.result.errors());
    assert_eq!(v.result.exit_code(), 0);
    assert!(v.result.has_evidence_containing("Schema OK"));
    let doc = v.document.expect("decorated document");
    assert!(matches!(doc.change_set, ChangeSet::DiffUnified(_)));
    assert_eq!(doc.scope_size.files, 1);
    assert_eq!(doc.affected_tests, Some(json!(["fetch::retries"])));
}

#[test]
fn new_files_total_bytes_is_attached() {
    let v = validate_payload(&valid_new_files_payload().to_string());
    assert!(v.result.ok(), "{:?}", v.result.errors());
    let doc = v.document.expect("decorated document");
    let expected = ("pub fn retry() {}\n".len() + "# Retry\n".len()) as u64;
    assert_eq!(doc.new_files_total_bytes, expected);
    assert_eq!(doc.new_files().len(), 2);
    assert_eq!(doc.new_files()[0].normalized_path, "src/retry.rs");
}

#[test]
fn every_missing_required_key_is_named() {
    for field in Field::required() {
        let mut doc = valid_diff_payload();
        doc.as_object_mut().expect("object").remove(field.key());
        let v = validate_payload(&doc.to_string());
        assert!(!v.result.ok(), "removing {} should fail", field.key());
        assert!(
            v.result
                .errors()
                .iter()
                .any(|e| e.starts_with("missing required fields") && e.contains(field.key())),
            "missing {} not reported: {:?}",
            field.key(),
            v.result.errors()
        );
        assert!(v.document.is_none());
    }
}

#[test]
fn all_missing_keys_reported_together() {
    let v = validate_payload(r#"{"diff_unified": "x"}"#);
    let missing = v
        .result
        .errors()
        .iter()
        .find(|e| e.starts_with("missing required fields"))
        .expect("missing-keys error");
    for field in Field::required() {
        assert!(missing.contains(field.key()), "{missing}");
    }
}

#[test]
fn checks_accumulate_instead_of_stopping() {
    let mut doc = valid_diff_payload();
    doc["schema_version"] = json!("2");
    doc["base_commit_sha"] = json!("xyz");
    doc["base_branch"] = json!("");
    doc["extra_field"] = json!(true);
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("schema_version"));
    assert!(v.result.has_error_containing("base_commit_sha"));
    assert!(v.result.has_error_containing("base_branch"));
    assert!(v.result.has_error_containing("unexpected fields: extra_field"));
    assert_eq!(v.result.errors().len(), 4, "{:?}", v.result.errors());
}

#[test]
fn schema_version_two_is_rejected() {
    let mut doc = valid_diff_payload();
    doc["schema_version"] = json!("2");
    let v = validate_payload(&doc.to_string());
    assert!(!v.result.ok());
    assert_eq!(v.result.exit_code(), EXIT_PRE);
    assert!(v.result.has_error_containing("schema_version"));
    assert!(v.result.evidence().is_empty());
}

#[test]
fn numeric_schema_version_is_not_the_literal() {
    let mut doc = valid_diff_payload();
    doc["schema_version"] = json!(1);
    assert!(
        validate_payload(&doc.to_string())
            .result
            .has_error_containing("schema_version")
    );
}

#[test]
fn both_change_representations_violate_xor() {
    let mut doc = valid_new_files_payload();
    doc["diff_unified"] = json!("diff --git a/x b/x\n");
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("exactly one of diff_unified or new_files"));
}

#[test]
fn neither_change_representation_violates_xor() {
    let mut doc = valid_diff_payload();
    doc.as_object_mut().expect("object").remove("diff_unified");
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("exactly one of diff_unified or new_files"));
}

#[test]
fn mistyped_change_representation_counts_as_absent() {
    let mut doc = valid_diff_payload();
    doc["diff_unified"] = json!(17);
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("diff_unified must be a string"));
    assert!(v.result.has_error_containing("exactly one of"));
}

#[test]
fn base_commit_sha_requires_forty_hex_chars() {
    let too_long = format!("{}0", SHA);
    let bad = [
        "",
        "abc",
        &SHA[..39],
        too_long.as_str(),
        "g123456789abcdef0123456789abcdef01234567",
        " 123456789abcdef0123456789abcdef01234567",
    ];
    for sha in bad {
        let mut doc = valid_diff_payload();
        doc["base_commit_sha"] = json!(sha);
        let v = validate_payload(&doc.to_string());
        assert!(
            v.result.has_error_containing("base_commit_sha"),
            "{sha:?} should be rejected"
        );
    }

    for sha in [SHA.to_string(), SHA.to_uppercase(), "A".repeat(40)] {
        let mut doc = valid_diff_payload();
        doc["base_commit_sha"] = json!(sha);
        let v = validate_payload(&doc.to_string());
        assert!(v.result.ok(), "{sha:?} should be accepted: {:?}", v.result.errors());
    }
}

#[test]
fn unsafe_new_file_paths_are_rejected() {
    let cases = [
        ("/etc/passwd", "must be relative"),
        ("\\windows\\system32", "must be relative"),
        ("../outside.rs", "escapes the tree"),
        ("src/../../outside.rs", "escapes the tree"),
        ("src/a<b>.rs", "reserved character"),
        ("src/what?.rs", "reserved character"),
        ("C:odd.rs", "reserved character"),
        ("src/pipe|.rs", "reserved character"),
    ];
    for (path, needle) in cases {
        let mut doc = valid_new_files_payload();
        doc["new_files"][0]["path"] = json!(path);
        let v = validate_payload(&doc.to_string());
        assert!(
            v.result
                .errors()
                .iter()
                .any(|e| e.starts_with("new_files[0]") && e.contains(needle)),
            "{path:?}: {:?}",
            v.result.errors()
        );
    }
}

#[test]
fn every_violation_of_one_entry_is_reported() {
    let mut doc = valid_new_files_payload();
    doc["new_files"][0] = json!({"path": "/etc/x", "mode": "100644", "content": "a\u{0}b"});
    doc["new_files"][1]["path"] = json!("\\share:/../../x|y");
    let v = validate_payload(&doc.to_string());
    let first: Vec<&String> = v
        .result
        .errors()
        .iter()
        .filter(|e| e.starts_with("new_files[0]"))
        .collect();
    assert_eq!(first.len(), 2, "{first:?}");
    assert!(first.iter().any(|e| e.contains("must be relative")));
    assert!(first.iter().any(|e| e.contains("content contains a NUL byte")));

    let second: Vec<&String> = v
        .result
        .errors()
        .iter()
        .filter(|e| e.starts_with("new_files[1]"))
        .collect();
    for needle in ["must be relative", "':'", "'|'", "escapes the tree"] {
        assert!(second.iter().any(|e| e.contains(needle)), "{needle}: {second:?}");
    }
}

#[test]
fn new_file_entries_need_string_fields() {
    let mut doc = valid_new_files_payload();
    doc["new_files"][1] = json!({"path": "src/x.rs", "mode": 420, "content": ""});
    doc["new_files"].as_array_mut().expect("array").push(json!("src/y.rs"));
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("new_files[1] path, mode and content must be strings"));
    assert!(v.result.has_error_containing("new_files[2] must be an object"));
}

#[test]
fn new_files_must_be_a_list() {
    let mut doc = valid_new_files_payload();
    doc["new_files"] = json!({"path": "src/x.rs"});
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("new_files must be a list"));
    assert!(v.result.has_error_containing("exactly one of"));
}

#[test]
fn binary_new_file_content_is_rejected() {
    let mut doc = valid_new_files_payload();
    doc["new_files"][0]["content"] = json!("\u{0}\u{1}ELF");
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("new_files[0] content contains a NUL byte"));
}

#[test]
fn provenance_sub_fields_are_required() {
    let mut doc = valid_diff_payload();
    doc["provenance"] = json!({"llm_vendor": "acme", "llm_model": ""});
    let v = validate_payload(&doc.to_string());
    assert!(v.result.has_error_containing("provenance.llm_model"));
    assert!(v.result.has_error_containing("provenance.timestamp_utc"));
    assert!(!v.result.has_error_containing("provenance.llm_vendor"));
}

#[test]
fn scope_size_shape_is_enforced() {
    let mut doc = valid_diff_payload();
    doc["scope_size"] = json!([1, 2]);
    assert!(
        validate_payload(&doc.to_string())
            .result
            .has_error_containing("scope_size must be an object")
    );

    doc["scope_size"] = json!({"files": "1", "lines": 2});
    assert!(
        validate_payload(&doc.to_string())
            .result
            .has_error_containing("must be integers")
    );

    doc["scope_size"] = json!({"files": 0, "lines": 0});
    assert!(validate_payload(&doc.to_string()).result.ok());
}

#[test]
fn validation_has_no_memory() {
    let raw = valid_diff_payload().to_string();
    let first = validate_payload(&raw);
    let second = validate_payload(&raw);
    assert_eq!(first.result, second.result);
    assert_eq!(first.document, second.document);

    let mut bad = valid_diff_payload();
    bad["schema_version"] = json!("9");
    let bad = bad.to_string();
    assert_eq!(validate_payload(&bad).result, validate_payload(&bad).result);
}

#[test]
fn parse_failure_stops_before_field_checks() {
    let v = validate_payload("{\"schema_version\": \"1\",");
    assert_eq!(v.result.errors().len(), 1);
    assert!(v.result.errors()[0].starts_with("JSON parse error"));
    assert!(v.result.evidence().is_empty());
    assert!(v.document.is_none());
}
