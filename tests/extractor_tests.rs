//! Integration tests for the annotation extractor over the fixture tree

use std::path::{Path, PathBuf};
use tracealign::extract::AnnotationExtractor;

fn fixture_tree() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/src_tree")
}

#[test]
fn test_fixture_tree_yields_all_annotations() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    assert!(outcome.errors.is_empty(), "errors: {:?}", outcome.errors);

    let ids: Vec<&str> = outcome
        .specs
        .iter()
        .map(|s| s.operation_id.as_str())
        .collect();
    assert_eq!(ids.len(), 4, "specs: {:?}", ids);
    assert!(ids.contains(&"createUser"));
    assert!(ids.contains(&"loginUser"));
    assert!(ids.contains(&"mixedNonExistent"));
    assert!(ids.contains(&"deleteUser"));
}

#[test]
fn test_vendored_annotation_not_scanned() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    assert!(outcome
        .specs
        .iter()
        .all(|s| s.operation_id != "vendoredOp"));
}

#[test]
fn test_line_numbers_point_at_annotation_tag() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();

    let by_id = |id: &str| {
        outcome
            .specs
            .iter()
            .find(|s| s.operation_id == id)
            .unwrap_or_else(|| panic!("spec {} not found", id))
    };
    assert_eq!(by_id("createUser").line_number, 4);
    assert_eq!(by_id("loginUser").line_number, 7);
    assert_eq!(by_id("mixedNonExistent").line_number, 17);
    assert_eq!(by_id("deleteUser").line_number, 5);
}

#[test]
fn test_source_file_recorded() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    let create_user = outcome
        .specs
        .iter()
        .find(|s| s.operation_id == "createUser")
        .unwrap();
    assert!(create_user.source_file.ends_with("UserService.java"));
}

#[test]
fn test_expressions_preserved_verbatim() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    let create_user = outcome
        .specs
        .iter()
        .find(|s| s.operation_id == "createUser")
        .unwrap();
    assert_eq!(
        create_user.preconditions["method_is_post"],
        serde_json::json!({"==": [{"var": "http_method"}, "POST"]})
    );
    assert_eq!(
        create_user.postconditions["created"],
        serde_json::json!({"==": [{"var": "http_status_code"}, 201]})
    );
}

#[test]
fn test_scan_is_deterministic() {
    let first = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    let second = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    assert_eq!(first.specs, second.specs);
    assert_eq!(first.errors, second.errors);
}

#[test]
fn test_mixed_nonexistent_has_no_conditions() {
    let outcome = AnnotationExtractor::new()
        .scan_directory(&fixture_tree())
        .unwrap();
    let legacy = outcome
        .specs
        .iter()
        .find(|s| s.operation_id == "mixedNonExistent")
        .unwrap();
    assert!(legacy.preconditions.is_empty());
    assert!(legacy.postconditions.is_empty());
}
