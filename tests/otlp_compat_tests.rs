//! OTLP-JSON compatibility matrix: different encodings of the same trace
//! must produce identical stores and identical alignment outcomes

use std::path::{Path, PathBuf};
use tracealign::otlp_ingest::ingest_file;
use tracealign::trace_model::StatusCode;

const BUDGET: u64 = 64 * 1024 * 1024;

fn trace_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/traces")
        .join(name)
}

#[test]
fn test_int_and_string_encodings_yield_identical_spans() {
    let (store_int, _) = ingest_file(&trace_fixture("compat_int.json"), BUDGET).unwrap();
    let (store_str, _) = ingest_file(&trace_fixture("compat_string.json"), BUDGET).unwrap();

    let a = store_int.spans_for_name("createUser");
    let b = store_str.spans_for_name("createUser");
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0], b[0]);

    let span = a[0];
    assert_eq!(span.start_time_ns, 1_700_000_000_000_000_000);
    assert_eq!(span.status.code, StatusCode::Ok);
    assert_eq!(span.attributes["http.status_code"], serde_json::json!(201));
}

#[test]
fn test_basic_fixture_ingests_fully() {
    let (store, stats) = ingest_file(&trace_fixture("basic.json"), BUDGET).unwrap();
    assert_eq!(stats.spans_ingested, 3);
    assert_eq!(stats.spans_skipped, 0);
    assert_eq!(store.trace_count(), 2);

    // Parent/child tree inside the first trace
    let trace = &store.traces["4bf92f3577b34da6a3ce929d0e0e4736"];
    assert_eq!(trace.root_span.as_deref(), Some("00f067aa0ba902b7"));
    assert_eq!(
        trace.children["00f067aa0ba902b7"],
        vec!["10f067aa0ba902b8".to_string()]
    );
}

#[test]
fn test_malformed_span_dropped_others_usable() {
    let (store, stats) = ingest_file(&trace_fixture("malformed_span.json"), BUDGET).unwrap();
    assert_eq!(stats.spans_ingested, 1);
    assert_eq!(stats.spans_skipped, 1);
    assert!(!stats.warnings.is_empty());
    assert_eq!(store.spans_for_name("createUser").len(), 1);
    assert!(store.spans_for_name("spanWithoutId").is_empty());
}

#[test]
fn test_empty_trace_file() {
    let (store, stats) = ingest_file(&trace_fixture("empty.json"), BUDGET).unwrap();
    assert_eq!(store.span_count(), 0);
    assert_eq!(stats.spans_ingested, 0);
    assert!(stats.trace_warnings.is_empty());
}

#[test]
fn test_event_and_resource_metadata_survive() {
    let (store, _) = ingest_file(&trace_fixture("basic.json"), BUDGET).unwrap();
    let create_user = store.spans_for_name("createUser")[0];
    assert_eq!(create_user.events.len(), 1);
    assert_eq!(create_user.events[0].name, "user.persisted");
    assert_eq!(
        create_user.events[0].attributes["user.id"],
        serde_json::json!("u-1001")
    );
}
