#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use kubetrail_core::errors::{ExError, ExErrorKind, NormalizeError};
use kubetrail_core::logging_facility::test_capture::init_test_capture;
use kubetrail_core::{log_op_end, log_op_error, log_op_start};
use kubetrail_core::{Normalizer, ScanScope, SnapshotBuilder};
use kubetrail_core_types::schema::{
    EVENT_END, EVENT_END_ERROR, EVENT_START, FIELD_DURATION_MS, FIELD_ENTITY_ID, FIELD_ERR_CODE,
    FIELD_ERR_KIND, FIELD_MESSAGE, FIELD_REQUEST_ID, FIELD_RETRYABLE, FIELD_SCAN_ID,
};
use kubetrail_core_types::RequestId;
use serde_json::json;
use std::time::Instant;
use tracing::Level;

#[test]
fn test_log_op_start_macro() {
    let capture = init_test_capture();
    let op_name = "test_log_op_start_unique_1";

    log_op_start!(op_name, resource_count = 3);

    let started = capture.events_for(op_name, EVENT_START);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].field("resource_count"), Some("3"));
    assert!(started[0]
        .component()
        .is_some_and(|c| c.starts_with("logging_facility_tests")));
}

#[test]
fn test_log_op_end_reports_elapsed_time() {
    let capture = init_test_capture();
    let op_name = "test_log_op_end_unique_2";

    let started = Instant::now();
    std::thread::sleep(std::time::Duration::from_millis(5));
    log_op_end!(op_name, started = started, scan_id = 11_i64);

    let ended = capture.events_for(op_name, EVENT_END);
    assert_eq!(ended.len(), 1, "Should have exactly one end event");
    let duration: u64 = ended[0].field(FIELD_DURATION_MS).unwrap().parse().unwrap();
    assert!(duration >= 5);
    assert_eq!(ended[0].field(FIELD_SCAN_ID), Some("11"));
}

#[test]
fn test_log_op_error_carries_error_context() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_3";

    let request_id = RequestId::from_string("req-log-3".to_string());
    let err = ExError::new(ExErrorKind::WriteContention)
        .with_scan_id(17)
        .with_entity_id("ConfigMap/default/app")
        .with_request_id(request_id)
        .with_message("store is locked");
    log_op_error!(op_name, err, started = Instant::now());

    let failed = capture.events_for(op_name, EVENT_END_ERROR);
    assert_eq!(failed.len(), 1);
    let event = &failed[0];
    assert_eq!(event.level, Level::ERROR);
    assert_eq!(event.field(FIELD_ERR_CODE), Some("ERR_WRITE_CONTENTION"));
    assert_eq!(event.field(FIELD_ERR_KIND), Some("WriteContention"));
    assert_eq!(event.field(FIELD_RETRYABLE), Some("true"));
    assert_eq!(event.field(FIELD_SCAN_ID), Some("17"));
    assert_eq!(event.field(FIELD_ENTITY_ID), Some("ConfigMap/default/app"));
    assert_eq!(event.field(FIELD_REQUEST_ID), Some("req-log-3"));
    assert_eq!(event.field(FIELD_MESSAGE), Some("store is locked"));
    assert!(event.field(FIELD_DURATION_MS).is_some());
}

#[test]
fn test_log_op_error_omits_absent_context() {
    let capture = init_test_capture();
    let op_name = "test_log_op_error_unique_4";

    log_op_error!(op_name, NormalizeError::MissingKind, started = Instant::now());

    let failed = capture.events_for(op_name, EVENT_END_ERROR);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].field(FIELD_ERR_CODE), Some("ERR_MALFORMED_RESOURCE"));
    assert_eq!(failed[0].field(FIELD_RETRYABLE), Some("false"));
    assert_eq!(failed[0].field(FIELD_SCAN_ID), None);
    assert_eq!(failed[0].field(FIELD_REQUEST_ID), None);
}

#[test]
fn test_skipped_resources_are_logged_with_index() {
    let capture = init_test_capture();
    let normalizer = Normalizer::default();
    let mut builder = SnapshotBuilder::new(&normalizer, ScanScope::default(), Utc::now());

    builder.push(&json!({"kind": "ConfigMap", "metadata": {"name": "ok", "namespace": "logging-test"}}));
    builder.push(&json!({"kind": "ConfigMap", "metadata": {"namespace": "logging-test-unnamed"}}));
    let draft = builder.finish();
    assert_eq!(draft.skipped_count(), 1);

    let warnings = capture.count_events(|e| {
        e.level == Level::WARN
            && e.field("index") == Some("1")
            && e
                .field("reason")
                .is_some_and(|r| r.contains("ConfigMap has no metadata.name"))
    });
    assert!(warnings >= 1);
}
