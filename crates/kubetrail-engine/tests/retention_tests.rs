#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use chrono::Duration;
use common::*;
use kubetrail_core::errors::ExErrorKind;
use kubetrail_core::model::window::parse_duration;
use kubetrail_core::{CancelFlag, ScanId};
use kubetrail_engine::{cleanup, get_history};

fn aged_history() -> (tempfile::TempDir, kubetrail_store::HistoryStore, Vec<ScanId>) {
    let (dir, mut store) = scratch_store();
    let ids = [90, 70, 5]
        .iter()
        .map(|days| {
            ingest_at(
                &mut store,
                &[deployment("app", *days), service("svc")],
                ago(Duration::days(*days)),
            )
            .scan_id
        })
        .collect();
    (dir, store, ids)
}

#[test]
fn test_cleanup_keeps_recent_scan_and_removes_old_ones() {
    let (_dir, mut store, ids) = aged_history();

    let keep = parse_duration("60d").unwrap();
    let report = cleanup(&mut store, keep, false, &CancelFlag::new()).unwrap();

    assert_eq!(report.removed_scan_ids.len(), 2);
    assert_eq!(report.removed_scan_ids, vec![ids[0], ids[1]]);
    assert_eq!(report.freed_resource_count, 4);
    let remaining: Vec<ScanId> = get_history(&store, None, None).unwrap().iter().map(|s| s.id).collect();
    assert_eq!(remaining, vec![ids[2]]);
}

#[test]
fn test_dry_run_leaves_history_unchanged() {
    let (_dir, mut store, _) = aged_history();
    let before = get_history(&store, None, None).unwrap();

    let report = cleanup(&mut store, Duration::days(60), true, &CancelFlag::new()).unwrap();
    assert!(report.dry_run);
    assert_eq!(report.removed_scan_ids.len(), 2);

    assert_eq!(get_history(&store, None, None).unwrap(), before);
}

#[test]
fn test_invalid_window_rejected_before_mutation() {
    let (_dir, mut store, _) = aged_history();

    let err = cleanup(&mut store, Duration::days(-1), false, &CancelFlag::new()).unwrap_err();
    assert_eq!(err.kind(), ExErrorKind::InvalidWindow);
    assert_eq!(get_history(&store, None, None).unwrap().len(), 3);

    assert_eq!(parse_duration("0d").unwrap_err().kind(), ExErrorKind::InvalidWindow);
}

#[test]
fn test_retention_never_removes_the_only_scan() {
    let (_dir, mut store) = scratch_store();
    ingest_at(&mut store, &[service("svc")], ago(Duration::days(365)));

    let report = cleanup(&mut store, Duration::days(1), false, &CancelFlag::new()).unwrap();
    assert!(report.removed_scan_ids.is_empty());
    assert_eq!(get_history(&store, None, None).unwrap().len(), 1);
}
