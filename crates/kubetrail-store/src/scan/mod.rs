//! Scan persistence and history queries.

pub mod persist;
pub mod query;

pub use persist::{append_scan, AppendOutcome};
pub use query::{
    fetch_change_set, fetch_changes, fetch_resources, fetch_scan, fetch_scan_summary,
    helm_release_of, identity_exists, latest_scan, latest_scan_at_or_before,
    list_changes_in_range, list_scans, list_scans_in_range, namespace_counts, resource_timeline,
    resource_timelines_by_scope, timelines_in_range, StoredChange,
};
