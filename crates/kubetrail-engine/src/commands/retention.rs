//! Retention command.

use kubetrail_core::errors::Result;
use kubetrail_core::{log_op_end, log_op_error, log_op_start, CancelFlag};
use kubetrail_store::{HistoryStore, RetentionReport};
use chrono::Duration;

/// Remove scans older than `keep_window` before the most recent scan. The
/// most recent scan is always kept; `dry_run` only reports.
///
/// # Errors
///
/// - `InvalidWindow`: `keep_window` is not positive (nothing is touched)
/// - `WriteContention` / `Persistence`: a delete failed; scans removed
///   before the failure stay removed
pub fn cleanup(
    store: &mut HistoryStore,
    keep_window: Duration,
    dry_run: bool,
    cancel: &CancelFlag,
) -> Result<RetentionReport> {
    log_op_start!(
        "cleanup",
        keep_window_s = keep_window.num_seconds(),
        dry_run = dry_run
    );
    let start = std::time::Instant::now();

    let report = kubetrail_store::cleanup(store, keep_window, dry_run, cancel).map_err(|e| {
        log_op_error!("cleanup", e.clone(), started = start);
        e
    })?;

    log_op_end!(
        "cleanup",
        started = start,
        removed_count = report.removed_scan_ids.len(),
        freed_resource_count = report.freed_resource_count,
        dry_run = report.dry_run,
        interrupted = report.interrupted
    );

    Ok(report)
}
