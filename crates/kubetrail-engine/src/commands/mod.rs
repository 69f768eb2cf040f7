//! Command orchestration layer.
//!
//! Each command logs its boundaries with `log_op_start!` / `log_op_end!` /
//! `log_op_error!`. Queries against a scan id or identity that does not exist
//! return an empty result instead of `NotFound`.

pub mod drift;
pub mod history;
pub mod ingest;
pub mod retention;

pub use drift::drift;
pub use history::{
    compare_scans, get_changes, get_history, get_resource_timeline, get_summary,
    score_identity, HistorySummary,
};
pub use ingest::{ingest, IngestOptions, IngestOutcome};
pub use retention::cleanup;

use kubetrail_core::errors::{ExErrorKind, Result};
use kubetrail_core::{log_op_end, log_op_error, log_op_start, EngineConfig};
use kubetrail_store::HistoryStore;

/// Open the store configured by `config` (environment override first).
///
/// # Errors
///
/// - `StoreUnavailable`: no usable path, or the file cannot be opened
/// - `MigrationChecksum`: the schema on disk was tampered with
pub fn open_store(config: &EngineConfig) -> Result<HistoryStore> {
    let path = config.store_path()?;
    HistoryStore::open_with_config(&path, &config.store)
}

/// Map `NotFound` to `default`, pass every other outcome through.
pub(crate) fn or_empty<T>(result: Result<T>, default: T) -> Result<T> {
    match result {
        Err(e) if e.kind() == ExErrorKind::NotFound => {
            tracing::debug!(op = e.op(), message = e.message(), "not found, returning empty");
            Ok(default)
        }
        other => other,
    }
}

/// Run a read-only query between start/end log events.
pub(crate) fn traced<T>(op: &'static str, query: impl FnOnce() -> Result<T>) -> Result<T> {
    log_op_start!(op);
    let start = std::time::Instant::now();
    let result = query().map_err(|e| {
        log_op_error!(op, e.clone(), started = start);
        e
    })?;
    log_op_end!(op, started = start);
    Ok(result)
}
