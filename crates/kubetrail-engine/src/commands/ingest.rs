//! Scan ingest.
//!
//! ## Pipeline (in order):
//! 1. Normalize every raw document (malformed ones are skipped and reported)
//! 2. Build the scan draft, polling the cancel flag between documents
//! 3. Last cancel check before any write
//! 4. Append atomically; the baseline diff is recorded in the same transaction
//!
//! Cancellation before step 4 leaves the store untouched. Once the append
//! transaction has started it runs to completion or rolls back.

use kubetrail_core::diff::{ChangeCounts, DiffLimits};
use kubetrail_core::errors::Result;
use kubetrail_core::snapshot::build_snapshot;
use kubetrail_core::{
    log_op_end, log_op_error, log_op_start, CancelFlag, EngineConfig, NormalizationIssue,
    Normalizer, ScanId, ScanMetadata, ScanScope,
};
use kubetrail_core_types::RequestId;
use kubetrail_store::scan::append_scan;
use kubetrail_store::HistoryStore;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Options for one ingest.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Scan time; `None` means now
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: ScanMetadata,
    pub cancel: CancelFlag,
}

impl IngestOptions {
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_metadata(mut self, metadata: ScanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of a committed ingest.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub scan_id: ScanId,
    pub timestamp: DateTime<Utc>,
    pub resource_count: usize,
    /// Most recent scan of the same scope at or before this one
    pub baseline: Option<ScanId>,
    /// `None` for the first scan of a scope
    pub counts: Option<ChangeCounts>,
    /// Documents that were skipped, with the reason
    pub issues: Vec<NormalizationIssue>,
    pub request_id: RequestId,
}

impl IngestOutcome {
    pub fn skipped_count(&self) -> usize {
        self.issues.len()
    }
}

/// Normalize `documents` into a new scan of `scope` and record what changed
/// since the previous scan of the same scope.
///
/// # Errors
///
/// - `Cancelled`: the cancel flag was raised before the write began
/// - `StoreUnavailable` / `WriteContention` / `Persistence`: the append
///   failed and nothing was written
pub fn ingest(
    store: &mut HistoryStore,
    config: &EngineConfig,
    scope: &ScanScope,
    documents: &[Value],
    options: IngestOptions,
) -> Result<IngestOutcome> {
    let request_id = RequestId::new();
    log_op_start!(
        "ingest",
        request_id = %request_id,
        document_count = documents.len()
    );
    let start = std::time::Instant::now();

    let result = ingest_impl(store, config, scope, documents, options, &request_id).map_err(|e| {
        let e = e.with_request_id(request_id.clone());
        log_op_error!("ingest", e.clone(), started = start);
        e
    })?;

    log_op_end!(
        "ingest",
        started = start,
        request_id = %request_id,
        scan_id = result.scan_id.get(),
        resource_count = result.resource_count,
        skipped_count = result.skipped_count()
    );

    Ok(result)
}

fn ingest_impl(
    store: &mut HistoryStore,
    config: &EngineConfig,
    scope: &ScanScope,
    documents: &[Value],
    options: IngestOptions,
    request_id: &RequestId,
) -> Result<IngestOutcome> {
    let normalizer = Normalizer::new(config.normalizer.clone());
    let draft = build_snapshot(
        &normalizer,
        scope.normalized(),
        options.metadata,
        options.timestamp.unwrap_or_else(Utc::now),
        documents,
        &options.cancel,
    )?;
    options.cancel.check("ingest")?;

    let appended = append_scan(store, &draft, DiffLimits::from(&config.diff))?;

    Ok(IngestOutcome {
        scan_id: appended.scan.id,
        timestamp: appended.scan.timestamp,
        resource_count: appended.scan.resource_count,
        baseline: appended.baseline,
        counts: appended.counts,
        issues: draft.issues,
        request_id: request_id.clone(),
    })
}
