//! Drift command: declared documents against actual documents.
//!
//! Both sides go through the configured normalizer, so server-assigned and
//! defaulted fields never count as drift. The system filter and the delta
//! bounds come from the same config.

use kubetrail_core::diff::DiffLimits;
use kubetrail_core::drift::{drift_documents, DriftOptions, DriftReport, SystemFilter};
use kubetrail_core::{log_op_end, log_op_start, EngineConfig, Normalizer};
use serde_json::Value;

/// Compare a declared (IaC) collection with an actual (cluster) collection.
/// With `hide_system`, platform-managed identities are left out entirely.
pub fn drift(
    config: &EngineConfig,
    declared: &[Value],
    actual: &[Value],
    hide_system: bool,
) -> DriftReport {
    log_op_start!(
        "drift",
        declared_count = declared.len(),
        actual_count = actual.len(),
        hide_system = hide_system
    );
    let start = std::time::Instant::now();

    let normalizer = Normalizer::new(config.normalizer.clone());
    let filter = SystemFilter::new(config.drift.clone());
    let options = DriftOptions {
        hide_system,
        limits: DiffLimits::from(&config.diff),
    };
    let report = drift_documents(&normalizer, declared, actual, &filter, &options);

    log_op_end!(
        "drift",
        started = start,
        only_declared = report.counts.only_declared,
        only_actual = report.counts.only_actual,
        differs = report.counts.differs,
        matches = report.counts.matches,
        hidden_system_count = report.hidden_system_count
    );
    report
}
