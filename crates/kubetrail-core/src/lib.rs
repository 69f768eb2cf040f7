//! kubetrail core - pure engine for historical tracking and drift detection
//!
//! This crate holds everything that does not touch storage:
//! - Canonical resource model, scan snapshots and time windows
//! - Normalizer and content fingerprints
//! - Diff engine with bounded structural deltas
//! - Stability scoring over resource timelines
//! - IaC-vs-cluster drift comparison
//! - Error and logging facilities shared by the other crates

pub mod cancel;
pub mod config;
pub mod diff;
pub mod drift;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod normalize;
pub mod snapshot;
pub mod stability;

// Re-export commonly used types
pub use cancel::CancelFlag;
pub use config::EngineConfig;
pub use errors::{ExError, ExErrorKind, NormalizeError, Result};
pub use model::{
    CanonicalResource, Fingerprint, ResourceIdentity, Scan, ScanId, ScanMetadata, ScanScope,
    ScanSummary, TimeWindow,
};
pub use normalize::Normalizer;
pub use snapshot::{NormalizationIssue, ScanDraft, SnapshotBuilder};
