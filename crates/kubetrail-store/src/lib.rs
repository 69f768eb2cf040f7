//! kubetrail store - durable scan history on SQLite
//!
//! Provides:
//! - Store handle with explicit open/close lifecycle
//! - Embedded, checksummed schema migrations
//! - Atomic, serialized scan append with change recording
//! - History queries (scans, changes, resource timelines)
//! - Retention manager, the only code path that deletes data

pub mod db;
pub mod errors;
pub mod migrations;
pub mod retention;
pub mod scan;

// Re-export key types
pub use db::HistoryStore;
pub use errors::Result;
pub use retention::{cleanup, RetentionReport};
