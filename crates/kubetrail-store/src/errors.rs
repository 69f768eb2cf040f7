//! Error handling for kubetrail-store
//!
//! Wraps kubetrail-core ExError with store-specific helpers

use kubetrail_core::errors::{ExError, ExErrorKind};
use rusqlite::ErrorCode;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

/// Create a migration error
pub fn migration_error(migration_id: &str, reason: &str) -> ExError {
    ExError::new(ExErrorKind::Persistence)
        .with_op("migration")
        .with_message(format!("Migration {} failed: {}", migration_id, reason))
}

/// Create a checksum mismatch error
pub fn checksum_mismatch(migration_id: &str, expected: &str, actual: &str) -> ExError {
    ExError::new(ExErrorKind::MigrationChecksum)
        .with_op("migration_checksum")
        .with_message(format!(
            "Checksum mismatch for migration {}: expected {}, got {}",
            migration_id, expected, actual
        ))
}

/// Classify a SQLite failure.
///
/// Lock waits that ran out become `WriteContention` (retryable); a file that
/// cannot be opened, is not a database, or is not writable becomes
/// `StoreUnavailable`; anything else is `Persistence`.
pub fn kind_of(err: &rusqlite::Error) -> ExErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ExErrorKind::WriteContention,
            ErrorCode::CannotOpen
            | ErrorCode::NotADatabase
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied
            | ErrorCode::FileLockingProtocolFailed => ExErrorKind::StoreUnavailable,
            _ => ExErrorKind::Persistence,
        },
        _ => ExErrorKind::Persistence,
    }
}

/// Create a database error from rusqlite::Error
pub fn from_rusqlite(err: rusqlite::Error) -> ExError {
    ExError::new(kind_of(&err))
        .with_op("sqlite")
        .with_message(err.to_string())
}

/// Create a store-unavailable error for an IO failure around the store file
pub fn unavailable(operation: &str, err: std::io::Error) -> ExError {
    ExError::new(ExErrorKind::StoreUnavailable)
        .with_op(operation.to_string())
        .with_message(err.to_string())
}

/// A stored row that can no longer be decoded
pub fn corrupt_row(operation: &str, reason: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Serialization)
        .with_op(operation.to_string())
        .with_message(reason)
}
