//! Store handle and connection lifecycle
//!
//! A [`HistoryStore`] is opened once per invocation and owns its SQLite
//! connection. Dropping it closes the connection; [`HistoryStore::close`]
//! does the same but reports close errors.

use crate::errors::{from_rusqlite, unavailable, Result};
use crate::migrations::apply_migrations;
use kubetrail_core::config::StoreConfig;
use kubetrail_core::errors::ExError;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct HistoryStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore").field("path", &self.path).finish()
    }
}

impl HistoryStore {
    /// Open (creating if needed) the store at `path` and bring its schema up
    /// to date.
    ///
    /// `lock_timeout` bounds how long a writer waits for another process's
    /// write transaction before failing with `WriteContention`.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the directory cannot be created or the file
    /// cannot be opened as a database; `MigrationChecksum` when the stored
    /// schema history does not match this build.
    pub fn open(path: &Path, lock_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                unavailable("store_open", e).with_entity_id(parent.display().to_string())
            })?;
        }
        let conn = Connection::open(path).map_err(|e| open_error(e, path))?;
        Self::init(conn, Some(path.to_path_buf()), lock_timeout)
            .map_err(|e| e.with_entity_id(path.display().to_string()))
    }

    /// Open using the store section of the engine configuration.
    ///
    /// # Errors
    ///
    /// As [`HistoryStore::open`].
    pub fn open_with_config(path: &Path, config: &StoreConfig) -> Result<Self> {
        Self::open(path, Duration::from_millis(config.lock_timeout_ms))
    }

    /// Private in-memory store (tests and one-shot comparisons).
    ///
    /// # Errors
    ///
    /// `Persistence` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(from_rusqlite)?;
        Self::init(conn, None, Duration::from_millis(0))
    }

    fn init(mut conn: Connection, path: Option<PathBuf>, lock_timeout: Duration) -> Result<Self> {
        configure(&conn, lock_timeout)?;
        apply_migrations(&mut conn)?;
        tracing::debug!(path = ?path, "opened history store");
        Ok(Self { conn, path })
    }

    /// `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Close the connection, surfacing any error SQLite reports.
    ///
    /// # Errors
    ///
    /// `Persistence` when SQLite refuses to close (e.g. unfinalized statements).
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| from_rusqlite(e).with_op("store_close"))
    }
}

/// Connection settings applied on every open
fn configure(conn: &Connection, lock_timeout: Duration) -> Result<()> {
    conn.busy_timeout(lock_timeout).map_err(from_rusqlite)?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(from_rusqlite)?;

    // WAL lets readers proceed while a scan is being appended
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(from_rusqlite)?;

    Ok(())
}

fn open_error(err: rusqlite::Error, path: &Path) -> ExError {
    from_rusqlite(err)
        .with_op("store_open")
        .with_entity_id(path.display().to_string())
}
