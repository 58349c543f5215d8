// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and migrations.
//!
//! Every statement runs on the single background thread owned by
//! `tokio-rusqlite`, so the conditional call writes never interleave.

use std::path::Path;

use intercom_core::IntercomError;
use tracing::debug;

use crate::migrations::run_migrations;

/// Handle to the SQLite database backing the Call Store.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (creating if needed) the database at `path` in WAL mode and
    /// applies pending migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IntercomError> {
        Self::open_with(path, true).await
    }

    /// Like [`Database::open`], choosing the journal mode explicitly.
    pub async fn open_with(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, IntercomError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| IntercomError::Storage {
                source: Box::new(e),
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| IntercomError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path = %path.display(), wal_mode, "database opened");
        Ok(db)
    }

    /// Opens a private in-memory database with the schema applied.
    pub async fn open_in_memory() -> Result<Self, IntercomError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| IntercomError::Storage {
                source: Box::new(e),
            })?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), IntercomError> {
        self.conn
            .call(move |conn| -> Result<Result<(), IntercomError>, rusqlite::Error> {
                if wal_mode {
                    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
                }
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), IntercomError> {
        self.conn
            .call(|conn| conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);"))
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints the WAL and releases this handle.
    pub async fn close(self) -> Result<(), IntercomError> {
        self.checkpoint().await
    }
}

/// Maps a `tokio-rusqlite` failure into [`IntercomError::Storage`].
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> IntercomError {
    IntercomError::Storage {
        source: Box::new(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_schema() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("nested/intercom.db"))
            .await
            .unwrap();
        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
                )?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .await
            .unwrap();
        for table in ["apartments", "buildings", "call_participants", "calls", "profiles"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}: {tables:?}");
        }
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reopen_is_idempotent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("intercom.db");
        Database::open(&path).await.unwrap().close().await.unwrap();
        let db = Database::open(&path).await.unwrap();
        let mode: String = db
            .connection()
            .call(|conn| conn.query_row("PRAGMA journal_mode", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Database::open_in_memory().await.unwrap();
        let result = db
            .connection()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO apartments (id, building_id, number) VALUES ('a1', 'nope', '1')",
                    [],
                )
            })
            .await;
        assert!(result.is_err());
    }
}
