// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database handle: pragmas, migrations and the single writer connection.
//!
//! Every query goes through `tokio-rusqlite`'s one background thread, which
//! serializes writes. Do not open further connections for writes.

use std::time::Duration;

use botfleet_core::FleetError;
use tracing::debug;

use crate::migrations;

/// An open, migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path`, apply pragmas and migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, FleetError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(FleetError::storage)?;
        Self::prepare(conn, wal_mode).await
    }

    /// A private in-memory database, for tests and dry runs.
    pub async fn open_in_memory() -> Result<Self, FleetError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(FleetError::storage)?;
        Self::prepare(conn, false).await
    }

    async fn prepare(conn: tokio_rusqlite::Connection, wal_mode: bool) -> Result<Self, FleetError> {
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            if wal_mode {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), FleetError> { migrations::run_migrations(conn) })
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                other => FleetError::storage(other.to_string()),
            })?;

        debug!(wal_mode, "database ready");
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Flush the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), FleetError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error into `FleetError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> FleetError {
    FleetError::storage(e)
}
