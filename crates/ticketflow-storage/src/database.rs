// SPDX-FileCopyrightText: 2026 Ticketflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use chrono::{DateTime, Utc};
use ticketflow_core::TicketflowError;
use tracing::debug;

use crate::migrations;

/// Fixed-width UTC timestamp format; lexical order equals time order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Handle to the SQLite database. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Opens (or creates) the database at `path`, applies PRAGMAs and runs migrations.
    pub async fn open(path: &str) -> Result<Self, TicketflowError> {
        Self::open_with(path, true).await
    }

    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, TicketflowError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| TicketflowError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| TicketflowError::Storage {
                source: Box::new(e),
            })?;

        let journal = if wal_mode { "WAL" } else { "DELETE" };
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.pragma_update_and_check(None, "journal_mode", journal, |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| -> Result<(), TicketflowError> { migrations::run_migrations(conn) })
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                other => TicketflowError::Storage {
                    source: other.to_string().into(),
                },
            })?;

        debug!(path, wal_mode, "database opened");
        Ok(Self { conn })
    }

    /// The single writer connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoints the WAL so the main database file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), TicketflowError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoints and closes the connection.
    pub async fn close(self) -> Result<(), TicketflowError> {
        self.checkpoint().await?;
        self.conn
            .close()
            .await
            .map_err(|e| TicketflowError::Storage {
                source: e.to_string().into(),
            })
    }
}

/// Convert a tokio-rusqlite error into `TicketflowError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> TicketflowError {
    TicketflowError::Storage {
        source: Box::new(e),
    }
}

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn parse_ts(idx: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn parse_opt_ts(
    idx: usize,
    s: Option<String>,
) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    s.map(|s| parse_ts(idx, &s)).transpose()
}

/// Wraps a column decoding failure (bad enum text, bad JSON) as a rusqlite error.
pub(crate) fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    idx: usize,
    s: &str,
) -> Result<T, rusqlite::Error> {
    serde_json::from_str(s).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String, TicketflowError> {
    Ok(serde_json::to_string(value)?)
}
