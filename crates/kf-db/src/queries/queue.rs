//! Durable FIFO channels of job references.
//!
//! Each pushed reference is one row in `queue_entries`. Popping deletes the
//! oldest row of a channel and returns its reference in a single statement,
//! so two workers polling the same channel never receive the same entry.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use kf_core::{Channel, Error, Result};

use crate::models::QueueDepth;
use crate::pool::{get_conn, DbPool};

/// Append a reference to a channel.
pub fn push(conn: &Connection, channel: Channel, reference: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO queue_entries (channel, reference, enqueued_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![channel.as_str(), reference, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;
    Ok(())
}

/// Remove and return the oldest reference of a channel.
pub fn pop(conn: &Connection, channel: Channel) -> Result<Option<String>> {
    // SQLite RETURNING is supported since 3.35.
    conn.query_row(
        "DELETE FROM queue_entries
         WHERE id = (
             SELECT id FROM queue_entries WHERE channel = ?1 ORDER BY id LIMIT 1
         )
         RETURNING reference",
        [channel.as_str()],
        |row| row.get(0),
    )
    .optional()
    .map_err(|e| Error::database(e.to_string()))
}

/// Number of entries waiting on a channel.
pub fn depth(conn: &Connection, channel: Channel) -> Result<usize> {
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM queue_entries WHERE channel = ?1",
            [channel.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

/// Depth of every non-empty channel, including channels no stage polls.
pub fn depths(conn: &Connection) -> Result<Vec<QueueDepth>> {
    let mut stmt = conn
        .prepare(
            "SELECT channel, COUNT(*) FROM queue_entries GROUP BY channel ORDER BY channel",
        )
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueueDepth {
                channel: row.get(0)?,
                depth: row.get(1)?,
            })
        })
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// The queue operations worker code depends on.
pub trait JobQueue: Send + Sync {
    /// Append `reference` to `channel`.
    fn push(&self, channel: Channel, reference: &str) -> Result<()>;

    /// Remove and return the oldest reference on `channel`, if any.
    fn pop(&self, channel: Channel) -> Result<Option<String>>;

    /// Entries currently waiting on `channel`.
    fn depth(&self, channel: Channel) -> Result<usize>;
}

/// [`JobQueue`] stored in the application database.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: DbPool,
}

impl SqliteQueue {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl JobQueue for SqliteQueue {
    fn push(&self, channel: Channel, reference: &str) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        push(&conn, channel, reference)?;
        tracing::debug!(channel = %channel, reference, "Pushed job");
        Ok(())
    }

    fn pop(&self, channel: Channel) -> Result<Option<String>> {
        let conn = get_conn(&self.pool)?;
        pop(&conn, channel)
    }

    fn depth(&self, channel: Channel) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        depth(&conn, channel)
    }
}
