//! Embedded SQL migrations and runner.
//!
//! Migrations are stored as `&str` constants and executed in order. A
//! `schema_migrations` table tracks which versions have been applied.

use kf_core::{Error, Result};
use rusqlite::Connection;

/// V1: tracks, their derived files, and the queue.
const V1_INITIAL: &str = r#"
CREATE TABLE tracks (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT NOT NULL UNIQUE,
    url           TEXT NOT NULL,
    title         TEXT,
    thumbnail     TEXT,
    musical_key   TEXT,
    quality       TEXT,
    duration      TEXT,
    flags         INTEGER NOT NULL DEFAULT 0,
    status        TEXT NOT NULL DEFAULT 'QUEUED',
    error_message TEXT,
    requested_by  TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX idx_tracks_status ON tracks(status);
CREATE INDEX idx_tracks_requested_by ON tracks(requested_by);

CREATE TABLE track_files (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid          TEXT NOT NULL UNIQUE,
    track_id      INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
    key_offset    INTEGER NOT NULL,
    file_type     TEXT NOT NULL,
    status        TEXT NOT NULL DEFAULT 'QUEUED',
    file_url      TEXT,
    error_message TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(track_id, key_offset, file_type)
);

CREATE INDEX idx_track_files_track ON track_files(track_id);

CREATE TABLE queue_entries (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    channel     TEXT NOT NULL,
    reference   TEXT NOT NULL,
    enqueued_at TEXT NOT NULL
);

CREATE INDEX idx_queue_entries_channel ON queue_entries(channel, id);
"#;

/// All migrations in order. Each entry is `(version, sql)`.
const MIGRATIONS: &[(i64, &str)] = &[(1, V1_INITIAL)];

/// Run all pending migrations against the given connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .map_err(|e| Error::database(format!("Failed to create schema_migrations: {e}")))?;

    for &(version, sql) in MIGRATIONS {
        let already: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
                [version],
                |row| row.get(0),
            )
            .map_err(|e| Error::database(e.to_string()))?;

        if already {
            continue;
        }

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::database(e.to_string()))?;

        tx.execute_batch(sql)
            .map_err(|e| Error::database(format!("Migration V{version} failed: {e}")))?;

        tx.execute(
            "INSERT INTO schema_migrations (version) VALUES (?1)",
            [version],
        )
        .map_err(|e| Error::database(e.to_string()))?;

        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        tracing::info!(version, "Applied migration");
    }

    Ok(())
}
