//! Track CRUD and status operations.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use kf_core::{Error, PitchClass, Result, TrackFlags, TrackId, TrackStatus};

use crate::models::Track;

const COLS: &str = "id, uuid, url, title, thumbnail, musical_key, quality, duration,
    flags, status, error_message, requested_by, created_at, updated_at";

/// Create a new track in QUEUED.
pub fn create_track(
    conn: &Connection,
    url: &str,
    flags: TrackFlags,
    requested_by: Option<&str>,
) -> Result<Track> {
    let uuid = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    let q = format!(
        "INSERT INTO tracks (uuid, url, flags, status, requested_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         RETURNING {COLS}"
    );
    conn.query_row(
        &q,
        rusqlite::params![
            uuid.to_string(),
            url,
            flags.bits(),
            TrackStatus::Queued.as_str(),
            requested_by,
            &now
        ],
        Track::from_row,
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a track by ID.
pub fn get_track(conn: &Connection, id: TrackId) -> Result<Option<Track>> {
    let q = format!("SELECT {COLS} FROM tracks WHERE id = ?1");
    conn.query_row(&q, [id.get()], Track::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Get a track by its external UUID.
pub fn get_track_by_uuid(conn: &Connection, uuid: &Uuid) -> Result<Option<Track>> {
    let q = format!("SELECT {COLS} FROM tracks WHERE uuid = ?1");
    conn.query_row(&q, [uuid.to_string()], Track::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// List tracks visible to `viewer`, newest first.
///
/// Private tracks are only listed for the user who requested them.
pub fn list_tracks(conn: &Connection, viewer: Option<&str>, limit: i64) -> Result<Vec<Track>> {
    let q = format!(
        "SELECT {COLS} FROM tracks
         WHERE (flags & ?1) = 0 OR (?2 IS NOT NULL AND requested_by = ?2)
         ORDER BY id DESC LIMIT ?3"
    );
    let private_bit = TrackFlags {
        private: true,
        ..Default::default()
    }
    .bits();

    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![private_bit, viewer, limit], Track::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Set a track's status unconditionally.
pub fn set_status(conn: &Connection, id: TrackId, status: TrackStatus) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tracks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move a track from `from` to `to` only if it is still in `from`.
///
/// Returns `false` when another worker changed the status first.
pub fn compare_and_set_status(
    conn: &Connection,
    id: TrackId,
    from: TrackStatus,
    to: TrackStatus,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tracks SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            rusqlite::params![to.as_str(), now, id.get(), from.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Force a track to ERROR, recording why.
pub fn set_error(conn: &Connection, id: TrackId, message: &str) -> Result<bool> {
    set_terminal(conn, id, TrackStatus::Error, message)
}

/// Mark a track REJECTED by policy, recording why.
pub fn reject(conn: &Connection, id: TrackId, reason: &str) -> Result<bool> {
    set_terminal(conn, id, TrackStatus::Rejected, reason)
}

fn set_terminal(conn: &Connection, id: TrackId, status: TrackStatus, message: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tracks SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status.as_str(), message, now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Persist what the metadata stage learned about the source.
pub fn update_metadata(
    conn: &Connection,
    id: TrackId,
    title: Option<&str>,
    thumbnail: Option<&str>,
    duration: &str,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tracks SET title = ?1, thumbnail = ?2, duration = ?3, updated_at = ?4
             WHERE id = ?5",
            rusqlite::params![title, thumbnail, duration, now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Persist the detected key and mode.
pub fn update_key(conn: &Connection, id: TrackId, key: PitchClass, quality: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE tracks SET musical_key = ?1, quality = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![key.name(), quality, now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
