//! Derived-file operations.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use kf_core::{Error, FileStatus, FileType, Result, TrackFileId, TrackId};

use crate::models::TrackFile;

const COLS: &str = "id, uuid, track_id, key_offset, file_type, status, file_url,
    error_message, created_at, updated_at";

/// Create the file for `(track, offset, file_type)`, or reset the existing
/// one to QUEUED. There is never more than one row per triple.
pub fn prep_file(
    conn: &Connection,
    track_id: TrackId,
    offset: i32,
    file_type: FileType,
) -> Result<TrackFile> {
    let uuid = Uuid::new_v4();
    let now = Utc::now().to_rfc3339();

    let q = format!(
        "INSERT INTO track_files (uuid, track_id, key_offset, file_type, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(track_id, key_offset, file_type)
         DO UPDATE SET status = excluded.status, error_message = NULL, updated_at = excluded.updated_at
         RETURNING {COLS}"
    );
    conn.query_row(
        &q,
        rusqlite::params![
            uuid.to_string(),
            track_id.get(),
            offset,
            file_type.as_str(),
            FileStatus::Queued.as_str(),
            &now
        ],
        TrackFile::from_row,
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Get a file by ID.
pub fn get_file(conn: &Connection, id: TrackFileId) -> Result<Option<TrackFile>> {
    let q = format!("SELECT {COLS} FROM track_files WHERE id = ?1");
    conn.query_row(&q, [id.get()], TrackFile::from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// All files of a track ordered by offset.
pub fn list_for_track(conn: &Connection, track_id: TrackId) -> Result<Vec<TrackFile>> {
    let q = format!(
        "SELECT {COLS} FROM track_files WHERE track_id = ?1 ORDER BY key_offset, id"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([track_id.get()], TrackFile::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Number of files of a track that are neither DONE nor ERROR.
pub fn count_pending(conn: &Connection, track_id: TrackId) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM track_files WHERE track_id = ?1 AND status NOT IN (?2, ?3)",
        rusqlite::params![
            track_id.get(),
            FileStatus::Done.as_str(),
            FileStatus::Error.as_str()
        ],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// Set a file's status unconditionally.
pub fn set_status(conn: &Connection, id: TrackFileId, status: FileStatus) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE track_files SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move a file from `from` to `to` only if it is still in `from`.
pub fn compare_and_set_status(
    conn: &Connection,
    id: TrackFileId,
    from: FileStatus,
    to: FileStatus,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE track_files SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            rusqlite::params![to.as_str(), now, id.get(), from.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Force a file to ERROR, recording why.
pub fn set_error(conn: &Connection, id: TrackFileId, message: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE track_files SET status = ?1, error_message = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![FileStatus::Error.as_str(), message, now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Record where the uploaded artifact can be fetched.
pub fn set_url(conn: &Connection, id: TrackFileId, url: &str) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let n = conn
        .execute(
            "UPDATE track_files SET file_url = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![url, now, id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
