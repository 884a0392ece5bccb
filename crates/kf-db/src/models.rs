//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`. Column order matches the `COLS` constant of the
//! corresponding query module.

use std::str::FromStr;

use kf_core::naming::ArtifactName;
use kf_core::{
    Error, FileStatus, FileType, PitchClass, Result, TrackFileId, TrackFlags, TrackId,
    TrackStatus,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Parse a text column through `FromStr`.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn parse_opt_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse::<T>().map_err(|e| conversion_error(idx, e)))
        .transpose()
}

// ---------------------------------------------------------------------------
// Track
// ---------------------------------------------------------------------------

/// A requested source track and its progress through the pipeline.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub uuid: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub key: Option<PitchClass>,
    pub quality: Option<String>,
    pub duration: Option<String>,
    pub flags: TrackFlags,
    pub status: TrackStatus,
    pub error_message: Option<String>,
    pub requested_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Track {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: TrackId::from(row.get::<_, i64>(0)?),
            uuid: parse_text(row, 1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            thumbnail: row.get(4)?,
            key: parse_opt_text(row, 5)?,
            quality: row.get(6)?,
            duration: row.get(7)?,
            flags: TrackFlags::from_bits(row.get(8)?),
            status: parse_text(row, 9)?,
            error_message: row.get(10)?,
            requested_by: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    /// The detected key, or a conflict if key detection has not run.
    pub fn detected_key(&self) -> Result<PitchClass> {
        self.key
            .ok_or_else(|| Error::Conflict(format!("track {} has no detected key", self.id)))
    }

    pub fn title_or_empty(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }

    pub fn quality_or_empty(&self) -> &str {
        self.quality.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// TrackFile
// ---------------------------------------------------------------------------

/// One derived artifact of a track.
#[derive(Debug, Clone)]
pub struct TrackFile {
    pub id: TrackFileId,
    pub uuid: Uuid,
    pub track_id: TrackId,
    pub key_offset: i32,
    pub file_type: FileType,
    pub status: FileStatus,
    pub file_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TrackFile {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: TrackFileId::from(row.get::<_, i64>(0)?),
            uuid: parse_text(row, 1)?,
            track_id: TrackId::from(row.get::<_, i64>(2)?),
            key_offset: row.get(3)?,
            file_type: parse_text(row, 4)?,
            status: parse_text(row, 5)?,
            file_url: row.get(6)?,
            error_message: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    /// Naming inputs for this file. Fails until the track's key is known.
    pub fn artifact_name<'a>(&self, track: &'a Track) -> Result<ArtifactName<'a>> {
        Ok(ArtifactName {
            file_id: self.id.get(),
            key: track.detected_key()?,
            quality: track.quality_or_empty(),
            offset: self.key_offset,
            file_type: self.file_type,
            title: track.title_or_empty(),
        })
    }
}

/// Entries per channel, for the `queues` report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDepth {
    pub channel: String,
    pub depth: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{get_conn, init_memory_pool};
    use crate::queries::{track_files, tracks};

    #[test]
    fn track_row_roundtrip() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let flags = TrackFlags::from_bits(4 | 16);
        let created = tracks::create_track(&conn, "https://x.test/v", flags, Some("ana")).unwrap();
        let loaded = tracks::get_track(&conn, created.id).unwrap().unwrap();

        assert_eq!(loaded.uuid, created.uuid);
        assert_eq!(loaded.flags, flags);
        assert_eq!(loaded.status, TrackStatus::Queued);
        assert_eq!(loaded.key, None);
        assert!(loaded.detected_key().is_err());
    }

    #[test]
    fn artifact_name_needs_key() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let track = tracks::create_track(&conn, "https://x.test/v", TrackFlags::default(), None).unwrap();
        let file = track_files::prep_file(&conn, track.id, 2, FileType::NormalAudio).unwrap();
        assert!(file.artifact_name(&track).is_err());

        tracks::update_metadata(&conn, track.id, Some("Hello World"), None, "3:00").unwrap();
        tracks::update_key(&conn, track.id, PitchClass::C, "major").unwrap();
        let track = tracks::get_track(&conn, track.id).unwrap().unwrap();

        let name = file.artifact_name(&track).unwrap();
        assert_eq!(name.final_name(), format!("D-hello-world.{}.mp3", file.id));
    }

    #[test]
    fn unknown_status_text_fails_conversion() {
        let pool = init_memory_pool().unwrap();
        let conn = get_conn(&pool).unwrap();

        let track = tracks::create_track(&conn, "https://x.test/v", TrackFlags::default(), None).unwrap();
        conn.execute(
            "UPDATE tracks SET status = 'HALTED' WHERE id = ?1",
            [track.id.get()],
        )
        .unwrap();
        assert!(tracks::get_track(&conn, track.id).is_err());
    }
}
