//! Removal of every intermediate file of a finished track.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kf_core::config::StorageConfig;
use kf_core::{Channel, Result, TrackStatus};
use kf_db::models::{Track, TrackFile};
use kf_db::queries::track_files;

use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_track, enter_track_stage};

/// Files and directories to remove for `track`.
///
/// Derived names are checked in both the rekey and download directories,
/// since original-key files are encoded next to the source.
fn cleanup_targets(storage: &StorageConfig, track: &Track, files: &[TrackFile]) -> (Vec<PathBuf>, PathBuf) {
    let id = track.id;
    let mut paths = vec![
        storage.download_dir.join(format!("{id}.info.json")),
        storage.download_dir.join(format!("{id}.wav")),
        storage.key_dir.join(format!("{id}.key.json")),
    ];

    for file in files {
        let Ok(name) = file.artifact_name(track) else {
            continue;
        };
        for file_name in [name.final_name(), name.with_ext("wav")] {
            paths.push(storage.rekey_dir.join(&file_name));
            paths.push(storage.download_dir.join(&file_name));
        }
    }

    (paths, storage.split_dir.join(id.to_string()))
}

fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub struct CleanupStage;

#[async_trait]
impl Task for CleanupStage {
    type Entity = Track;

    fn channel(&self) -> Channel {
        Channel::Cleanup
    }

    async fn work(&self, ctx: &WorkerContext, mut track: Track, _tokens: Vec<String>) -> Result<()> {
        if !matches!(track.status, TrackStatus::NeedsCleanup | TrackStatus::CleaningUp) {
            tracing::info!(track_id = %track.id, status = %track.status, "Nothing to clean up");
            return Ok(());
        }
        enter_track_stage(ctx, &mut track, TrackStatus::NeedsCleanup)?;

        let files = {
            let conn = ctx.conn()?;
            track_files::list_for_track(&conn, track.id)?
        };
        let (paths, split_dir) = cleanup_targets(&ctx.config.storage, &track, &files);
        for path in &paths {
            remove_file(path)?;
        }
        remove_dir(&split_dir)?;

        tracing::info!(track_id = %track.id, files = files.len(), "Cleaned up");
        advance_track(ctx, &mut track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use kf_core::{FileType, PitchClass, TrackFlags};
    use kf_db::queries::tracks;

    fn finished_track(ctx: &WorkerContext) -> (Track, Vec<TrackFile>) {
        let conn = ctx.conn().unwrap();
        let track = tracks::create_track(&conn, "https://x.test/v", TrackFlags::default(), None).unwrap();
        tracks::update_metadata(&conn, track.id, Some("Song"), None, "3:00").unwrap();
        tracks::update_key(&conn, track.id, PitchClass::A, "minor").unwrap();
        tracks::set_status(&conn, track.id, TrackStatus::NeedsCleanup).unwrap();
        let files = vec![
            track_files::prep_file(&conn, track.id, 0, FileType::NormalAudio).unwrap(),
            track_files::prep_file(&conn, track.id, 1, FileType::InstrumentalAudio).unwrap(),
        ];
        (tracks::get_track(&conn, track.id).unwrap().unwrap(), files)
    }

    #[tokio::test]
    async fn removes_everything_and_finishes() {
        let (ctx, _dir) = test_context();
        let (track, files) = finished_track(&ctx);
        let storage = &ctx.config.storage;

        let (paths, split_dir) = cleanup_targets(storage, &track, &files);
        std::fs::create_dir_all(&split_dir).unwrap();
        std::fs::write(split_dir.join("accompaniment.wav"), b"x").unwrap();
        // Only some of the targets exist; the rest must be ignored.
        for path in paths.iter().step_by(2) {
            std::fs::write(path, b"x").unwrap();
        }

        CleanupStage.work(&ctx, track.clone(), Vec::new()).await.unwrap();

        assert!(paths.iter().all(|p| !p.exists()));
        assert!(!split_dir.exists());
        let conn = ctx.conn().unwrap();
        assert_eq!(tracks::get_track(&conn, track.id).unwrap().unwrap().status, TrackStatus::Done);
    }

    #[test]
    fn targets_cover_derived_names() {
        let (ctx, _dir) = test_context();
        let (track, files) = finished_track(&ctx);
        let (paths, _) = cleanup_targets(&ctx.config.storage, &track, &files);

        let original = format!("Am-song.{}.mp3", files[0].id);
        let instrumental = format!("Bflatm-noVocal-song.{}.wav", files[1].id);
        assert!(paths.iter().any(|p| p.ends_with(&original)));
        assert!(paths.iter().any(|p| p.ends_with(&instrumental)));
        assert_eq!(paths.len(), 3 + files.len() * 4);
    }

    #[tokio::test]
    async fn finished_track_is_left_alone() {
        let (ctx, _dir) = test_context();
        let (track, _) = finished_track(&ctx);
        {
            let conn = ctx.conn().unwrap();
            tracks::set_status(&conn, track.id, TrackStatus::Done).unwrap();
        }
        let mut stale = track.clone();
        stale.status = TrackStatus::Done;
        CleanupStage.work(&ctx, stale, Vec::new()).await.unwrap();

        let conn = ctx.conn().unwrap();
        assert_eq!(tracks::get_track(&conn, track.id).unwrap().unwrap().status, TrackStatus::Done);
    }
}
