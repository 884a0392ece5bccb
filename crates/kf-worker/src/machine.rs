//! Side effects of the transition tables.
//!
//! `kf_core::transitions` says where an entity goes next; this module
//! persists the move with a compare-and-set and then pushes the follow-on
//! reference. The status change always lands before the push.

use std::path::Path;

use kf_core::planner;
use kf_core::transitions::{file_channel, next_file_status, next_track_status, track_channel};
use kf_core::{Channel, EntityKind, Error, FileStatus, JobRef, Result, TrackStatus};
use kf_db::models::{Track, TrackFile};
use kf_db::queries::{track_files, tracks};

use crate::completion;
use crate::context::WorkerContext;

fn lost_race(what: &str, id: impl std::fmt::Display, from: impl std::fmt::Display) -> Error {
    Error::Conflict(format!("{what} {id} is no longer {from}"))
}

/// Fire the track's transition from its current status.
///
/// Moves into NEEDS_CLEANUP go through the completion detector, and entering
/// NEEDS_REKEY fans out one rekey job per planned file.
pub fn advance_track(ctx: &WorkerContext, track: &mut Track) -> Result<()> {
    let from = track.status;
    let next = next_track_status(from, &track.flags).ok_or_else(|| {
        Error::Conflict(format!("track {} is {from} and cannot advance", track.id))
    })?;

    if next == TrackStatus::NeedsCleanup {
        completion::try_finish(ctx, track.id)?;
        return Ok(());
    }

    {
        let conn = ctx.conn()?;
        if !tracks::compare_and_set_status(&conn, track.id, from, next)? {
            return Err(lost_race("track", track.id, from));
        }
    }
    track.status = next;
    tracing::info!(track_id = %track.id, from = %from, to = %next, "Track advanced");

    if next == TrackStatus::NeedsRekey {
        return plan_rekey(ctx, track);
    }
    if let Some(channel) = track_channel(next) {
        ctx.push(channel, &JobRef::new(EntityKind::Track, track.id))?;
    }
    Ok(())
}

/// Prepare and enqueue every rekeyed file, then mark the track REKEYING.
fn plan_rekey(ctx: &WorkerContext, track: &mut Track) -> Result<()> {
    let key = track.detected_key()?;
    let specs = planner::plan(key, &track.flags);

    {
        let conn = ctx.conn()?;
        for spec in &specs {
            let file = track_files::prep_file(&conn, track.id, spec.offset, spec.file_type)?;
            ctx.push(Channel::Rekey, &JobRef::new(EntityKind::TrackFile, file.id))?;
        }
        if tracks::compare_and_set_status(&conn, track.id, TrackStatus::NeedsRekey, TrackStatus::Rekeying)? {
            track.status = TrackStatus::Rekeying;
        }
    }
    tracing::info!(track_id = %track.id, key = %key, planned = specs.len(), "Rekey jobs queued");

    // Files prepared before planning may already be finished.
    completion::try_finish(ctx, track.id)?;
    Ok(())
}

/// Move a track from its NEEDS status into the matching working status.
///
/// A track already in the working status is accepted so that a redelivered
/// reference can resume.
pub fn enter_track_stage(ctx: &WorkerContext, track: &mut Track, needs: TrackStatus) -> Result<()> {
    let working = next_track_status(needs, &track.flags)
        .ok_or_else(|| Error::Internal(format!("{needs} has no working status")))?;

    if track.status == working {
        return Ok(());
    }
    if track.status != needs {
        return Err(Error::Conflict(format!(
            "track {} is {}, expected {needs}",
            track.id, track.status
        )));
    }
    advance_track(ctx, track)
}

/// Fire a file's table transition, carrying `tokens` on the pushed reference.
pub fn advance_file(ctx: &WorkerContext, file: &mut TrackFile, tokens: &[String]) -> Result<()> {
    let from = file.status;
    let next = next_file_status(from).ok_or_else(|| {
        Error::Conflict(format!("file {} is {from} and cannot advance", file.id))
    })?;

    {
        let conn = ctx.conn()?;
        if !track_files::compare_and_set_status(&conn, file.id, from, next)? {
            return Err(lost_race("file", file.id, from));
        }
    }
    file.status = next;
    tracing::debug!(file_id = %file.id, from = %from, to = %next, "File advanced");

    if let Some(channel) = file_channel(next) {
        let job = tokens
            .iter()
            .fold(JobRef::new(EntityKind::TrackFile, file.id), |job, t| job.with_token(t.as_str()));
        ctx.push(channel, &job)?;
    }
    Ok(())
}

/// Send an already-rendered audio file straight to the encoder.
///
/// Used for the original-key files, which skip the pitch shifter.
pub fn queue_encode(ctx: &WorkerContext, file: &mut TrackFile, audio: &Path) -> Result<()> {
    advance_file(ctx, file, &[])?;
    advance_file(ctx, file, &[audio.to_string_lossy().into_owned()])
}

/// Set ENCODING or UPLOADING on entry to the stage that owns it.
///
/// Accepts the file in either `needs` or `working`.
pub fn enter_file_stage(
    ctx: &WorkerContext,
    file: &mut TrackFile,
    needs: FileStatus,
    working: FileStatus,
) -> Result<()> {
    if file.status == working {
        return Ok(());
    }
    if file.status != needs {
        return Err(Error::Conflict(format!(
            "file {} is {}, expected {needs}",
            file.id, file.status
        )));
    }

    let conn = ctx.conn()?;
    if !track_files::compare_and_set_status(&conn, file.id, needs, working)? {
        return Err(lost_race("file", file.id, needs));
    }
    file.status = working;
    Ok(())
}
