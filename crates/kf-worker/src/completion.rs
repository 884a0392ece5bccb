//! Completion detection.
//!
//! A track whose derived files are all DONE or ERROR, and whose own status
//! says it is only waiting on them, moves to NEEDS_CLEANUP. The move is a
//! compare-and-set so that when several uploads finish at once exactly one
//! caller enqueues the cleanup job.

use kf_core::transitions::awaiting_completion;
use kf_core::{Channel, EntityKind, JobRef, Result, TrackId, TrackStatus};
use kf_db::queries::{track_files, tracks};

use crate::context::WorkerContext;

/// Move the track to cleanup if nothing is left in flight.
///
/// Returns `true` if this call performed the transition.
pub fn try_finish(ctx: &WorkerContext, track_id: TrackId) -> Result<bool> {
    let conn = ctx.conn()?;

    let Some(track) = tracks::get_track(&conn, track_id)? else {
        return Ok(false);
    };
    if !awaiting_completion(track.status, &track.flags) {
        return Ok(false);
    }

    let pending = track_files::count_pending(&conn, track_id)?;
    if pending > 0 {
        tracing::debug!(track_id = %track_id, pending, "Track still has files in flight");
        return Ok(false);
    }

    if !tracks::compare_and_set_status(&conn, track_id, track.status, TrackStatus::NeedsCleanup)? {
        return Ok(false);
    }
    drop(conn);

    ctx.push(Channel::Cleanup, &JobRef::new(EntityKind::Track, track_id))?;
    tracing::info!(track_id = %track_id, from = %track.status, "All files finished; cleanup queued");
    Ok(true)
}
