//! The generic task loop every stage runs on.
//!
//! A stage only supplies a [`Task`]: which channel it polls, which entity its
//! references name, and the work to do once the entity is loaded. Popping,
//! decoding, resolution, failure containment and the polling cadence live
//! here.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use rusqlite::Connection;
use tokio_util::sync::CancellationToken;

use kf_core::{Channel, EntityKind, Error, JobRef, Result, TrackFileId, TrackId};
use kf_db::models::{Track, TrackFile};
use kf_db::queries::{track_files, tracks};

use crate::completion;
use crate::context::WorkerContext;

/// An entity a queue reference can name.
pub trait WorkItem: Sized + Send + Sync + 'static {
    const KIND: EntityKind;

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>>;

    /// Force the entity to its ERROR status with `message`.
    fn record_failure(conn: &Connection, id: i64, message: &str) -> Result<()>;

    /// The track whose completion may depend on this entity.
    fn parent_track(&self) -> Option<TrackId>;
}

impl WorkItem for Track {
    const KIND: EntityKind = EntityKind::Track;

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>> {
        tracks::get_track(conn, TrackId::from(id))
    }

    fn record_failure(conn: &Connection, id: i64, message: &str) -> Result<()> {
        tracks::set_error(conn, TrackId::from(id), message)?;
        Ok(())
    }

    fn parent_track(&self) -> Option<TrackId> {
        None
    }
}

impl WorkItem for TrackFile {
    const KIND: EntityKind = EntityKind::TrackFile;

    fn load(conn: &Connection, id: i64) -> Result<Option<Self>> {
        track_files::get_file(conn, TrackFileId::from(id))
    }

    fn record_failure(conn: &Connection, id: i64, message: &str) -> Result<()> {
        track_files::set_error(conn, TrackFileId::from(id), message)?;
        Ok(())
    }

    fn parent_track(&self) -> Option<TrackId> {
        Some(self.track_id)
    }
}

/// Stage-specific logic run by the harness.
#[async_trait]
pub trait Task: Send + Sync {
    type Entity: WorkItem;

    /// The channel this stage polls.
    fn channel(&self) -> Channel;

    /// Process one resolved entity. Any error marks the entity ERROR.
    async fn work(&self, ctx: &WorkerContext, entity: Self::Entity, tokens: Vec<String>) -> Result<()>;
}

/// What happened to one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The channel was empty.
    Idle,
    Completed,
    /// Work failed and the entity was marked ERROR.
    Failed,
    /// The reference could not be resolved and was discarded.
    Dropped,
}

/// Decode a reference and load the entity it names.
///
/// `Ok(Err(reason))` is a structural failure: the reference is unusable and
/// nothing was mutated.
fn resolve<E: WorkItem>(
    ctx: &WorkerContext,
    raw: &str,
) -> Result<std::result::Result<(E, JobRef), String>> {
    let job = match JobRef::decode(raw) {
        Ok(job) => job,
        Err(e) => return Ok(Err(e.to_string())),
    };
    if job.kind != E::KIND {
        return Ok(Err(format!("expected {} reference, got {}", E::KIND, job.kind)));
    }

    let conn = ctx.conn()?;
    match E::load(&conn, job.id)? {
        Some(entity) => Ok(Ok((entity, job))),
        None => Ok(Err(Error::not_found(E::KIND.as_str(), job.id).to_string())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Pop and process at most one reference from the task's channel.
///
/// Errors returned here are infrastructure failures (database, queue). Stage
/// failures are contained and reported as [`Outcome::Failed`].
pub async fn process_next<T: Task>(ctx: &WorkerContext, task: &T) -> Result<Outcome> {
    let channel = task.channel();
    let Some(raw) = ctx.queue.pop(channel)? else {
        return Ok(Outcome::Idle);
    };

    let (entity, job) = match resolve::<T::Entity>(ctx, &raw)? {
        Ok(resolved) => resolved,
        Err(reason) => {
            tracing::warn!(channel = %channel, reference = %raw, "Dropping job: {reason}");
            return Ok(Outcome::Dropped);
        }
    };

    let id = job.id;
    let parent = entity.parent_track();
    tracing::info!(channel = %channel, reference = %raw, "Processing job");

    let result = AssertUnwindSafe(task.work(ctx, entity, job.tokens))
        .catch_unwind()
        .await;

    let message = match result {
        Ok(Ok(())) => {
            tracing::debug!(channel = %channel, reference = %raw, "Job completed");
            return Ok(Outcome::Completed);
        }
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    tracing::error!(channel = %channel, reference = %raw, error = %message, "Job failed");
    {
        let conn = ctx.conn()?;
        <T::Entity as WorkItem>::record_failure(&conn, id, &message)?;
    }

    if let Some(track_id) = parent {
        completion::try_finish(ctx, track_id)?;
    }

    Ok(Outcome::Failed)
}

/// Poll a task's channel until `cancel` fires.
///
/// A processed job is followed immediately by the next poll; an empty
/// channel waits for the configured interval. Cancellation is only observed
/// between jobs.
pub async fn run_task<T: Task>(ctx: WorkerContext, task: T, cancel: CancellationToken) {
    let channel = task.channel();
    let interval = ctx.config.worker.poll_interval();
    tracing::info!(channel = %channel, "Stage worker started");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match process_next(&ctx, &task).await {
            Ok(Outcome::Idle) => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(channel = %channel, "Stage worker error: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => { break; }
        }
    }

    tracing::info!(channel = %channel, "Stage worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use kf_core::{FileStatus, FileType, TrackFlags, TrackStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        calls: AtomicUsize,
        behaviour: fn() -> Result<()>,
    }

    impl CountingTask {
        fn new(behaviour: fn() -> Result<()>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                behaviour,
            }
        }
    }

    #[async_trait]
    impl Task for CountingTask {
        type Entity = Track;

        fn channel(&self) -> Channel {
            Channel::Download
        }

        async fn work(&self, _ctx: &WorkerContext, _track: Track, _tokens: Vec<String>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.behaviour)()
        }
    }

    fn new_track(ctx: &WorkerContext) -> Track {
        let conn = ctx.conn().unwrap();
        tracks::create_track(&conn, "https://x.test/v", TrackFlags::default(), None).unwrap()
    }

    fn status_of(ctx: &WorkerContext, id: TrackId) -> TrackStatus {
        let conn = ctx.conn().unwrap();
        tracks::get_track(&conn, id).unwrap().unwrap().status
    }

    #[tokio::test]
    async fn empty_channel_is_idle() {
        let (ctx, _dir) = test_context();
        let task = CountingTask::new(|| Ok(()));
        assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Idle);
    }

    #[tokio::test]
    async fn successful_work_completes() {
        let (ctx, _dir) = test_context();
        let track = new_track(&ctx);
        ctx.queue.push(Channel::Download, &format!("Track:{}", track.id)).unwrap();

        let task = CountingTask::new(|| Ok(()));
        assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Completed);
        assert_eq!(task.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status_of(&ctx, track.id), TrackStatus::Queued);
    }

    #[tokio::test]
    async fn type_tag_mismatch_is_dropped_without_mutation() {
        let (ctx, _dir) = test_context();
        let track = new_track(&ctx);
        ctx.queue.push(Channel::Download, &format!("TrackFile:{}", track.id)).unwrap();

        let task = CountingTask::new(|| Ok(()));
        assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Dropped);
        assert_eq!(task.calls.load(Ordering::SeqCst), 0);
        assert_eq!(status_of(&ctx, track.id), TrackStatus::Queued);
    }

    #[tokio::test]
    async fn malformed_and_unknown_references_are_dropped() {
        let (ctx, _dir) = test_context();
        ctx.queue.push(Channel::Download, "Track").unwrap();
        ctx.queue.push(Channel::Download, "Album:3").unwrap();
        ctx.queue.push(Channel::Download, "Track:404").unwrap();

        let task = CountingTask::new(|| Ok(()));
        for _ in 0..3 {
            assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Dropped);
        }
        assert_eq!(task.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn work_error_marks_entity_error() {
        let (ctx, _dir) = test_context();
        let track = new_track(&ctx);
        ctx.queue.push(Channel::Download, &format!("Track:{}", track.id)).unwrap();

        let task = CountingTask::new(|| Err(Error::tool("yt-dlp", "exit 1")));
        assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Failed);

        let conn = ctx.conn().unwrap();
        let track = tracks::get_track(&conn, track.id).unwrap().unwrap();
        assert_eq!(track.status, TrackStatus::Error);
        assert!(track.error_message.unwrap().contains("exit 1"));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let (ctx, _dir) = test_context();
        let track = new_track(&ctx);
        ctx.queue.push(Channel::Download, &format!("Track:{}", track.id)).unwrap();

        let task = CountingTask::new(|| panic!("boom"));
        assert_eq!(process_next(&ctx, &task).await.unwrap(), Outcome::Failed);

        let conn = ctx.conn().unwrap();
        let track = tracks::get_track(&conn, track.id).unwrap().unwrap();
        assert_eq!(track.status, TrackStatus::Error);
        assert_eq!(track.error_message.as_deref(), Some("panicked: boom"));
    }

    struct FailingFile;

    #[async_trait]
    impl Task for FailingFile {
        type Entity = TrackFile;

        fn channel(&self) -> Channel {
            Channel::Upload
        }

        async fn work(&self, _ctx: &WorkerContext, _file: TrackFile, _tokens: Vec<String>) -> Result<()> {
            Err(Error::tool("aws", "denied"))
        }
    }

    #[tokio::test]
    async fn last_file_failure_triggers_cleanup() {
        let (ctx, _dir) = test_context();
        let file = {
            let conn = ctx.conn().unwrap();
            let flags = TrackFlags {
                skip_split: true,
                skip_rekey: true,
                ..Default::default()
            };
            let track = tracks::create_track(&conn, "https://x.test/v", flags, None).unwrap();
            tracks::set_status(&conn, track.id, TrackStatus::GettingKey).unwrap();
            track_files::prep_file(&conn, track.id, 0, FileType::NormalAudio).unwrap()
        };
        ctx.queue.push(Channel::Upload, &format!("TrackFile:{}", file.id)).unwrap();

        assert_eq!(process_next(&ctx, &FailingFile).await.unwrap(), Outcome::Failed);

        let conn = ctx.conn().unwrap();
        let file = track_files::get_file(&conn, file.id).unwrap().unwrap();
        assert_eq!(file.status, FileStatus::Error);
        let track = tracks::get_track(&conn, file.track_id).unwrap().unwrap();
        assert_eq!(track.status, TrackStatus::NeedsCleanup);
        assert_eq!(ctx.queue.depth(Channel::Cleanup).unwrap(), 1);
    }

    #[tokio::test]
    async fn run_task_stops_on_cancel() {
        let (ctx, _dir) = test_context();
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            run_task(ctx, CountingTask::new(|| Ok(())), cancel),
        )
        .await
        .unwrap();
    }
}
