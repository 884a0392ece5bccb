use async_trait::async_trait;

use kf_core::template::TemplateContext;
use kf_core::{Channel, FileType, Result, TrackStatus};
use kf_db::models::Track;
use kf_db::queries::track_files;

use super::{invocation, require_input, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_track, enter_track_stage, queue_encode};

/// Separates vocals from accompaniment and queues the original-key
/// instrumental for encoding.
pub struct SplitStage;

#[async_trait]
impl Task for SplitStage {
    type Entity = Track;

    fn channel(&self) -> Channel {
        Channel::Split
    }

    async fn work(&self, ctx: &WorkerContext, mut track: Track, _tokens: Vec<String>) -> Result<()> {
        // The instrumental must count as pending while the separator runs,
        // or a finished original upload could hand the track to cleanup.
        let mut instrumental = {
            let conn = ctx.conn()?;
            track_files::prep_file(&conn, track.id, 0, FileType::InstrumentalAudio)?
        };
        enter_track_stage(ctx, &mut track, TrackStatus::NeedsSplit)?;

        let storage = &ctx.config.storage;
        require_input(Channel::Split, &storage.download_dir.join(format!("{}.wav", track.id)))?;

        let vars = TemplateContext::new().with_var("id", track.id);
        let inv = invocation(ctx, Channel::Split, &vars)?
            .mount_ro(&storage.download_dir, "/input")
            .mount(&storage.split_dir, "/output");
        ctx.runner.run(&inv).await?;

        let accompaniment = storage
            .split_dir
            .join(track.id.to_string())
            .join("accompaniment.wav");
        require_output(&accompaniment)?;

        queue_encode(ctx, &mut instrumental, &accompaniment)?;
        advance_track(ctx, &mut track)
    }
}
