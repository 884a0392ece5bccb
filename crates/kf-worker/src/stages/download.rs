use async_trait::async_trait;

use kf_core::template::TemplateContext;
use kf_core::{Channel, Result, TrackStatus};
use kf_db::models::Track;

use super::{invocation, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_track, enter_track_stage};

/// Fetches the source audio as `<download>/<id>.wav`.
pub struct DownloadStage;

#[async_trait]
impl Task for DownloadStage {
    type Entity = Track;

    fn channel(&self) -> Channel {
        Channel::Download
    }

    async fn work(&self, ctx: &WorkerContext, mut track: Track, _tokens: Vec<String>) -> Result<()> {
        enter_track_stage(ctx, &mut track, TrackStatus::NeedsDownload)?;

        let download_dir = &ctx.config.storage.download_dir;
        let vars = TemplateContext::new()
            .with_var("id", track.id)
            .with_var("url", &track.url);
        let inv = invocation(ctx, Channel::Download, &vars)?.mount(download_dir, "/output");
        ctx.runner.run(&inv).await?;

        require_output(&download_dir.join(format!("{}.wav", track.id)))?;
        advance_track(ctx, &mut track)
    }
}
