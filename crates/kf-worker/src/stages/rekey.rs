use async_trait::async_trait;

use kf_core::template::TemplateContext;
use kf_core::{Channel, Error, FileStatus, Result, TrackStatus};
use kf_db::models::TrackFile;

use super::{invocation, load_track, require_input, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_file, enter_file_stage};

/// Pitch-shifts one planned file into `<rekey>/<niceName>.wav`.
///
/// Instrumental files read the separated accompaniment, normal files the
/// source download.
pub struct RekeyStage;

#[async_trait]
impl Task for RekeyStage {
    type Entity = TrackFile;

    fn channel(&self) -> Channel {
        Channel::Rekey
    }

    async fn work(&self, ctx: &WorkerContext, mut file: TrackFile, _tokens: Vec<String>) -> Result<()> {
        let track = load_track(ctx, file.track_id)?;
        if !matches!(track.status, TrackStatus::NeedsRekey | TrackStatus::Rekeying) {
            return Err(Error::Conflict(format!(
                "track {} is {}, not rekeying",
                track.id, track.status
            )));
        }
        enter_file_stage(ctx, &mut file, FileStatus::Queued, FileStatus::Working)?;

        let storage = &ctx.config.storage;
        let (input_dir, input) = if file.file_type.is_instrumental() {
            (&storage.split_dir, format!("{}/accompaniment.wav", track.id))
        } else {
            (&storage.download_dir, format!("{}.wav", track.id))
        };
        require_input(Channel::Rekey, &input_dir.join(&input))?;

        let output = file.artifact_name(&track)?.with_ext("wav");
        let vars = TemplateContext::new()
            .with_var("offset", file.key_offset)
            .with_var("input", &input)
            .with_var("output", &output);
        let inv = invocation(ctx, Channel::Rekey, &vars)?
            .mount_ro(input_dir, "/input")
            .mount(&storage.rekey_dir, "/output");
        ctx.runner.run(&inv).await?;

        let rekeyed = storage.rekey_dir.join(&output);
        require_output(&rekeyed)?;
        tracing::info!(file_id = %file.id, offset = file.key_offset, output = %output, "Rekeyed");

        advance_file(ctx, &mut file, &[rekeyed.to_string_lossy().into_owned()])
    }
}
