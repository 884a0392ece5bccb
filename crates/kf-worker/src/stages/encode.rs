use std::path::{Path, PathBuf};

use async_trait::async_trait;

use kf_core::template::TemplateContext;
use kf_core::{Channel, Error, FileStatus, Result};
use kf_db::models::TrackFile;

use super::{invocation, load_track, require_input, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_file, enter_file_stage};

/// Split a host path carried on a reference into its directory and file name.
pub(crate) fn split_path(stage: Channel, path: &Path) -> Result<(PathBuf, String)> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    match (dir, name) {
        (Some(dir), Some(name)) => Ok((dir.to_path_buf(), name)),
        _ => Err(Error::stage(
            stage.as_str(),
            format!("not a file path: {}", path.display()),
        )),
    }
}

/// Path token a file reference must carry.
pub(crate) fn path_token(stage: Channel, tokens: &[String]) -> Result<PathBuf> {
    tokens
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| Error::stage(stage.as_str(), "reference carries no file path"))
}

/// Encodes a rendered wav next to itself under its final name, tagging the
/// title with the transposed key.
pub struct EncodeStage;

#[async_trait]
impl Task for EncodeStage {
    type Entity = TrackFile;

    fn channel(&self) -> Channel {
        Channel::Encode
    }

    async fn work(&self, ctx: &WorkerContext, mut file: TrackFile, tokens: Vec<String>) -> Result<()> {
        enter_file_stage(ctx, &mut file, FileStatus::NeedsEncoding, FileStatus::Encoding)?;

        let audio = path_token(Channel::Encode, &tokens)?;
        require_input(Channel::Encode, &audio)?;
        let (dir, input) = split_path(Channel::Encode, &audio)?;

        let track = load_track(ctx, file.track_id)?;
        let name = file.artifact_name(&track)?;
        let output = name.final_name();

        let vars = TemplateContext::new()
            .with_var("input", &input)
            .with_var("output", &output)
            .with_var("title", name.title_tag());
        let inv = invocation(ctx, Channel::Encode, &vars)?.mount(&dir, "/work");
        ctx.runner.run(&inv).await?;

        let encoded = dir.join(&output);
        require_output(&encoded)?;
        tracing::info!(file_id = %file.id, output = %output, "Encoded");

        advance_file(ctx, &mut file, &[encoded.to_string_lossy().into_owned()])
    }
}
