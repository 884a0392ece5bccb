use async_trait::async_trait;

use kf_core::naming::public_url;
use kf_core::template::TemplateContext;
use kf_core::{Channel, FileStatus, Result};
use kf_db::models::TrackFile;
use kf_db::queries::track_files;

use super::encode::{path_token, split_path};
use super::{invocation, load_track, require_input};
use crate::completion;
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_file, enter_file_stage};

/// Publishes an encoded artifact, records its URL and checks whether the
/// track is finished.
pub struct UploadStage;

#[async_trait]
impl Task for UploadStage {
    type Entity = TrackFile;

    fn channel(&self) -> Channel {
        Channel::Upload
    }

    async fn work(&self, ctx: &WorkerContext, mut file: TrackFile, tokens: Vec<String>) -> Result<()> {
        enter_file_stage(ctx, &mut file, FileStatus::NeedsUpload, FileStatus::Uploading)?;

        let artifact = path_token(Channel::Upload, &tokens)?;
        require_input(Channel::Upload, &artifact)?;
        let (dir, input) = split_path(Channel::Upload, &artifact)?;

        let track = load_track(ctx, file.track_id)?;
        let name = file.artifact_name(&track)?.final_name();
        let store = &ctx.config.object_store;

        let vars = TemplateContext::new()
            .with_var("input", &input)
            .with_var("bucket", &store.bucket)
            .with_var("name", &name);
        let mut inv = invocation(ctx, Channel::Upload, &vars)?.mount_ro(&dir, "/input");
        if let Some(credentials) = &store.credentials_dir {
            inv = inv.mount_ro(credentials, "/root/.aws");
        }
        ctx.runner.run(&inv).await?;

        let url = public_url(&store.host, &store.bucket, &name);
        {
            let conn = ctx.conn()?;
            track_files::set_url(&conn, file.id, &url)?;
        }
        advance_file(ctx, &mut file, &[])?;
        tracing::info!(file_id = %file.id, url = %url, "Uploaded");

        completion::try_finish(ctx, file.track_id)?;
        Ok(())
    }
}
