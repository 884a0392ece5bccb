//! Pipeline stages.
//!
//! Each stage is a unit struct implementing [`Task`](crate::harness::Task).
//! Container stages share the same shape: enter the working status, run one
//! container, verify the files it should have produced, persist what was
//! learned and fire the next transition.

mod cleanup;
mod download;
mod encode;
mod keydetect;
mod metadata;
mod rekey;
mod split;
mod upload;

pub use cleanup::CleanupStage;
pub use download::DownloadStage;
pub use encode::EncodeStage;
pub use keydetect::KeyDetectStage;
pub use metadata::MetadataStage;
pub use rekey::RekeyStage;
pub use split::SplitStage;
pub use upload::UploadStage;

use std::path::Path;

use kf_core::template::TemplateContext;
use kf_core::{Channel, Error, Result, TrackId};
use kf_db::models::Track;
use kf_db::queries::tracks;
use kf_tools::ContainerInvocation;

use crate::context::WorkerContext;

/// Build the configured container for `channel` with its command rendered.
pub(crate) fn invocation(
    ctx: &WorkerContext,
    channel: Channel,
    vars: &TemplateContext,
) -> Result<ContainerInvocation> {
    let containers = &ctx.config.containers;
    let stage = containers
        .stage(channel)
        .ok_or_else(|| Error::stage(channel.as_str(), "no container configured"))?;

    Ok(ContainerInvocation::new(&stage.image)
        .user(containers.user_for(stage))
        .args(vars.render_all(&stage.command)?))
}

/// Fail unless a tool left `path` behind.
pub(crate) fn require_output(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::missing_output(path))
    }
}

/// Fail unless an input produced by an earlier stage is present.
pub(crate) fn require_input(stage: Channel, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::stage(
            stage.as_str(),
            format!("input missing: {}", path.display()),
        ))
    }
}

pub(crate) fn load_track(ctx: &WorkerContext, id: TrackId) -> Result<Track> {
    let conn = ctx.conn()?;
    tracks::get_track(&conn, id)?.ok_or_else(|| Error::not_found("track", id))
}
