//! Metadata extraction and the duration policy.

use async_trait::async_trait;
use serde::Deserialize;

use kf_core::template::TemplateContext;
use kf_core::{Channel, Result, TrackStatus};
use kf_db::models::Track;
use kf_db::queries::tracks;

use super::{invocation, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_track, enter_track_stage};

/// Thumbnail sizes in order of preference, as `(height, width)`.
const THUMBNAIL_SIZES: [(u32, u32); 4] = [(180, 320), (188, 336), (360, 480), (480, 640)];

/// The parts of the downloader's info JSON we keep.
#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    duration_string: Option<String>,
    /// Seconds.
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
    height: Option<u32>,
    width: Option<u32>,
}

fn pick_thumbnail(thumbnails: &[Thumbnail]) -> Option<&str> {
    THUMBNAIL_SIZES.iter().find_map(|&(height, width)| {
        thumbnails
            .iter()
            .find(|t| {
                t.height == Some(height) && t.width == Some(width) && t.url.ends_with(".jpg")
            })
            .map(|t| t.url.as_str())
    })
}

pub struct MetadataStage;

#[async_trait]
impl Task for MetadataStage {
    type Entity = Track;

    fn channel(&self) -> Channel {
        Channel::Metadata
    }

    async fn work(&self, ctx: &WorkerContext, mut track: Track, _tokens: Vec<String>) -> Result<()> {
        enter_track_stage(ctx, &mut track, TrackStatus::NeedsMetadata)?;

        let download_dir = &ctx.config.storage.download_dir;
        let vars = TemplateContext::new()
            .with_var("id", track.id)
            .with_var("url", &track.url);
        let inv = invocation(ctx, Channel::Metadata, &vars)?.mount(download_dir, "/output");
        ctx.runner.run(&inv).await?;

        let info_path = download_dir.join(format!("{}.info.json", track.id));
        require_output(&info_path)?;
        let info: InfoJson = serde_json::from_str(&std::fs::read_to_string(&info_path)?)?;

        let max = ctx.config.policy.max_duration_secs;
        {
            let conn = ctx.conn()?;
            tracks::update_metadata(
                &conn,
                track.id,
                info.title.as_deref(),
                pick_thumbnail(&info.thumbnails),
                info.duration_string.as_deref().unwrap_or("unknown"),
            )?;

            match info.duration {
                Some(secs) if secs > max as f64 => {
                    let reason = format!("duration {secs}s exceeds the {max}s limit");
                    tracks::reject(&conn, track.id, &reason)?;
                    tracing::warn!(track_id = %track.id, "Track rejected: {reason}");
                    return Ok(());
                }
                Some(_) => {}
                None => tracing::warn!(track_id = %track.id, "Source reports no duration"),
            }
        }

        tracing::info!(track_id = %track.id, title = ?info.title, "Metadata stored");
        advance_track(ctx, &mut track)
    }
}
