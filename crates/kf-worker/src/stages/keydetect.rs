//! Key detection.
//!
//! Besides storing the key, this stage creates the original-key file and
//! sends the source audio straight to the encoder.

use async_trait::async_trait;
use serde::Deserialize;

use kf_core::music::normalize;
use kf_core::template::TemplateContext;
use kf_core::{Channel, FileType, PitchClass, Result, TrackStatus};
use kf_db::models::Track;
use kf_db::queries::{track_files, tracks};

use super::{invocation, require_input, require_output};
use crate::context::WorkerContext;
use crate::harness::Task;
use crate::machine::{advance_track, enter_track_stage, queue_encode};

/// `<key>/<id>.key.json` as written by the detector.
#[derive(Debug, Deserialize)]
struct KeyResult {
    key: String,
    scale: String,
}

impl KeyResult {
    fn pitch_class(&self) -> Result<PitchClass> {
        normalize(self.key.trim()).parse()
    }
}

pub struct KeyDetectStage;

#[async_trait]
impl Task for KeyDetectStage {
    type Entity = Track;

    fn channel(&self) -> Channel {
        Channel::KeyDetect
    }

    async fn work(&self, ctx: &WorkerContext, mut track: Track, _tokens: Vec<String>) -> Result<()> {
        enter_track_stage(ctx, &mut track, TrackStatus::NeedsKeydetect)?;

        let storage = &ctx.config.storage;
        let source = storage.download_dir.join(format!("{}.wav", track.id));
        require_input(Channel::KeyDetect, &source)?;

        let vars = TemplateContext::new().with_var("id", track.id);
        let inv = invocation(ctx, Channel::KeyDetect, &vars)?
            .mount_ro(&storage.download_dir, "/input")
            .mount(&storage.key_dir, "/output");
        ctx.runner.run(&inv).await?;

        let key_path = storage.key_dir.join(format!("{}.key.json", track.id));
        require_output(&key_path)?;
        let result: KeyResult = serde_json::from_str(&std::fs::read_to_string(&key_path)?)?;
        let key = result.pitch_class()?;

        let mut original = {
            let conn = ctx.conn()?;
            tracks::update_key(&conn, track.id, key, &result.scale)?;
            track_files::prep_file(&conn, track.id, 0, FileType::NormalAudio)?
        };
        track.key = Some(key);
        track.quality = Some(result.scale);
        tracing::info!(track_id = %track.id, key = %key, quality = ?track.quality, "Key detected");

        queue_encode(ctx, &mut original, &source)?;
        advance_track(ctx, &mut track)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<PitchClass> {
        serde_json::from_str::<KeyResult>(json).unwrap().pitch_class()
    }

    #[test]
    fn detector_spellings_are_normalized() {
        assert_eq!(parse(r#"{"key": "A#", "scale": "minor"}"#).unwrap(), PitchClass::Bb);
        assert_eq!(parse(r#"{"key": "Gb", "scale": "major"}"#).unwrap(), PitchClass::FSharp);
        assert_eq!(parse(r#"{"key": "E", "scale": "major"}"#).unwrap(), PitchClass::E);
    }

    #[test]
    fn unknown_key_is_rejected() {
        assert!(parse(r#"{"key": "H", "scale": "major"}"#).is_err());
    }
}
