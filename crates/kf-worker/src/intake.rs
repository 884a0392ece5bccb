//! Track submission.

use std::sync::LazyLock;

use regex::Regex;

use kf_core::{Error, Result, TrackFlags};
use kf_db::models::Track;
use kf_db::queries::tracks;

use crate::context::WorkerContext;
use crate::machine::advance_track;

static SOURCE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/$.?#][^\s]*$").expect("static regex"));

/// Playlist-position tracking parameter appended by share links.
static TRACKING_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=&]pp=[a-zA-Z0-9%]+").expect("static regex"));

/// Validate a source URL and strip tracking parameters.
pub fn clean_url(url: &str) -> Result<String> {
    let url = url.trim();
    if !SOURCE_URL.is_match(url) {
        return Err(Error::Validation(format!("not an http(s) URL: {url:?}")));
    }
    Ok(TRACKING_PARAM.replace_all(url, "").into_owned())
}

/// Create a QUEUED track and fire its first transition.
pub fn submit(
    ctx: &WorkerContext,
    url: &str,
    flags: TrackFlags,
    requested_by: Option<&str>,
) -> Result<Track> {
    let url = clean_url(url)?;
    let mut track = {
        let conn = ctx.conn()?;
        tracks::create_track(&conn, &url, flags, requested_by)?
    };
    tracing::info!(track_id = %track.id, url = %url, flags = %flags, "Track submitted");

    advance_track(ctx, &mut track)?;
    Ok(track)
}
