//! Artifact naming.
//!
//! Derived files are named `<key>[-noVocal]-<slug>.<fileId>.<ext>`, e.g.
//! `Bflatm-noVocal-hello-world.305.mp3`. The same name is used on local disk
//! and as the object-store key.

use regex::Regex;
use std::sync::LazyLock;

use crate::music::PitchClass;
use crate::status::FileType;

static UNSAFE_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\- ]+.*$").expect("static regex"));

static DASH_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").expect("static regex"));

/// Reduce a title to a file-name-safe slug.
///
/// Lower-cases, drops apostrophes and slashes, cuts everything from the first
/// remaining character outside `[a-z0-9- ]`, turns spaces into dashes and
/// collapses dash runs. An empty result falls back to the last three digits
/// of the zero-padded file id.
pub fn slug(title: &str, file_id: i64) -> String {
    let lowered: String = title
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'' && *c != '/')
        .collect();
    let cut = UNSAFE_TAIL.replace(&lowered, "");
    let dashed = cut.trim_matches(' ').replace(' ', "-");
    let collapsed = DASH_RUN.replace_all(&dashed, "-").into_owned();

    if collapsed.is_empty() {
        let padded = format!("000{file_id}");
        padded[padded.len() - 3..].to_string()
    } else {
        collapsed
    }
}

/// True unless `quality` is exactly "major".
pub fn is_minor(quality: &str) -> bool {
    quality != "major"
}

/// Key spelled for file names: `b` as `flat`, `#` as `sharp`, plus `m` for
/// anything that is not major.
pub fn nice_key(key: PitchClass, offset: i32, quality: &str) -> String {
    let name = key
        .transpose(offset)
        .name()
        .replace('b', "flat")
        .replace('#', "sharp");
    if is_minor(quality) {
        format!("{name}m")
    } else {
        name
    }
}

/// Human display of a key, e.g. `F# major`, `D minor`.
pub fn display_key(key: PitchClass, quality: &str) -> String {
    let mode = if is_minor(quality) { "minor" } else { "major" };
    format!("{key} {mode}")
}

/// Offset with an explicit sign: `+1`, `0`, `-1`.
pub fn signed_offset(offset: i32) -> String {
    if offset > 0 {
        format!("+{offset}")
    } else {
        offset.to_string()
    }
}

/// Everything needed to name one derived file.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactName<'a> {
    pub file_id: i64,
    pub key: PitchClass,
    pub quality: &'a str,
    pub offset: i32,
    pub file_type: FileType,
    pub title: &'a str,
}

impl ArtifactName<'_> {
    pub fn nice_key(&self) -> String {
        nice_key(self.key, self.offset, self.quality)
    }

    /// File name with the given extension.
    pub fn with_ext(&self, ext: &str) -> String {
        let vox = if self.file_type.is_instrumental() {
            "-noVocal"
        } else {
            ""
        };
        format!(
            "{}{vox}-{}.{}.{ext}",
            self.nice_key(),
            slug(self.title, self.file_id),
            self.file_id
        )
    }

    /// File name with the extension of the final encoded artifact.
    pub fn final_name(&self) -> String {
        self.with_ext(self.file_type.extension())
    }

    /// Title tag written by the encoder: `<niceKey> - <title>`.
    pub fn title_tag(&self) -> String {
        format!("{} - {}", self.nice_key(), self.title)
    }
}

/// Public URL of an uploaded object.
pub fn public_url(host: &str, bucket: &str, name: &str) -> String {
    format!("https://{host}/{bucket}/{name}")
}
