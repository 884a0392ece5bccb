//! Status, file-type and channel enums for the pipeline.
//!
//! Statuses are persisted as upper-case text (`NEEDS_METADATA`), channels as
//! the short lower-case names the workers are started with (`key_detect`).
//! Both directions go through [`fmt::Display`] and [`FromStr`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Implements `as_str`, `Display`, `FromStr` and `ALL` for a fieldless enum
/// from one list of `Variant => "text"` pairs.
macro_rules! string_enum {
    ($name:ident, $label:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The persisted text form.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::Validation(format!(
                        "unknown {}: {other}",
                        $label
                    ))),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// TrackStatus
// ---------------------------------------------------------------------------

/// Workflow status of a [`Track`](crate) work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackStatus {
    Queued,
    NeedsMetadata,
    GettingMetadata,
    NeedsDownload,
    Downloading,
    NeedsKeydetect,
    GettingKey,
    NeedsSplit,
    Splitting,
    NeedsRekey,
    Rekeying,
    NeedsCleanup,
    CleaningUp,
    Done,
    Error,
    Rejected,
}

string_enum!(TrackStatus, "track status", {
    Queued => "QUEUED",
    NeedsMetadata => "NEEDS_METADATA",
    GettingMetadata => "GETTING_METADATA",
    NeedsDownload => "NEEDS_DOWNLOAD",
    Downloading => "DOWNLOADING",
    NeedsKeydetect => "NEEDS_KEYDETECT",
    GettingKey => "GETTING_KEY",
    NeedsSplit => "NEEDS_SPLIT",
    Splitting => "SPLITTING",
    NeedsRekey => "NEEDS_REKEY",
    Rekeying => "REKEYING",
    NeedsCleanup => "NEEDS_CLEANUP",
    CleaningUp => "CLEANING_UP",
    Done => "DONE",
    Error => "ERROR",
    Rejected => "REJECTED",
});

impl TrackStatus {
    /// DONE, ERROR and REJECTED never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Rejected)
    }

    /// Position along the main line of the graph. Used to check that a
    /// transition never moves backwards; the absorbing overrides rank last.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::NeedsMetadata => 1,
            Self::GettingMetadata => 2,
            Self::NeedsDownload => 3,
            Self::Downloading => 4,
            Self::NeedsKeydetect => 5,
            Self::GettingKey => 6,
            Self::NeedsSplit => 7,
            Self::Splitting => 8,
            Self::NeedsRekey => 9,
            Self::Rekeying => 10,
            Self::NeedsCleanup => 20,
            Self::CleaningUp => 21,
            Self::Done => 30,
            Self::Error => 50,
            Self::Rejected => 51,
        }
    }
}

// ---------------------------------------------------------------------------
// FileStatus
// ---------------------------------------------------------------------------

/// Status of one derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Queued,
    Working,
    NeedsEncoding,
    Encoding,
    NeedsUpload,
    Uploading,
    Done,
    Error,
}

string_enum!(FileStatus, "file status", {
    Queued => "QUEUED",
    Working => "WORKING",
    NeedsEncoding => "NEEDS_ENCODING",
    Encoding => "ENCODING",
    NeedsUpload => "NEEDS_UPLOAD",
    Uploading => "UPLOADING",
    Done => "DONE",
    Error => "ERROR",
});

impl FileStatus {
    /// DONE and ERROR count as finished for completion detection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    /// Position along the file graph; ERROR ranks last.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Working => 1,
            Self::NeedsEncoding => 2,
            Self::Encoding => 3,
            Self::NeedsUpload => 4,
            Self::Uploading => 5,
            Self::Done => 20,
            Self::Error => 50,
        }
    }
}

// ---------------------------------------------------------------------------
// FileType
// ---------------------------------------------------------------------------

/// Kind of derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    NormalAudio,
    InstrumentalAudio,
    NormalVideo,
    InstrumentalVideo,
}

string_enum!(FileType, "file type", {
    NormalAudio => "NORMAL_AUDIO",
    InstrumentalAudio => "INSTRUMENTAL_AUDIO",
    NormalVideo => "NORMAL_VIDEO",
    InstrumentalVideo => "INSTRUMENTAL_VIDEO",
});

impl FileType {
    /// True for the vocals-removed variants.
    pub fn is_instrumental(&self) -> bool {
        matches!(self, Self::InstrumentalAudio | Self::InstrumentalVideo)
    }

    /// Extension of the encoded, uploaded artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::NormalAudio | Self::InstrumentalAudio => "mp3",
            Self::NormalVideo | Self::InstrumentalVideo => "mp4",
        }
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A named queue channel. Each pipeline stage polls exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Metadata,
    Download,
    KeyDetect,
    Split,
    Rekey,
    Encode,
    Upload,
    Cleanup,
}

string_enum!(Channel, "channel", {
    Metadata => "metadata",
    Download => "download",
    KeyDetect => "key_detect",
    Split => "split",
    Rekey => "rekey",
    Encode => "encode",
    Upload => "upload",
    Cleanup => "cleanup",
});
