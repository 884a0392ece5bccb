//! Per-track option flags.
//!
//! Flags are fixed when a track is submitted. They are stored as an integer
//! bitmask (bits 1, 2, 4, 8, 16, 32) but handled in code as named booleans.

use serde::{Deserialize, Serialize};
use std::fmt;

const SKIP_SPLIT: i64 = 1;
const SKIP_REKEY: i64 = 2;
const PRIVATE: i64 = 4;
const RESTITCH_VIDEO: i64 = 8;
const REKEY_COMMON: i64 = 16;
const NOVOX_FIRST: i64 = 32;

/// Options controlling which stages run and how derived files are planned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackFlags {
    /// Do not run vocal separation; no instrumental files are produced.
    pub skip_split: bool,
    /// Do not produce transposed copies.
    pub skip_rekey: bool,
    /// Hide the track from other requesters' listings.
    pub private: bool,
    /// Reserved for video output; persisted but not acted on.
    pub restitch_video: bool,
    /// Only transpose into F, C, G, D or A.
    pub rekey_common: bool,
    /// Plan instrumental files ahead of normal ones.
    pub novox_first: bool,
}

impl TrackFlags {
    /// Decode the persisted bitmask. Unknown bits are ignored.
    pub fn from_bits(bits: i64) -> Self {
        Self {
            skip_split: bits & SKIP_SPLIT != 0,
            skip_rekey: bits & SKIP_REKEY != 0,
            private: bits & PRIVATE != 0,
            restitch_video: bits & RESTITCH_VIDEO != 0,
            rekey_common: bits & REKEY_COMMON != 0,
            novox_first: bits & NOVOX_FIRST != 0,
        }
    }

    /// Encode into the persisted bitmask.
    pub fn bits(&self) -> i64 {
        let mut bits = 0;
        if self.skip_split {
            bits |= SKIP_SPLIT;
        }
        if self.skip_rekey {
            bits |= SKIP_REKEY;
        }
        if self.private {
            bits |= PRIVATE;
        }
        if self.restitch_video {
            bits |= RESTITCH_VIDEO;
        }
        if self.rekey_common {
            bits |= REKEY_COMMON;
        }
        if self.novox_first {
            bits |= NOVOX_FIRST;
        }
        bits
    }

    pub fn split_enabled(&self) -> bool {
        !self.skip_split
    }

    pub fn rekey_enabled(&self) -> bool {
        !self.skip_rekey
    }
}

impl fmt::Display for TrackFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.skip_split, "skip-split"),
            (self.skip_rekey, "skip-rekey"),
            (self.private, "private"),
            (self.restitch_video, "restitch-video"),
            (self.rekey_common, "rekey-common"),
            (self.novox_first, "novox-first"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(","))
        }
    }
}
