//! Transition tables for tracks and track files.
//!
//! Both graphs are plain data. [`next_track_status`] and [`next_file_status`]
//! are pure lookups; the worker crate owns the side effects (persisting the
//! new status and pushing the follow-on reference).

use crate::flags::TrackFlags;
use crate::status::{Channel, FileStatus, TrackStatus};

/// Flag predicate attached to a track transition row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    Always,
    SplitEnabled,
    SplitSkippedRekeyEnabled,
    BothSkipped,
    RekeyEnabled,
    RekeySkipped,
}

impl Guard {
    pub fn holds(&self, flags: &TrackFlags) -> bool {
        match self {
            Guard::Always => true,
            Guard::SplitEnabled => flags.split_enabled(),
            Guard::SplitSkippedRekeyEnabled => flags.skip_split && flags.rekey_enabled(),
            Guard::BothSkipped => flags.skip_split && flags.skip_rekey,
            Guard::RekeyEnabled => flags.rekey_enabled(),
            Guard::RekeySkipped => flags.skip_rekey,
        }
    }
}

use TrackStatus as T;

/// `(from, guard, to)`. Exactly one row matches each non-terminal status for
/// any flag combination.
pub const TRACK_TRANSITIONS: &[(TrackStatus, Guard, TrackStatus)] = &[
    (T::Queued, Guard::Always, T::NeedsMetadata),
    (T::NeedsMetadata, Guard::Always, T::GettingMetadata),
    (T::GettingMetadata, Guard::Always, T::NeedsDownload),
    (T::NeedsDownload, Guard::Always, T::Downloading),
    (T::Downloading, Guard::Always, T::NeedsKeydetect),
    (T::NeedsKeydetect, Guard::Always, T::GettingKey),
    (T::GettingKey, Guard::SplitEnabled, T::NeedsSplit),
    (T::GettingKey, Guard::SplitSkippedRekeyEnabled, T::NeedsRekey),
    (T::GettingKey, Guard::BothSkipped, T::NeedsCleanup),
    (T::NeedsSplit, Guard::Always, T::Splitting),
    (T::Splitting, Guard::RekeyEnabled, T::NeedsRekey),
    (T::Splitting, Guard::RekeySkipped, T::NeedsCleanup),
    (T::NeedsRekey, Guard::Always, T::Rekeying),
    (T::Rekeying, Guard::Always, T::NeedsCleanup),
    (T::NeedsCleanup, Guard::Always, T::CleaningUp),
    (T::CleaningUp, Guard::Always, T::Done),
];

/// Look up the successor of `status`. Terminal statuses have none.
pub fn next_track_status(status: TrackStatus, flags: &TrackFlags) -> Option<TrackStatus> {
    TRACK_TRANSITIONS
        .iter()
        .find(|(from, guard, _)| *from == status && guard.holds(flags))
        .map(|(_, _, to)| *to)
}

/// Channel a track is pushed to on entering `status`, if any.
///
/// NEEDS_REKEY has no single channel: entering it fans out one rekey
/// reference per planned file.
pub fn track_channel(status: TrackStatus) -> Option<Channel> {
    match status {
        T::NeedsMetadata => Some(Channel::Metadata),
        T::NeedsDownload => Some(Channel::Download),
        T::NeedsKeydetect => Some(Channel::KeyDetect),
        T::NeedsSplit => Some(Channel::Split),
        T::NeedsCleanup => Some(Channel::Cleanup),
        _ => None,
    }
}

/// True when `status` is one from which the track proceeds straight to
/// cleanup given `flags`. Completion detection only fires from these.
pub fn awaiting_completion(status: TrackStatus, flags: &TrackFlags) -> bool {
    next_track_status(status, flags) == Some(T::NeedsCleanup)
}

use FileStatus as F;

/// Table transitions of the file graph. ENCODING and UPLOADING are entered
/// directly by their stage workers.
pub const FILE_TRANSITIONS: &[(FileStatus, FileStatus)] = &[
    (F::Queued, F::Working),
    (F::Working, F::NeedsEncoding),
    (F::Encoding, F::NeedsUpload),
    (F::Uploading, F::Done),
];

pub fn next_file_status(status: FileStatus) -> Option<FileStatus> {
    FILE_TRANSITIONS
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, to)| *to)
}

/// Channel a file is pushed to on entering `status`, if any.
pub fn file_channel(status: FileStatus) -> Option<Channel> {
    match status {
        F::NeedsEncoding => Some(Channel::Encode),
        F::NeedsUpload => Some(Channel::Upload),
        _ => None,
    }
}
