//! Expansion of one detected key into the derived files to produce.

use std::ops::RangeInclusive;

use crate::flags::TrackFlags;
use crate::music::PitchClass;
use crate::status::FileType;

/// Semitone offsets considered for transposition.
pub const OFFSET_RANGE: RangeInclusive<i32> = -6..=6;

/// One planned derived file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivedFileSpec {
    pub offset: i32,
    pub file_type: FileType,
}

/// Non-zero offsets ordered 1, -1, 2, -2 ... 6, -6.
pub fn ordered_offsets() -> Vec<i32> {
    let mut offsets: Vec<i32> = OFFSET_RANGE.filter(|o| *o != 0).collect();
    offsets.sort_by_key(|o| (o.abs(), *o < 0));
    offsets
}

/// Plan the rekeyed files for a track in `key`.
///
/// Normal audio comes first for each offset, followed by its instrumental
/// twin when separation ran. With `novox_first` every instrumental moves
/// ahead of every normal file, keeping the offset order within each group.
pub fn plan(key: PitchClass, flags: &TrackFlags) -> Vec<DerivedFileSpec> {
    let mut specs = Vec::new();

    for offset in ordered_offsets() {
        if flags.rekey_common && !key.transpose(offset).is_common() {
            continue;
        }
        specs.push(DerivedFileSpec {
            offset,
            file_type: FileType::NormalAudio,
        });
        if flags.split_enabled() {
            specs.push(DerivedFileSpec {
                offset,
                file_type: FileType::InstrumentalAudio,
            });
        }
    }

    if flags.novox_first {
        // sort_by_key is stable.
        specs.sort_by_key(|s| !s.file_type.is_instrumental());
    }

    specs
}
