//! Pitch-class arithmetic.
//!
//! Keys use flat spellings except F#, matching what the rekey tooling and the
//! artifact names expect. Detector output with other spellings goes through
//! [`normalize`] first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// One of the twelve pitch classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Db,
    D,
    Eb,
    E,
    F,
    #[serde(rename = "F#")]
    FSharp,
    G,
    Ab,
    A,
    Bb,
    B,
}

/// The circle in semitone order starting at C.
const CIRCLE: [PitchClass; 12] = [
    PitchClass::C,
    PitchClass::Db,
    PitchClass::D,
    PitchClass::Eb,
    PitchClass::E,
    PitchClass::F,
    PitchClass::FSharp,
    PitchClass::G,
    PitchClass::Ab,
    PitchClass::A,
    PitchClass::Bb,
    PitchClass::B,
];

/// Targets allowed when a track asks for common keys only.
pub const COMMON_KEYS: [PitchClass; 5] = [
    PitchClass::F,
    PitchClass::C,
    PitchClass::G,
    PitchClass::D,
    PitchClass::A,
];

impl PitchClass {
    pub fn name(&self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Db => "Db",
            Self::D => "D",
            Self::Eb => "Eb",
            Self::E => "E",
            Self::F => "F",
            Self::FSharp => "F#",
            Self::G => "G",
            Self::Ab => "Ab",
            Self::A => "A",
            Self::Bb => "Bb",
            Self::B => "B",
        }
    }

    /// Semitones above C.
    pub fn index(&self) -> usize {
        match self {
            Self::C => 0,
            Self::Db => 1,
            Self::D => 2,
            Self::Eb => 3,
            Self::E => 4,
            Self::F => 5,
            Self::FSharp => 6,
            Self::G => 7,
            Self::Ab => 8,
            Self::A => 9,
            Self::Bb => 10,
            Self::B => 11,
        }
    }

    /// Move `semitones` steps around the circle. Negative values go down.
    pub fn transpose(self, semitones: i32) -> PitchClass {
        let idx = (self.index() as i32 + semitones).rem_euclid(12) as usize;
        CIRCLE[idx]
    }

    pub fn is_common(&self) -> bool {
        COMMON_KEYS.contains(self)
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CIRCLE
            .iter()
            .find(|p| p.name() == s)
            .copied()
            .ok_or_else(|| Error::Validation(format!("unknown key: {s}")))
    }
}

/// Map a detector spelling onto the canonical one.
///
/// A#, C#, D# and G# become their flat equivalents, Gb becomes F#. Anything
/// else is returned unchanged; parsing it is the caller's job.
pub fn normalize(key: &str) -> &str {
    match key {
        "A#" => "Bb",
        "C#" => "Db",
        "D#" => "Eb",
        "G#" => "Ab",
        "Gb" => "F#",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transpose_wraps_around() {
        assert_eq!(PitchClass::B.transpose(1), PitchClass::C);
        assert_eq!(PitchClass::C.transpose(-1), PitchClass::B);
        assert_eq!(PitchClass::A.transpose(-3), PitchClass::FSharp);
        assert_eq!(PitchClass::E.transpose(6), PitchClass::Bb);
    }

    #[test]
    fn transpose_inverse_and_identity() {
        for key in CIRCLE {
            assert_eq!(key.transpose(0), key);
            assert_eq!(key.transpose(12), key);
            for n in -11..=11 {
                assert_eq!(key.transpose(n).transpose(-n), key, "{key} by {n}");
            }
        }
    }

    #[test]
    fn parse_canonical_names() {
        for key in CIRCLE {
            assert_eq!(key.name().parse::<PitchClass>().unwrap(), key);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "H".parse::<PitchClass>().unwrap_err();
        assert_eq!(err.to_string(), "Validation error: unknown key: H");
        // Sharps other than F# must be normalized first.
        assert!("C#".parse::<PitchClass>().is_err());
    }

    #[test]
    fn normalize_detector_spellings() {
        assert_eq!(normalize("Gb"), "F#");
        assert_eq!(normalize("A#"), "Bb");
        assert_eq!(normalize("C#"), "Db");
        assert_eq!(normalize("D#"), "Eb");
        assert_eq!(normalize("G#"), "Ab");
        assert_eq!(normalize("E"), "E");
        assert_eq!(normalize("F#"), "F#");
        assert_eq!(normalize("nonsense"), "nonsense");
    }

    #[test]
    fn common_keys() {
        assert!(PitchClass::G.is_common());
        assert!(!PitchClass::Eb.is_common());
    }
}
