//! Typed ID wrappers providing compile-time safety for entity identifiers.
//!
//! Rows are keyed by SQLite integer primary keys, so each ID type is a
//! newtype over `i64`. The external identity handed to users is a separate
//! UUID column on the row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Generate a newtype ID wrapper over `i64`.
///
/// The macro produces a struct with:
/// - `Debug`, `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`, `Ord`, `Serialize`, `Deserialize`
/// - `Display` and `FromStr` delegating to the inner integer
/// - `From<i64>` and `Into<i64>` conversions
macro_rules! typed_id {
    ($($(#[doc = $doc:expr])* $name:ident),+ $(,)?) => {
        $(
            $(#[doc = $doc])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(i64);

            impl $name {
                /// Return the inner integer value.
                #[must_use]
                pub fn get(self) -> i64 {
                    self.0
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl FromStr for $name {
                type Err = std::num::ParseIntError;

                fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                    s.parse::<i64>().map(Self)
                }
            }

            impl From<i64> for $name {
                fn from(id: i64) -> Self {
                    Self(id)
                }
            }

            impl From<$name> for i64 {
                fn from(id: $name) -> Self {
                    id.0
                }
            }
        )+
    };
}

typed_id! {
    /// Identifier of a requested source track.
    TrackId,
    /// Identifier of one derived artifact of a track.
    TrackFileId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_i64() {
        let id = TrackId::from(17);
        let back: i64 = id.into();
        assert_eq!(back, 17);
        assert_eq!(id.get(), 17);
    }

    #[test]
    fn display_and_from_str() {
        let id = TrackFileId::from(305);
        let parsed: TrackFileId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_from_str() {
        assert!(TrackId::from_str("forty-two").is_err());
        assert!(TrackId::from_str("").is_err());
    }

    #[test]
    fn serde_is_transparent() {
        let json = serde_json::to_string(&TrackId::from(9)).unwrap();
        assert_eq!(json, "9");
    }
}
