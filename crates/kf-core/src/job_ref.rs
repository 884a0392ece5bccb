//! Textual queue references.
//!
//! A reference names the entity a stage should work on, plus optional extra
//! tokens (usually host paths) the stage needs:
//!
//! ```text
//! Track:17
//! TrackFile:305:%2Fdata%2Frekey%2FC-song.305.wav
//! ```
//!
//! Tokens are percent-encoded, so a token containing the separator survives
//! the round trip.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Separator between reference fields.
pub const SEP: char = ':';

/// The entity types a reference can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Track,
    TrackFile,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "Track",
            Self::TrackFile => "TrackFile",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Track" => Ok(Self::Track),
            "TrackFile" => Ok(Self::TrackFile),
            other => Err(Error::JobRef(format!("unknown entity type: {other}"))),
        }
    }
}

/// A decoded queue reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRef {
    pub kind: EntityKind,
    pub id: i64,
    pub tokens: Vec<String>,
}

impl JobRef {
    pub fn new(kind: EntityKind, id: impl Into<i64>) -> Self {
        Self {
            kind,
            id: id.into(),
            tokens: Vec::new(),
        }
    }

    /// Append an extra token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.tokens.push(token.into());
        self
    }

    /// Render the wire form.
    pub fn encode(&self) -> String {
        let mut out = format!("{}{SEP}{}", self.kind, self.id);
        for token in &self.tokens {
            out.push(SEP);
            out.push_str(&urlencoding::encode(token));
        }
        out
    }

    /// Parse the wire form.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut parts = raw.split(SEP);

        let kind = match parts.next() {
            Some(tag) if !tag.is_empty() => tag.parse::<EntityKind>()?,
            _ => return Err(Error::JobRef(format!("missing entity type in {raw:?}"))),
        };

        let id = parts
            .next()
            .ok_or_else(|| Error::JobRef(format!("missing id in {raw:?}")))?
            .parse::<i64>()
            .map_err(|e| Error::JobRef(format!("bad id in {raw:?}: {e}")))?;

        let tokens = parts
            .map(|t| {
                urlencoding::decode(t)
                    .map(|s| s.into_owned())
                    .map_err(|e| Error::JobRef(format!("bad token in {raw:?}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { kind, id, tokens })
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
