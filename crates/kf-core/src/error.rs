//! Unified error type for keyforge.
//!
//! All crates funnel their failures into [`Error`]. The task harness turns any
//! error raised while working an entity into that entity's ERROR status, so
//! the display text of each variant ends up in `error_message` columns.

use std::fmt;
use std::path::PathBuf;

/// Unified error type covering all failure modes in keyforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "Track", "TrackFile").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input data failed validation (bad key name, bad URL, bad config).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The entity was not in a status that allows the requested step.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A queue reference could not be decoded.
    #[error("Malformed job reference: {0}")]
    JobRef(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A JSON document produced by a tool could not be parsed.
    #[error("JSON error: {source}")]
    Json {
        /// The underlying serde error.
        #[from]
        source: serde_json::Error,
    },

    /// An external tool (docker, a stage container) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A tool exited cleanly but did not produce the file it promised.
    #[error("Expected output missing: {}", path.display())]
    MissingOutput {
        /// Host path that should exist after the tool ran.
        path: PathBuf,
    },

    /// A pipeline stage failed for a reason specific to that stage.
    #[error("Stage error [{stage}]: {message}")]
    Stage {
        /// The stage that failed.
        stage: String,
        /// Human-readable error description.
        message: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Stage`].
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::MissingOutput`].
    pub fn missing_output(path: impl Into<PathBuf>) -> Self {
        Error::MissingOutput { path: path.into() }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
