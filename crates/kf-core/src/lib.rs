//! kf-core: shared types, IDs, errors, configuration, and pipeline rules.
//!
//! This crate is the foundational dependency for all other kf-* crates. It
//! holds everything that can be decided without touching the database or a
//! container: typed identifiers, status enums and flags, the transition
//! tables, the key planner, pitch-class arithmetic, artifact naming, and the
//! queue-reference codec.

pub mod config;
pub mod error;
pub mod flags;
pub mod ids;
pub mod job_ref;
pub mod music;
pub mod naming;
pub mod planner;
pub mod status;
pub mod template;
pub mod transitions;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use flags::TrackFlags;
pub use ids::*;
pub use job_ref::{EntityKind, JobRef};
pub use music::PitchClass;
pub use status::*;
