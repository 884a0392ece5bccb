//! Database query modules.

pub mod queue;
pub mod track_files;
pub mod tracks;
