use clap::{Parser, Subcommand};
use kf_core::Channel;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keyforge")]
#[command(author, version, about = "Coordinates the track download, key-detect, split, rekey, encode and upload pipeline")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run stage workers until interrupted
    Work {
        /// Stage to run (repeatable; all stages when omitted)
        #[arg(long = "stage")]
        stages: Vec<Channel>,

        /// Polling loops per stage (overrides worker.instances)
        #[arg(long)]
        instances: Option<usize>,
    },

    /// Submit a source URL to the pipeline
    Submit {
        /// Source media URL
        #[arg(required = true)]
        url: String,

        /// Do not separate vocals
        #[arg(long)]
        skip_split: bool,

        /// Only produce the original key
        #[arg(long)]
        skip_rekey: bool,

        /// Hide the track from other users' listings
        #[arg(long)]
        private: bool,

        /// Request video output with the rekeyed audio
        #[arg(long)]
        restitch_video: bool,

        /// Only rekey into common keys (F, C, G, D, A)
        #[arg(long)]
        rekey_common: bool,

        /// Produce instrumental files before normal ones
        #[arg(long)]
        novox_first: bool,

        /// Requesting user
        #[arg(long)]
        user: Option<String>,
    },

    /// Show a track and its derived files
    Status {
        /// Track id or uuid
        track: String,
    },

    /// List recent tracks
    List {
        /// Viewing user; private tracks of others are hidden
        #[arg(long)]
        user: Option<String>,

        /// Maximum number of tracks
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Show queue depth per channel
    Queues,

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
