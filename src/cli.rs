use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dashframe")]
#[command(author, version, about = "Frame-accurate dashcam recording inspector")]
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
    /// Probe a recording and display its video timeline
    Probe {
        /// Recording to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List telemetry embedded in a recording
    Telemetry {
        /// Recording to read
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Show at most this many samples
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show the frame and telemetry in effect at a playback time
    FrameAt {
        /// Recording to read
        #[arg(required = true)]
        file: PathBuf,

        /// Playback position in milliseconds
        #[arg(required = true)]
        time_ms: f64,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
