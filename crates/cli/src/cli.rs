use clap::{Parser, Subcommand};
use std::path::PathBuf;

use clipforge_core::{PresetTier, Tool};

#[derive(Parser)]
#[command(name = "clipforge")]
#[command(author, version, about = "Drive ffmpeg transcodes and manage tool installs")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, env = "CLIPFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show where each tool resolves from
    Resolve {
        /// Only resolve this tool
        tool: Option<Tool>,
    },

    /// List installed managed versions
    Versions {
        tool: Tool,
    },

    /// Download and install a managed tool version
    Install {
        tool: Tool,

        /// Version directory name
        version: String,

        /// Zip package URL
        #[arg(long)]
        url: String,

        /// Expected SHA-256 of the package
        #[arg(long)]
        sha256: Option<String>,
    },

    /// Probe a media file and display information
    Probe {
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode one input into one output
    Transcode {
        #[arg(short, long)]
        input: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// Video encoder name (e.g. libx264, hevc_nvenc)
        #[arg(long)]
        video_codec: Option<String>,

        /// Audio encoder name (e.g. aac, libopus)
        #[arg(long)]
        audio_codec: Option<String>,

        #[arg(long)]
        video_bitrate: Option<String>,

        #[arg(long)]
        audio_bitrate: Option<String>,

        /// Speed tier (ultrafast .. placebo)
        #[arg(long)]
        preset: Option<PresetTier>,

        /// Drop video streams
        #[arg(long)]
        no_video: bool,

        /// Drop audio streams
        #[arg(long)]
        no_audio: bool,

        /// Overwrite the output if it exists
        #[arg(short = 'y', long)]
        overwrite: bool,
    },

    /// Validate configuration file
    Validate,
}
