use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "framesource")]
#[command(author, version, about = "Frame-accurate access to video frames and audio samples")]
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
    /// Show the tracks of a media file
    Info {
        /// File to inspect
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode one video frame and write it as PNG
    Frame {
        /// Input media file
        #[arg(required = true)]
        file: PathBuf,

        /// Presentation frame number (0-based)
        #[arg(short, long, default_value = "0")]
        frame: u32,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Video track number (0 picks the first video track)
        #[arg(long)]
        track: Option<u32>,

        /// Seek mode: normal, unsafe or strict
        #[arg(long)]
        seek_mode: Option<String>,
    },

    /// Extract a range of audio samples as raw interleaved PCM
    Audio {
        /// Input media file
        #[arg(required = true)]
        file: PathBuf,

        /// First output sample (may be negative)
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        start: i64,

        /// Number of sample frames; defaults to the rest of the track
        #[arg(long)]
        length: Option<u64>,

        /// Output path for the raw PCM
        #[arg(short, long)]
        output: PathBuf,

        /// Audio track number (0 picks the first audio track)
        #[arg(long)]
        track: Option<u32>,

        /// Output sample format: u8, s16, s32 or f32
        #[arg(long)]
        sample_format: Option<String>,

        /// Output channel layout, e.g. mono, stereo, 5.1
        #[arg(long)]
        channels: Option<String>,

        /// Output sample rate in Hz (0 keeps the native rate)
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Keep encoder priming and padding samples
        #[arg(long)]
        keep_priming: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
