use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "sigprint", about = "Audio signature generator and inspector")]
pub struct Cli {
    /// Config file (defaults to ./sigprint.toml or the user config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate signatures from audio files
    Sign(SignArgs),
    /// Decode a signature and print its peaks as JSON
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Input audio files (WAV, MP3, FLAC, OGG)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output encoding
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Uri)]
    pub format: OutputFormat,

    /// Seconds of audio after which a signature is complete
    #[arg(long, default_value_t = config::default_max_time_seconds())]
    pub max_time: f32,

    /// Peak count after which a signature is complete
    #[arg(long, default_value_t = config::default_max_peaks())]
    pub max_peaks: usize,

    /// Sample rate the audio is resampled to before analysis
    #[arg(long, default_value_t = config::default_sample_rate())]
    pub sample_rate: u32,

    /// Emit every signature in each file instead of only the first
    #[arg(long)]
    pub all: bool,

    /// Write binary .sig files into this directory instead of printing
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// A data URI, or a file holding a data URI or a binary signature
    pub signature: String,
}

#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// base64 data URI
    Uri,
    /// Hex dump of the binary form
    Hex,
    /// JSON peak report
    Json,
}
