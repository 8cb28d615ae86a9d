//! Command-line argument definitions

use clap::Args;
use std::path::PathBuf;

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Source video file
    #[arg(short, long)]
    pub input: PathBuf,

    /// Destination file (overwritten)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Segment as START-END@SPEED (times in seconds, MM:SS.ms or HH:MM:SS.ms); repeatable
    #[arg(short, long = "segment", required = true)]
    pub segments: Vec<String>,

    /// Audio sync mode: continuous or segment-aligned
    #[arg(long)]
    pub sync: Option<String>,

    /// Audio encoder bit rate in bits per second
    #[arg(long)]
    pub audio_bitrate: Option<u32>,

    /// Idle polls tolerated before the audio stage is declared stalled
    #[arg(long)]
    pub stall_limit: Option<u32>,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    pub report_json: bool,
}

/// Arguments for the plan command
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Segment as START-END@SPEED; repeatable
    #[arg(short, long = "segment", required = true)]
    pub segments: Vec<String>,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
