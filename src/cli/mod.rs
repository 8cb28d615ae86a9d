//! CLI module for SpeedX
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod args;
pub mod commands;

/// SpeedX segment speed transcoder
///
/// Re-times a video segment by segment: video packets are copied with
/// remapped timestamps, audio is time-stretched and re-encoded.
#[derive(Parser, Debug)]
#[command(name = "speedx")]
#[command(about = "SpeedX - Segment-based variable-speed video transcoder")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true, env = "SPEEDX_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// TOML configuration file with a [pipeline] table
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a video according to a segment plan
    Run(args::RunArgs),
    /// Validate segments and print the planned output timeline
    Plan(args::PlanArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "speedx",
            "run",
            "--input",
            "in.mp4",
            "--output",
            "out.mp4",
            "--segment",
            "0-10@1",
            "--segment",
            "10-20@2",
            "--sync",
            "segment-aligned",
        ])
        .unwrap();

        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.segments, vec!["0-10@1", "10-20@2"]);
                assert_eq!(args.sync.as_deref(), Some("segment-aligned"));
                assert!(!args.report_json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_run_requires_a_segment() {
        let result = Cli::try_parse_from(["speedx", "run", "-i", "in.mp4", "-o", "out.mp4"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["speedx", "plan", "-s", "0-1@2", "--log-level", "debug"])
            .unwrap();
        assert_eq!(cli.log_level, "debug");
    }
}
