//! SpeedX segment speed transcoder
//!
//! Re-times a video according to a list of `[start, end) @ speed` segments.
//! Video packets are stream-copied with remapped timestamps; audio is decoded,
//! time-stretched with pitch preserved and re-encoded.
//!
//! # Usage
//!
//! ```bash
//! speedx run --input in.mp4 --output out.mp4 --segment 0-5@1 --segment 5-20@0.5
//! speedx plan --segment 0-5@1 --segment 5-20@0.5
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::info;

use speedx_cli::adapters::FfmpegBackend;
use speedx_cli::cli::{commands, Cli, Commands};
use speedx_cli::config_initialization::resolve_pipeline_config;
use speedx_cli::utils::logging::{log_system_info, LogFormat, LogLevel, LoggingConfig};

/// Main entry point for the SpeedX CLI application
fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = LogLevel::parse(&cli.log_level)
        .ok_or_else(|| anyhow::anyhow!("Invalid log level: {}", cli.log_level))?;
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    LoggingConfig::new(level, format).init();
    log_system_info();

    match &cli.command {
        Commands::Run(args) => {
            info!("Executing run command");
            let config = resolve_pipeline_config(cli.config.as_deref(), args)?;
            let backend = FfmpegBackend::new()?;
            commands::run(backend, args, config)?;
        }
        Commands::Plan(args) => {
            info!("Executing plan command");
            commands::plan(args)?;
        }
    }

    info!("SpeedX completed successfully");
    Ok(())
}
