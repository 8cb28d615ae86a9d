//! Configuration hierarchy: CLI > Env > File > Defaults

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::args::RunArgs;
use crate::config::{AudioSyncMode, PipelineConfig};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "speedx.toml";

/// Build the pipeline configuration for a run
pub fn resolve_pipeline_config(config_path: Option<&Path>, args: &RunArgs) -> Result<PipelineConfig> {
    info!("Initializing configuration hierarchy");

    let mut config = match config_file(config_path) {
        Some(path) => PipelineConfig::load_from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => {
            info!("No config file loaded; using defaults");
            PipelineConfig::default()
        }
    };

    config
        .apply_env_overrides()
        .context("Invalid SPEEDX_* environment override")?;

    apply_cli_overrides(&mut config, args)?;

    config.validate().context("Invalid pipeline configuration")?;
    info!("Configuration hierarchy initialized successfully");
    Ok(config)
}

fn config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
            fallback.exists().then_some(fallback)
        }
    }
}

fn apply_cli_overrides(config: &mut PipelineConfig, args: &RunArgs) -> Result<()> {
    if let Some(sync) = &args.sync {
        config.audio_sync = AudioSyncMode::parse(sync)?;
    }
    if let Some(bitrate) = args.audio_bitrate {
        config.audio_bitrate = bitrate;
    }
    if let Some(limit) = args.stall_limit {
        config.stall_limit = limit;
    }
    Ok(())
}
