//! Pipeline configuration loaded from TOML, environment and CLI

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};

/// How audio output timestamps relate to segment boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioSyncMode {
    /// One continuous stretch; pts by sample counting, drift accepted
    #[default]
    Continuous,
    /// Flush the stretcher and re-anchor to the video offset at each segment
    SegmentAligned,
}

impl AudioSyncMode {
    pub fn parse(value: &str) -> PipelineResult<Self> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "continuous" => Ok(AudioSyncMode::Continuous),
            "segment_aligned" | "aligned" => Ok(AudioSyncMode::SegmentAligned),
            other => Err(PipelineError::InvalidConfig {
                message: format!(
                    "unknown audio sync mode '{}'. Valid modes: continuous, segment-aligned",
                    other
                ),
            }),
        }
    }
}

/// Tunables for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Packets written per video segment before it is cut short
    pub max_packets_per_segment: usize,
    /// Bytes reserved for one compressed packet
    pub video_buffer_capacity: usize,
    /// Wait applied to decoder/encoder buffer dequeues
    pub poll_timeout_ms: u64,
    /// Consecutive idle loop iterations before the audio stage gives up
    pub stall_limit: u32,
    /// Frames of PCM held per decoded chunk buffer
    pub pcm_chunk_frames: usize,
    /// Stretch output buffer size as a multiple of the chunk buffer
    pub stretch_headroom: usize,
    /// Encoder bit rate in bits per second
    pub audio_bitrate: u32,
    /// Encoder codec name
    pub audio_codec: String,
    pub audio_sync: AudioSyncMode,
    /// Emit a debug line every this many packets/frames
    pub progress_log_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_packets_per_segment: 10_000,
            video_buffer_capacity: 1024 * 1024,
            poll_timeout_ms: 10,
            stall_limit: 500,
            pcm_chunk_frames: 4096,
            stretch_headroom: 4,
            audio_bitrate: 128_000,
            audio_codec: "aac".to_string(),
            audio_sync: AudioSyncMode::Continuous,
            progress_log_interval: 100,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    pipeline: PipelineConfig,
}

impl PipelineConfig {
    /// Load the `[pipeline]` table of a TOML file; missing keys keep defaults
    pub fn load_from_file(path: &Path) -> PipelineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| PipelineError::NotOpenable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let file: ConfigFile = toml::from_str(content).map_err(|e| PipelineError::InvalidConfig {
            message: format!("failed to parse TOML config: {}", e),
        })?;
        Ok(file.pipeline)
    }

    /// Serialize as a `[pipeline]` table
    pub fn to_toml_string(&self) -> PipelineResult<String> {
        #[derive(Serialize)]
        struct Wrapper<'a> {
            pipeline: &'a PipelineConfig,
        }
        toml::to_string(&Wrapper { pipeline: self }).map_err(|e| PipelineError::InvalidConfig {
            message: format!("failed to serialize config: {}", e),
        })
    }

    /// Apply `SPEEDX_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> PipelineResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> PipelineResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut overrides = 0;

        if let Some(value) = lookup("SPEEDX_MAX_PACKETS_PER_SEGMENT") {
            self.max_packets_per_segment = parse_number("SPEEDX_MAX_PACKETS_PER_SEGMENT", &value)?;
            overrides += 1;
        }
        if let Some(value) = lookup("SPEEDX_POLL_TIMEOUT_MS") {
            self.poll_timeout_ms = parse_number("SPEEDX_POLL_TIMEOUT_MS", &value)?;
            overrides += 1;
        }
        if let Some(value) = lookup("SPEEDX_STALL_LIMIT") {
            self.stall_limit = parse_number("SPEEDX_STALL_LIMIT", &value)?;
            overrides += 1;
        }
        if let Some(value) = lookup("SPEEDX_AUDIO_BITRATE") {
            self.audio_bitrate = parse_number("SPEEDX_AUDIO_BITRATE", &value)?;
            overrides += 1;
        }
        if let Some(value) = lookup("SPEEDX_AUDIO_SYNC") {
            self.audio_sync = AudioSyncMode::parse(&value)?;
            overrides += 1;
        }

        if overrides > 0 {
            info!("Applied {} environment variable overrides", overrides);
        }
        Ok(())
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        let checks = [
            ("max_packets_per_segment", self.max_packets_per_segment == 0),
            ("video_buffer_capacity", self.video_buffer_capacity == 0),
            ("stall_limit", self.stall_limit == 0),
            ("pcm_chunk_frames", self.pcm_chunk_frames == 0),
            ("stretch_headroom", self.stretch_headroom == 0),
            ("audio_bitrate", self.audio_bitrate == 0),
            ("progress_log_interval", self.progress_log_interval == 0),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(PipelineError::InvalidConfig {
                message: format!("{} must be greater than zero", name),
            });
        }
        if self.audio_codec.trim().is_empty() {
            return Err(PipelineError::InvalidConfig {
                message: "audio_codec must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> PipelineResult<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| PipelineError::InvalidConfig {
        message: format!("invalid value '{}' for {}: {}", value, key, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_engine_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_packets_per_segment, 10_000);
        assert_eq!(config.video_buffer_capacity, 1024 * 1024);
        assert_eq!(config.poll_timeout(), Duration::from_millis(10));
        assert_eq!(config.audio_sync, AudioSyncMode::Continuous);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            "[pipeline]\nstall_limit = 20\naudio_sync = \"segment_aligned\"\n",
        )
        .unwrap();
        assert_eq!(config.stall_limit, 20);
        assert_eq!(config.audio_sync, AudioSyncMode::SegmentAligned);
        assert_eq!(config.audio_bitrate, 128_000);
    }

    #[test]
    fn test_load_from_file_round_trip() {
        let mut config = PipelineConfig::default();
        config.audio_bitrate = 96_000;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();

        let loaded = PipelineConfig::load_from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_is_not_openable() {
        let err = PipelineConfig::load_from_file(Path::new("/nonexistent/speedx.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::NotOpenable { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SPEEDX_STALL_LIMIT", "42"),
            ("SPEEDX_AUDIO_SYNC", "segment-aligned"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.stall_limit, 42);
        assert_eq!(config.audio_sync, AudioSyncMode::SegmentAligned);
    }

    #[test]
    fn test_bad_env_value_rejected() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "SPEEDX_POLL_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("SPEEDX_POLL_TIMEOUT_MS"));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = PipelineConfig::default();
        config.stall_limit = 0;
        assert!(config.validate().is_err());
    }
}
