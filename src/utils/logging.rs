//! Logging configuration and subscriber initialization

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Logging configuration options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Let `RUST_LOG` take precedence over `level`
    pub respect_env: bool,
}

impl LoggingConfig {
    pub fn new(level: LogLevel, format: LogFormat) -> Self {
        Self {
            level,
            format,
            respect_env: true,
        }
    }


    fn filter(&self) -> EnvFilter {
        if self.respect_env {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(self.level.as_str())
    }

    /// Install the global subscriber. Returns `false` when one was already set.
    pub fn init(&self) -> bool {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(self.filter())
            .with_writer(std::io::stderr)
            .with_target(false);

        let installed = match self.format {
            LogFormat::Pretty => builder.try_init().is_ok(),
            LogFormat::Json => builder.json().try_init().is_ok(),
        };

        if installed {
            tracing::debug!(
                "Logging initialized: level={}, format={:?}",
                self.level.as_str(),
                self.format
            );
        }
        installed
    }
}

/// Log build and platform information at startup
pub fn log_system_info() {
    tracing::info!("=== SpeedX ===");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));

    #[cfg(target_os = "macos")]
    tracing::info!("Platform: macOS");
    #[cfg(target_os = "linux")]
    tracing::info!("Platform: Linux");
    #[cfg(target_os = "windows")]
    tracing::info!("Platform: Windows");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("warning"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("loud"), None);
    }

    #[test]
    fn test_second_init_is_harmless() {
        let config = LoggingConfig::new(LogLevel::Warn, LogFormat::Pretty);
        config.init();
        assert!(!config.init());
    }
}
