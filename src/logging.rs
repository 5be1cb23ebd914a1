//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries and local runs call
//! [`init_logging`] once to install a formatter.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::parse_flag;
use crate::error::ConfigError;

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "compact" => Ok(Self::Compact),
            _ => Err(ConfigError::Invalid {
                var: "LOG_FORMAT".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is unset.
    pub level: Level,
    pub format: LogFormat,
    /// Extra filter directives, e.g. `archive_ingest::registry=debug`.
    pub filter_directives: Option<String>,
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            filter_directives: None,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Read `LOG_LEVEL`, `LOG_FORMAT`, `LOG_FILTER`, and `LOG_INCLUDE_TARGETS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.level = level.parse().map_err(|_| ConfigError::Invalid {
                var: "LOG_LEVEL".to_string(),
                value: level.clone(),
            })?;
        }
        if let Ok(format) = std::env::var("LOG_FORMAT") {
            config.format = format.parse()?;
        }
        if let Ok(filter) = std::env::var("LOG_FILTER") {
            config.filter_directives = Some(filter);
        }
        config.include_targets = parse_flag(
            "LOG_INCLUDE_TARGETS",
            std::env::var("LOG_INCLUDE_TARGETS").ok(),
            true,
        )?;
        Ok(config)
    }

    fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.as_str().to_ascii_lowercase()));
        if let Some(directives) = &self.filter_directives {
            for directive in directives.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let parsed = directive.parse().map_err(|_| ConfigError::Invalid {
                    var: "LOG_FILTER".to_string(),
                    value: directive.to_string(),
                })?;
                filter = filter.add_directive(parsed);
            }
        }
        Ok(filter)
    }
}

/// Error returned when a global subscriber is already installed.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingInitError(String);

impl From<ConfigError> for LoggingInitError {
    fn from(e: ConfigError) -> Self {
        Self(e.to_string())
    }
}

/// Install the global tracing subscriber.
///
/// Calling this more than once returns an error instead of panicking.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingInitError> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.include_targets);
    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| LoggingInitError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_an_error() {
        let config = LogConfig::default();
        let _ = init_logging(&config);
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn bad_directive_is_reported() {
        let config = LogConfig {
            filter_directives: Some("archive_ingest=notalevel".to_string()),
            ..LogConfig::default()
        };
        assert!(config.env_filter().is_err());
    }
}
