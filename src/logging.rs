//! Logging setup for the coordinator and worker processes.
//!
//! All output goes to stderr: worker processes use stdout for frames.
//!
//! # Environment Variables
//!
//! - `PICSIFT_LOG` - Log filter (overrides RUST_LOG)
//! - `PICSIFT_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `PICSIFT_LOG_FORMAT` - Output format: pretty, compact, json
//! - `RUST_LOG` - Standard Rust log filter (fallback)

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Single-line format
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: WARN)
    pub level: Level,
    pub format: LogFormat,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// Show thread names, useful with the thread mesh
    pub show_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Pretty,
            filter: None,
            show_thread_names: false,
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// A filter already set from the command line wins over `PICSIFT_LOG` and
    /// `RUST_LOG`; `PICSIFT_LOG_LEVEL` only applies when no filter is set.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = var("PICSIFT_LOG").or_else(|| var("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level) = var("PICSIFT_LOG_LEVEL")
        {
            self.level = parse_level(&level).unwrap_or(self.level);
        }

        if let Some(format) = var("PICSIFT_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        self
    }

    /// The filter string handed to `EnvFilter`
    pub fn directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => self.level.to_string().to_lowercase(),
        }
    }

    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directive()).unwrap_or_else(|_| {
            eprintln!("Warning: Invalid log filter '{}', using default", self.directive());
            EnvFilter::new(self.level.to_string().to_lowercase())
        })
    }
}

/// Parse a log level string.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Initialize the global tracing subscriber.
///
/// Subsequent calls are silently ignored.
pub fn init(config: LogConfig) {
    let filter = config.build_filter();

    let result = match config.format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_thread_names(config.show_thread_names)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_thread_names(config.show_thread_names)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_thread_names(config.show_thread_names)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(filter)
                .with(layer)
                .try_init()
        }
    };

    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_cli_filter_wins_over_env() {
        let config = LogConfig::default()
            .with_filter("picsift=debug".to_string())
            .with_overrides_from(env(&[("PICSIFT_LOG", "trace"), ("RUST_LOG", "info")]));
        assert_eq!(config.directive(), "picsift=debug");
    }

    #[test]
    fn test_picsift_log_wins_over_rust_log() {
        let config = LogConfig::default()
            .with_overrides_from(env(&[("PICSIFT_LOG", "trace"), ("RUST_LOG", "info")]));
        assert_eq!(config.directive(), "trace");

        let config = LogConfig::default().with_overrides_from(env(&[("RUST_LOG", "info")]));
        assert_eq!(config.directive(), "info");
    }

    #[test]
    fn test_level_and_format_overrides() {
        let config = LogConfig::default().with_overrides_from(env(&[
            ("PICSIFT_LOG_LEVEL", "debug"),
            ("PICSIFT_LOG_FORMAT", "json"),
        ]));
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.directive(), "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_default_directive() {
        assert_eq!(LogConfig::default().directive(), "warn");
    }
}
