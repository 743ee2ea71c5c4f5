//! Tracing setup for the binary.
//!
//! Diagnostics go to stderr so command output on stdout stays clean. The
//! filter comes from `STAGEGATE_LOG`, then `RUST_LOG`, then the configured
//! level, then `warn`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "STAGEGATE_LOG";
pub const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => anyhow::bail!("Invalid log format '{}'. Valid values: compact, json", s),
        }
    }
}

/// Pick the filter directive from the environment or the fallback.
pub fn filter_directive(fallback: Option<&str>) -> String {
    std::env::var(LOG_ENV)
        .or_else(|_| std::env::var("RUST_LOG"))
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| fallback.map(String::from))
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(format: LogFormat, fallback_level: Option<&str>) {
    let directive = filter_directive(fallback_level);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Compact => registry
            .with(tracing_fmt::layer().with_writer(std::io::stderr).compact())
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_fmt::layer().with_writer(std::io::stderr).json())
            .try_init(),
    };
    // A subscriber may already be installed by an embedding program.
    let _ = result;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("compact").unwrap(), LogFormat::Compact);
        assert!(LogFormat::from_str("pretty").is_err());
    }

    #[test]
    fn log_format_display_round_trips() {
        for format in [LogFormat::Compact, LogFormat::Json] {
            assert_eq!(LogFormat::from_str(&format.to_string()).unwrap(), format);
        }
    }
}
