//! Logging setup shared by every Botfleet binary.
//!
//! Controlled by `BOTFLEET_LOG_FORMAT` (text, json, pretty) and
//! `BOTFLEET_LOG_LEVEL`; always writes to stderr so tool output stays
//! pipeable.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text (no colors, for piping)
    Text,
    /// One JSON object per line
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

fn init_with(format: LogFormat, level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
}

/// Initialize logging for a CLI binary.
///
/// `verbose` forces debug level; otherwise env vars decide, defaulting
/// to warn so batch runs stay quiet in cron.
pub fn init_cli(verbose: bool) {
    let format = std::env::var("BOTFLEET_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var("BOTFLEET_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string())
    };

    init_with(format, &level);
}
