//! Logging configuration and initialization.
//!
//! The snooped shell owns the terminal, so log lines go to a file instead of
//! stderr. Levels come from a preset picked by CLI flags, with per-target
//! overrides on top; `RUST_LOG` replaces both when set.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const TARGET_PREFIX: &str = "tracesnoop::";

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("Invalid log format: '{}'. Use 'text' or 'json'.", s)),
        }
    }
}

/// Logging preset levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogPreset {
    /// Session lifecycle and panel requests only
    #[default]
    Production,
    /// Adds extracted tracebacks and matched commands
    Verbose,
    Debug,
    /// Everything including per-chunk PTY traffic
    Trace,
    /// Warnings and errors only
    Quiet,
}

/// Logging configuration built from CLI arguments.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub preset: LogPreset,
    /// Per-target level overrides (e.g. "tracesnoop::snooper" -> DEBUG)
    pub overrides: HashMap<String, Level>,
    pub format: LogFormat,
}

impl LogConfig {
    pub fn from_cli(
        verbose: bool,
        debug: bool,
        trace: bool,
        quiet: bool,
        log_overrides: Vec<String>,
        format: LogFormat,
    ) -> Self {
        let preset = if quiet {
            LogPreset::Quiet
        } else if trace {
            LogPreset::Trace
        } else if debug {
            LogPreset::Debug
        } else if verbose {
            LogPreset::Verbose
        } else {
            LogPreset::Production
        };

        // "target=level", comma separated; bare targets get the crate prefix.
        let mut overrides = HashMap::new();
        for override_str in log_overrides {
            for part in override_str.split(',') {
                let Some((target, level_str)) = part.split_once('=') else {
                    continue;
                };
                let target = target.trim();
                let full_target = if target.starts_with(TARGET_PREFIX) || target == "tower_http"
                {
                    target.to_string()
                } else {
                    format!("{}{}", TARGET_PREFIX, target)
                };

                if let Some(level) = parse_level(level_str.trim()) {
                    overrides.insert(full_target, level);
                }
            }
        }

        Self {
            preset,
            overrides,
            format,
        }
    }

    /// Build the filter directives for the preset and overrides.
    pub fn directives(&self) -> Vec<String> {
        let mut directives: Vec<String> = match self.preset {
            LogPreset::Production => vec![
                "tracesnoop::startup=info".into(),
                "tracesnoop::session=info".into(),
                "tracesnoop::process=info".into(),
                "tracesnoop::panel=info".into(),
                "tracesnoop::ws=info".into(),
                "tracesnoop::pipeline=warn".into(),
                "tracesnoop::snooper=warn".into(),
                "tracesnoop::command=warn".into(),
                "tower_http=warn".into(),
            ],
            LogPreset::Verbose => vec![
                "tracesnoop=info".into(),
                "tracesnoop::snooper=debug".into(),
                "tracesnoop::command=debug".into(),
                "tower_http=info".into(),
            ],
            LogPreset::Debug => vec![
                "tracesnoop=debug".into(),
                "tracesnoop::process=info".into(),
                "tower_http=debug".into(),
            ],
            LogPreset::Trace => vec!["tracesnoop=trace".into(), "tower_http=trace".into()],
            LogPreset::Quiet => vec!["tracesnoop=warn".into(), "tower_http=error".into()],
        };

        let mut overrides: Vec<_> = self.overrides.iter().collect();
        overrides.sort();
        for (target, level) in overrides {
            directives.push(format!("{}={}", target, level_to_str(*level)));
        }
        directives
    }

    pub fn build_filter(&self) -> EnvFilter {
        if let Ok(env_filter) = EnvFilter::try_from_default_env() {
            return env_filter;
        }

        EnvFilter::try_new(self.directives().join(","))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Initialize the tracing subscriber, appending to `log_file`.
pub fn init(config: &LogConfig, log_file: &Path) -> std::io::Result<()> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let writer = Mutex::new(file);
    let filter = config.build_filter();

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_thread_ids(false),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_preset_priority() {
        let preset = |v, d, t, q| LogConfig::from_cli(v, d, t, q, vec![], LogFormat::Text).preset;

        assert_eq!(preset(true, true, true, true), LogPreset::Quiet);
        assert_eq!(preset(true, true, true, false), LogPreset::Trace);
        assert_eq!(preset(true, true, false, false), LogPreset::Debug);
        assert_eq!(preset(true, false, false, false), LogPreset::Verbose);
        assert_eq!(preset(false, false, false, false), LogPreset::Production);
    }

    #[test]
    fn test_overrides_get_prefix() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["snooper=debug".into(), "command=trace, pipeline=bogus".into()],
            LogFormat::Text,
        );

        assert_eq!(config.overrides.get("tracesnoop::snooper"), Some(&Level::DEBUG));
        assert_eq!(config.overrides.get("tracesnoop::command"), Some(&Level::TRACE));
        assert!(!config.overrides.contains_key("tracesnoop::pipeline"));
    }

    #[test]
    fn test_full_targets_pass_through() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            false,
            vec!["tracesnoop::session=warn".into(), "tower_http=trace".into()],
            LogFormat::Json,
        );

        assert_eq!(config.overrides.get("tracesnoop::session"), Some(&Level::WARN));
        assert_eq!(config.overrides.get("tower_http"), Some(&Level::TRACE));
    }

    #[test]
    fn test_overrides_follow_preset_directives() {
        let config = LogConfig::from_cli(
            false,
            false,
            false,
            true,
            vec!["snooper=debug".into()],
            LogFormat::Text,
        );

        let directives = config.directives();
        assert_eq!(directives.first().map(String::as_str), Some("tracesnoop=warn"));
        assert_eq!(
            directives.last().map(String::as_str),
            Some("tracesnoop::snooper=debug")
        );
    }
}
