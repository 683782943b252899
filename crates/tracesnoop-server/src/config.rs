//! Application configuration.

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracesnoop_core::{SessionOptions, SpawnOptions, DEFAULT_MAX_TRACE_BUFFER};
use tracesnoop_types::{default_command_triggers, CommandTrigger};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub shell_args: Vec<String>,
    /// Delay before retrying delivery to a panel that was just requested.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Cap on an accumulating traceback, in bytes. 0 disables the cap.
    #[serde(default = "default_max_trace_buffer")]
    pub max_trace_buffer: usize,
    /// Program and arguments run when a panel is needed but none is connected.
    #[serde(default)]
    pub open_panel_command: Option<Vec<String>>,
    #[serde(default = "default_command_triggers")]
    pub commands: Vec<CommandTrigger>,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".to_string())
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_trace_buffer() -> usize {
    DEFAULT_MAX_TRACE_BUFFER
}

fn default_log_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tracesnoop")
        .join("tracesnoop.log")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shell: default_shell(),
            shell_args: Vec::new(),
            retry_delay_ms: default_retry_delay_ms(),
            max_trace_buffer: default_max_trace_buffer(),
            open_panel_command: None,
            commands: default_command_triggers(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from config/default.toml, or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }
        Ok(Config::default())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Session options for a shell sized `rows` x `cols`.
    pub fn session_options(&self, rows: u16, cols: u16) -> SessionOptions {
        let mut spawn = SpawnOptions::new(&self.shell);
        spawn.args = self.shell_args.clone();
        spawn.cwd = std::env::current_dir().ok();
        spawn.rows = rows;
        spawn.cols = cols;

        let mut options = SessionOptions::new(spawn);
        options.max_trace_buffer = Some(self.max_trace_buffer).filter(|&n| n > 0);
        options.triggers = self.commands.clone();
        options
    }
}
