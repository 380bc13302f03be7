//! Configuration schema definitions.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use xbot_framework::BotSettings;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XbotConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub bot: BotConfig,

    #[serde(default)]
    pub limiter: LimiterConfig,
}

/// Log level names accepted in configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How much of the `dispatch` and `handler` spans the fmt layer reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanMode {
    #[default]
    Off,
    /// Creation and close, with the time each span was busy.
    Lifecycle,
    /// Every enter and exit as well.
    Full,
}

/// When a file log rolls over to a new file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,

    /// Log file, required when `output` is `file`. Rotated files get a
    /// date suffix.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,

    pub spans: SpanMode,
    pub thread_ids: bool,

    /// Include file names and line numbers.
    pub file_location: bool,

    /// Per-module levels, e.g. `xbot_framework = "debug"`.
    pub filters: BTreeMap<String, LogLevel>,
}

/// Settings visible to rules and filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that starts a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Users allowed through `only_super_users`.
    #[serde(default)]
    pub super_users: Vec<i64>,

    /// Regular expressions recognised as addressing the bot.
    #[serde(default)]
    pub nicknames: Vec<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            super_users: Vec::new(),
            nicknames: Vec::new(),
        }
    }
}

fn default_command_prefix() -> String {
    "/".to_string()
}

impl BotConfig {
    pub fn to_settings(&self) -> BotSettings {
        BotSettings::new()
            .command_prefix(self.command_prefix.clone())
            .super_users(self.super_users.iter().copied())
            .nicknames(&self.nicknames)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Seconds between sweeps of idle in-memory limiter keys.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = XbotConfig::default();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.bot.command_prefix, "/");
        assert_eq!(config.limiter.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_bot_config_to_settings() {
        let bot = BotConfig {
            command_prefix: "#".into(),
            super_users: vec![1, 2],
            nicknames: vec!["^xbot".into()],
        };
        let settings = bot.to_settings();

        assert_eq!(settings.get_command_prefix(), "#");
        assert!(settings.is_super_user(2));
        assert!(settings.mentions_nickname("xbot help"));
    }
}
