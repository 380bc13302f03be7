//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BotConfig, LimiterConfig, LogOutput, LoggingConfig, XbotConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &XbotConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_bot_config(&config.bot)?;
    validate_limiter_config(&config.limiter)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::invalid(
            "logging.file_path",
            "required when output is `file`",
        ));
    }

    for module in logging.filters.keys() {
        if module.trim().is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "logging.filters",
                format!("{module:?} is not a module path"),
            ));
        }
    }

    Ok(())
}

fn validate_bot_config(bot: &BotConfig) -> ConfigResult<()> {
    if bot.command_prefix.is_empty() {
        return Err(ConfigError::invalid("bot.command_prefix", "must not be empty"));
    }
    if bot.command_prefix.contains(char::is_whitespace) {
        return Err(ConfigError::invalid(
            "bot.command_prefix",
            format!("{:?} contains whitespace", bot.command_prefix),
        ));
    }

    let mut seen = HashSet::new();
    for user in &bot.super_users {
        if !seen.insert(user) {
            return Err(ConfigError::invalid(
                "bot.super_users",
                format!("{user} is listed twice"),
            ));
        }
    }

    Ok(())
}

fn validate_limiter_config(limiter: &LimiterConfig) -> ConfigResult<()> {
    if limiter.sweep_interval_secs == 0 {
        return Err(ConfigError::invalid(
            "limiter.sweep_interval_secs",
            "must be greater than zero",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&XbotConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_requires_path() {
        let mut config = XbotConfig::default();
        config.logging.output = LogOutput::File;
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.key().as_deref(), Some("logging.file_path"));

        config.logging.file_path = Some(PathBuf::from("logs/xbot.log"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_command_prefix() {
        let mut config = XbotConfig::default();
        config.bot.command_prefix = String::new();
        assert!(validate_config(&config).is_err());

        config.bot.command_prefix = "! ".into();
        assert!(validate_config(&config).is_err());

        config.bot.command_prefix = "!!".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_super_users() {
        let mut config = XbotConfig::default();
        config.bot.super_users = vec![1, 2, 1];
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "invalid `bot.super_users`: 1 is listed twice");
    }

    #[test]
    fn test_zero_sweep_interval() {
        let mut config = XbotConfig::default();
        config.limiter.sweep_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }
}
