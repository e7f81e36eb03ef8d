use std::path::Path;

use super::{types::Config, ConfigError};
use crate::install::is_valid_version_dir;

/// Log levels the transcoder accepts for `-loglevel`.
pub const LOG_LEVELS: [&str; 9] = [
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

/// Validate configuration
///
/// Checks tuning values are non-zero, tool roots are absolute, managed
/// versions are usable as directory names, and the log level is known.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let tools = &config.tools;
    check_root("tools.local_root", tools.local_root.as_deref())?;
    check_root("tools.managed_root", tools.managed_root.as_deref())?;
    check_version("tools.ffmpeg_version", tools.ffmpeg_version.as_deref())?;
    check_version("tools.ffprobe_version", tools.ffprobe_version.as_deref())?;

    if config.download.chunk_size == 0 {
        return Err(invalid("download.chunk_size cannot be 0"));
    }
    if config.download.pause_poll_ms == 0 {
        return Err(invalid("download.pause_poll_ms cannot be 0"));
    }
    if config.download.timeout_secs == 0 {
        return Err(invalid("download.timeout_secs cannot be 0"));
    }
    if config.runner.stdin_write_timeout_ms == 0 {
        return Err(invalid("runner.stdin_write_timeout_ms cannot be 0"));
    }
    if config.transcoder.timeout_secs == 0 {
        return Err(invalid("transcoder.timeout_secs cannot be 0"));
    }
    if !LOG_LEVELS.contains(&config.transcoder.log_level.as_str()) {
        return Err(invalid(format!(
            "transcoder.log_level '{}' is not one of {}",
            config.transcoder.log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_root(key: &str, root: Option<&Path>) -> Result<(), ConfigError> {
    match root {
        Some(path) if !path.is_absolute() => Err(invalid(format!(
            "{} must be an absolute path, got {}",
            key,
            path.display()
        ))),
        _ => Ok(()),
    }
}

fn check_version(key: &str, version: Option<&str>) -> Result<(), ConfigError> {
    match version {
        Some(v) if !is_valid_version_dir(v) => Err(
            invalid(format!("{} '{}' is not a valid version directory", key, v)),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_chunk_size_zero_fails() {
        let mut config = Config::default();
        config.download.chunk_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_unknown_log_level() {
        let mut config = Config::default();
        config.transcoder.log_level = "chatty".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_relative_root() {
        let mut config = Config::default();
        config.tools.managed_root = Some(PathBuf::from("tools"));
        assert!(validate_config(&config).is_err());

        config.tools.managed_root = Some(PathBuf::from("/opt/tools"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_version_with_separator() {
        let mut config = Config::default();
        config.tools.ffmpeg_version = Some("../7.1".to_string());
        assert!(validate_config(&config).is_err());

        config.tools.ffmpeg_version = Some("7.1".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
