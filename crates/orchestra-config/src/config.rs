// Configuration loading and management

use crate::env::{apply_env_overrides, load_env_config};
use crate::schema::*;
use alloc::format;
use alloc::string::ToString;

#[cfg(feature = "std")]
use std::path::PathBuf;

/// Load configuration from file and environment variables.
///
/// Loading hierarchy: env > file > defaults.
#[cfg(feature = "std")]
pub fn load_config() -> Result<OrchestraConfig, ConfigError> {
    let config_file = get_config_file_path()?;

    let mut config = if config_file.exists() {
        load_from_file(&config_file)?
    } else {
        OrchestraConfig::default()
    };

    let env_vars = load_env_config();
    apply_env_overrides(&mut config, &env_vars);

    validate_config(&config)?;

    Ok(config)
}

/// Load configuration from a specific file path.
#[cfg(feature = "std")]
pub fn load_from_file(path: &PathBuf) -> Result<OrchestraConfig, ConfigError> {
    use std::fs;

    let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Default configuration file path: `$HOME/.orchestra/config.toml`
/// (`%APPDATA%\orchestra\config.toml` on Windows), overridable via
/// `ORCH_CONFIG_PATH` which is consulted first.
#[cfg(feature = "std")]
pub fn get_config_file_path() -> Result<PathBuf, ConfigError> {
    if let Ok(explicit) = std::env::var("ORCH_CONFIG_PATH") {
        return Ok(PathBuf::from(explicit));
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| ConfigError::IoError("APPDATA not set".to_string()))?;
        let mut path = PathBuf::from(appdata);
        path.push("orchestra");
        path.push("config.toml");
        Ok(path)
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home =
            std::env::var("HOME").map_err(|_| ConfigError::IoError("HOME not set".to_string()))?;
        let mut path = PathBuf::from(home);
        path.push(".orchestra");
        path.push("config.toml");
        Ok(path)
    }
}

/// Validate cross-field invariants that serde defaults alone can't express.
pub fn validate_config(config: &OrchestraConfig) -> Result<(), ConfigError> {
    if config.server.listen_port == 0 {
        return Err(ConfigError::ValidationError("server.listen_port cannot be 0".to_string()));
    }

    if !(0.0..=1.0).contains(&config.embedder.similarity_threshold) {
        return Err(ConfigError::ValidationError(format!(
            "embedder.similarity_threshold {} must be within [0.0, 1.0]",
            config.embedder.similarity_threshold
        )));
    }

    if config.retry.backoff_factor <= 1.0 {
        return Err(ConfigError::ValidationError(format!(
            "retry.backoff_factor {} must be > 1.0 for exponential backoff to grow",
            config.retry.backoff_factor
        )));
    }

    if !(0.0..=1.0).contains(&config.retry.jitter_ratio) {
        return Err(ConfigError::ValidationError(format!(
            "retry.jitter_ratio {} must be within [0.0, 1.0]",
            config.retry.jitter_ratio
        )));
    }

    if config.orchestration.task_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestration.task_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.orchestration.task_timeout_secs > config.orchestration.overall_timeout_secs {
        return Err(ConfigError::ValidationError(format!(
            "orchestration.task_timeout_secs {} cannot exceed overall_timeout_secs {}",
            config.orchestration.task_timeout_secs, config.orchestration.overall_timeout_secs
        )));
    }

    Ok(())
}

#[cfg(not(feature = "std"))]
pub fn load_config() -> Result<OrchestraConfig, ConfigError> {
    Ok(OrchestraConfig::default())
}
