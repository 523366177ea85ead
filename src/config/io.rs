use std::path::{Path, PathBuf};

use crate::app_dirs;

use super::{CONFIG_FILE_NAME, ConfigError, MetricsConfig};

/// Resolve the configuration file path, ensuring the parent directory exists.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let dir = app_dirs::app_root_dir().map_err(map_app_dir_error)?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

/// Load configuration from the app directory, returning defaults if missing.
pub fn load_or_default() -> Result<MetricsConfig, ConfigError> {
    load_from(&config_path()?)
}

/// Load and validate configuration from `path`; a missing file yields defaults.
pub fn load_from(path: &Path) -> Result<MetricsConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("No config at {}; using defaults", path.display());
        return Ok(MetricsConfig::default());
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: MetricsConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate().map_err(|source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Save configuration to a specific path, creating parent directories as needed.
pub fn save_to_path(config: &MetricsConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn map_app_dir_error(error: app_dirs::AppDirError) -> ConfigError {
    match error {
        app_dirs::AppDirError::NoBaseDir => ConfigError::NoConfigDir,
        app_dirs::AppDirError::CreateDir { path, source } => {
            ConfigError::CreateDir { path, source }
        }
    }
}
