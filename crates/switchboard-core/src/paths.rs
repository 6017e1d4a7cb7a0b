//! Path resolution utilities.

use crate::error::ConfigError;
use std::path::PathBuf;

/// Get the Switchboard base directory (~/.switchboard).
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::Validation("Could not determine home directory".to_string())
    })?;
    Ok(home.join(".switchboard"))
}

/// Get the main config file path (~/.switchboard/switchboard.json5).
pub fn config_file() -> Result<PathBuf, ConfigError> {
    Ok(base_dir()?.join("switchboard.json5"))
}

/// Ensure the base directory exists.
pub fn ensure_dirs() -> Result<(), ConfigError> {
    std::fs::create_dir_all(base_dir()?)?;
    Ok(())
}
