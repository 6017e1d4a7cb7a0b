//! CLI command implementations.

pub mod config;
pub mod serve;

use std::path::Path;
use switchboard_core::config::Config;
use switchboard_core::ConfigError;

/// Load configuration from `path`, or from the default location.
///
/// A missing default file yields the built-in defaults; a missing explicit
/// file is an error. Environment overrides are applied either way.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => match Config::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Config::default(),
            Err(e) => return Err(e.into()),
        },
    };
    config.apply_env();
    Ok(config)
}
