//! Configuration loading and persistence.

use super::Config;
use crate::error::ConfigError;
use crate::{env, id, paths};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        tracing::debug!("Loading configuration from {}", path.display());
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(port) = env::get_u16(env::vars::PORT) {
            self.server.port = port;
        }
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;
        tracing::debug!("Saved configuration to {}", path.display());

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 doesn't have a serializer, so we use serde_json with pretty print
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("Server port cannot be 0".to_string());
        }

        if self.session.dispatch_timeout_ms == 0 {
            errors.push("session.dispatch_timeout_ms must be greater than 0".to_string());
        }
        if self.session.actor_timeout_ms == 0 {
            errors.push("session.actor_timeout_ms must be greater than 0".to_string());
        }
        if self.session.actor_timeout_ms > self.session.dispatch_timeout_ms {
            errors.push(format!(
                "session.actor_timeout_ms ({}) exceeds dispatch_timeout_ms ({})",
                self.session.actor_timeout_ms, self.session.dispatch_timeout_ms
            ));
        }
        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            errors.push(format!(
                "Invalid session cookie name '{}'",
                self.session.cookie_name
            ));
        }

        let mut logins = HashSet::new();
        for (i, account) in self.agents.iter().enumerate() {
            let login = id::normalize_login(&account.login);
            if login.is_empty() {
                errors.push(format!("Agent [{}]: login must not be empty", i));
            } else if !logins.insert(login.clone()) {
                errors.push(format!("Agent '{}' is defined more than once", login));
            }
            if !id::is_sha256_hex(&account.password_sha256) {
                errors.push(format!(
                    "Agent '{}': password_sha256 must be 64 hex characters",
                    login
                ));
            }
        }

        let mut releases = HashSet::new();
        for release in &self.release_options {
            if !releases.insert(release.id.as_str()) {
                errors.push(format!("Release option '{}' is defined more than once", release.id));
            }
            if !(-1..=1).contains(&release.bias) {
                errors.push(format!(
                    "Release option '{}': bias must be -1, 0 or 1",
                    release.id
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Find an account by login.
    pub fn find_account(&self, login: &str) -> Option<&super::AgentAccount> {
        let login = id::normalize_login(login);
        self.agents
            .iter()
            .find(|a| id::normalize_login(&a.login) == login)
    }
}
