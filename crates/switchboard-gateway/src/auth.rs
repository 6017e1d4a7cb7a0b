//! Credential checks.

use crate::error::GatewayError;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use switchboard_core::config::AgentAccount;
use switchboard_core::id::{normalize_login, sha256};
use switchboard_core::types::AgentIdentity;
use switchboard_core::Config;
use tracing::{debug, warn};

/// Turns a username and password into an agent identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticate, failing with [`GatewayError::AuthDenied`].
    async fn authenticate(&self, username: &str, password: &str) -> Result<AgentIdentity>;
}

/// Authenticator backed by the account list in the configuration.
#[derive(Debug, Clone, Default)]
pub struct DirectoryAuthenticator {
    accounts: HashMap<String, AgentAccount>,
}

impl DirectoryAuthenticator {
    /// Create an authenticator over a set of accounts.
    pub fn new(accounts: impl IntoIterator<Item = AgentAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (normalize_login(&account.login), account))
            .collect();
        Self { accounts }
    }

    /// Create an authenticator from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.agents.iter().cloned())
    }

    /// Number of known accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Check if there are no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Compare two strings without stopping at the first difference.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[async_trait]
impl Authenticator for DirectoryAuthenticator {
    async fn authenticate(&self, username: &str, password: &str) -> Result<AgentIdentity> {
        let login = normalize_login(username);
        let Some(account) = self.accounts.get(&login) else {
            warn!("Login attempt for unknown account {}", login);
            return Err(GatewayError::AuthDenied(login));
        };

        let presented = sha256(password);
        if !constant_time_eq(&presented, &account.password_sha256.to_lowercase()) {
            warn!("Bad password for {}", login);
            return Err(GatewayError::AuthDenied(login));
        }

        debug!("Authenticated {} as {}", login, account.tier);
        let mut identity =
            AgentIdentity::new(&login, account.tier).with_skills(account.skills.clone());
        if let Some(ref profile) = account.profile {
            identity = identity.with_profile(profile);
        }
        Ok(identity)
    }
}
