//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::Duration;
use switchboard_core::config::AgentAccount;
use switchboard_core::id::sha256;
use switchboard_core::types::{ReleaseOption, Tier};
use switchboard_core::Config;
use switchboard_gateway::actor::InMemoryAgentManager;
use switchboard_gateway::{Dispatcher, SessionSettings, SessionStore};

/// Password shared by every fixture account.
pub const PASSWORD: &str = "secret";

/// An account with the fixture password.
pub fn account(login: &str, tier: Tier, profile: Option<&str>) -> AgentAccount {
    AgentAccount {
        login: login.to_string(),
        password_sha256: sha256(PASSWORD),
        tier,
        skills: vec!["english".to_string()],
        profile: profile.map(str::to_string),
    }
}

/// A configuration with two agents and one supervisor.
pub fn config() -> Config {
    let mut config = Config::parse("{}").expect("empty config parses");
    config.agents = vec![
        account("alice", Tier::Agent, Some("day")),
        account("bob", Tier::Agent, Some("night")),
        account("sue", Tier::Supervisor, None),
    ];
    config.queues = vec!["support".to_string(), "sales".to_string()];
    config.session.linger_ms = 200;
    config
}

/// Settings with short linger and no idle timeout.
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        dispatch_timeout: Duration::from_secs(2),
        actor_timeout: Duration::from_secs(1),
        linger: Duration::from_millis(200),
        idle_timeout: None,
    }
}

/// A store over a fresh in-memory manager.
pub fn store() -> (Arc<SessionStore>, InMemoryAgentManager) {
    let manager = InMemoryAgentManager::new(
        vec![
            ReleaseOption::default_release(),
            ReleaseOption::new("lunch", "Lunch", 0),
        ],
        vec!["support".to_string(), "sales".to_string()],
    );
    let store = SessionStore::new(
        Arc::new(manager.clone()),
        Arc::new(Dispatcher::builtin()),
        fast_settings(),
    );
    (store, manager)
}
