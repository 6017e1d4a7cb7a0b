//! Configuration schema definitions.

use crate::types::{ReleaseOption, Tier};
use serde::{Deserialize, Serialize};

/// Main Switchboard configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Session behavior.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Agent accounts for the built-in directory.
    #[serde(default)]
    pub agents: Vec<AgentAccount>,

    /// Release reasons offered to agents.
    #[serde(default = "default_release_options")]
    pub release_options: Vec<ReleaseOption>,

    /// Queues offered as transfer targets.
    #[serde(default)]
    pub queues: Vec<String>,
}

fn default_release_options() -> Vec<ReleaseOption> {
    vec![
        ReleaseOption::default_release(),
        ReleaseOption::new("lunch", "Lunch", 0),
        ReleaseOption::new("meeting", "Meeting", 0),
    ]
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS for browser clients.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            cors: true,
        }
    }
}

fn default_port() -> u16 {
    5050
}

/// Network bind mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,
}

/// Session behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on a single handler invocation, in milliseconds.
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_ms: u64,

    /// Upper bound on a single call into the agent actor, in milliseconds.
    #[serde(default = "default_actor_timeout")]
    pub actor_timeout_ms: u64,

    /// How long a terminating session keeps its final events pollable, in milliseconds.
    #[serde(default = "default_linger")]
    pub linger_ms: u64,

    /// Terminate a session whose client has not polled or called for this long,
    /// in milliseconds. Zero disables the check.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Name of the cookie carrying the session id.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dispatch_timeout_ms: default_dispatch_timeout(),
            actor_timeout_ms: default_actor_timeout(),
            linger_ms: default_linger(),
            idle_timeout_ms: default_idle_timeout(),
            cookie_name: default_cookie_name(),
        }
    }
}

fn default_dispatch_timeout() -> u64 {
    10_000
}

fn default_actor_timeout() -> u64 {
    5_000
}

fn default_linger() -> u64 {
    5_000
}

fn default_idle_timeout() -> u64 {
    90_000
}

fn default_cookie_name() -> String {
    "switchboard_session".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Emit JSON log lines.
    #[serde(default)]
    pub json: bool,
}

/// Log level.
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
    /// Directive string for an env filter.
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

/// An agent account in the built-in directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAccount {
    /// Login name.
    pub login: String,

    /// Hex-encoded SHA256 of the password.
    pub password_sha256: String,

    /// Security tier.
    #[serde(default)]
    pub tier: Tier,

    /// Skills.
    #[serde(default)]
    pub skills: Vec<String>,

    /// Profile (team) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

fn default_true() -> bool {
    true
}
