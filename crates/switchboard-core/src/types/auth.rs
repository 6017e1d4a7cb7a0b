//! Authentication and authorization types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Authorization level of a session.
///
/// Tiers are ordered: every tier may call what the tiers below it may call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Ordinary agent.
    #[default]
    Agent,

    /// Supervisor: agent methods plus the supervisor capability set.
    Supervisor,

    /// Administrator: same capabilities as a supervisor.
    Admin,
}

impl Tier {
    /// Whether this tier may use the supervisor capability set.
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Self::Supervisor | Self::Admin)
    }

    /// Wire name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Supervisor => "supervisor",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "supervisor" => Ok(Self::Supervisor),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Identity of an authenticated agent, as returned by the credential check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Login name (normalized).
    pub login: String,

    /// Stable agent identifier in the backing directory.
    pub agent_id: String,

    /// Security tier.
    pub tier: Tier,

    /// Skills the agent carries.
    #[serde(default)]
    pub skills: Vec<String>,

    /// Agent profile (team) name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// When authentication occurred.
    pub authenticated_at: DateTime<Utc>,
}

impl AgentIdentity {
    /// Create a new identity for a login at the given tier.
    pub fn new(login: impl Into<String>, tier: Tier) -> Self {
        let login = crate::id::normalize_login(&login.into());
        Self {
            agent_id: login.clone(),
            login,
            tier,
            skills: Vec::new(),
            profile: None,
            authenticated_at: Utc::now(),
        }
    }

    /// Set the agent's skills.
    pub fn with_skills(mut self, skills: Vec<String>) -> Self {
        self.skills = skills;
        self
    }

    /// Set the agent's profile.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}
