//! Agent release-state types.

use serde::{Deserialize, Serialize};

/// A configured reason an agent may go released (unavailable) for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOption {
    /// Release identifier.
    pub id: String,

    /// Human-readable label.
    pub label: String,

    /// Reporting bias: -1 negative, 0 neutral, 1 positive.
    #[serde(default)]
    pub bias: i8,
}

impl ReleaseOption {
    /// Create a new release option.
    pub fn new(id: impl Into<String>, label: impl Into<String>, bias: i8) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            bias,
        }
    }

    /// The implicit release used when a client asks for "released" without a reason.
    pub fn default_release() -> Self {
        Self::new("default", "Default", 0)
    }
}

/// Whether an agent is taking calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ReleaseState {
    /// Available for routing.
    #[default]
    Idle,

    /// Released for the given reason.
    Released {
        /// The release reason.
        release: ReleaseOption,
    },
}

impl ReleaseState {
    /// Check if the agent is released.
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released { .. })
    }
}

/// Summary of an agent as seen by routing and supervisors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Login name.
    pub login: String,

    /// Profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    /// Release state.
    pub release: ReleaseState,

    /// Number of channels the agent currently holds.
    pub channels: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_state_default_is_idle() {
        assert_eq!(ReleaseState::default(), ReleaseState::Idle);
        assert!(!ReleaseState::Idle.is_released());
    }

    #[test]
    fn test_release_state_serde_tagged() {
        let state = ReleaseState::Released {
            release: ReleaseOption::new("lunch", "Lunch", -1),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "released");
        assert_eq!(json["release"]["id"], "lunch");
        assert!(state.is_released());
    }
}
