//! Session lifecycle.
//!
//! A session moves strictly forward through
//! `Initializing -> Active -> Terminating -> Terminated`. The current phase is
//! published on a watch channel so handles held by transports can observe it
//! without going through the session's mailbox.

use serde::Serialize;
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Authenticated; agent actor not yet attached.
    Initializing,

    /// Attached and serving requests.
    Active,

    /// Shutting down; remaining events may still be collected.
    Terminating,

    /// Gone.
    Terminated,
}

impl Phase {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Terminating => "terminating",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateReason {
    /// The client logged out.
    Logout,

    /// A supervisor kicked the agent.
    Kicked,

    /// A newer session for the same login took over.
    Replaced,

    /// The agent actor died or became unreachable.
    ActorDown,

    /// The push transport disconnected.
    Disconnected,

    /// No client activity within the idle timeout.
    Idle,
}

impl TerminateReason {
    /// Wire name, sent in the final `stopped` event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Kicked => "kicked",
            Self::Replaced => "replaced",
            Self::ActorDown => "actor_down",
            Self::Disconnected => "disconnected",
            Self::Idle => "idle",
        }
    }

    /// Whether the session should linger for the client to collect its last events.
    ///
    /// A replaced session's client is already talking to the new session.
    pub fn lingers(&self) -> bool {
        !matches!(self, Self::Replaced)
    }
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owner side of a session's phase.
#[derive(Debug)]
pub struct Lifecycle {
    tx: watch::Sender<Phase>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a lifecycle in `Initializing`.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Phase::Initializing);
        Self { tx }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        *self.tx.borrow()
    }

    /// Subscribe to phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.tx.subscribe()
    }

    /// Move forward to `next`.
    ///
    /// Returns `false` without changing anything when `next` is not ahead of
    /// the current phase, so repeated termination is harmless.
    pub fn advance(&self, next: Phase) -> bool {
        let current = self.phase();
        if next <= current {
            return false;
        }
        debug!("Session phase {} -> {}", current, next);
        self.tx.send_replace(next);
        true
    }
}

/// Wait until a watched session reaches `Terminated`.
///
/// Also returns if the owning side is dropped.
pub async fn wait_terminated(rx: &mut watch::Receiver<Phase>) {
    let _ = rx.wait_for(|phase| *phase == Phase::Terminated).await;
}
