//! Agent actor seam.
//!
//! The gateway does not own an agent's call-handling state. It talks to an
//! [`AgentActor`] obtained from an [`AgentManager`], and the actor talks back
//! by posting [`AgentNotice`]s through the [`AgentNotifier`] it was given on
//! attach.

mod memory;

pub use memory::{InMemoryAgent, InMemoryAgentManager};

use crate::error::GatewayError;
use crate::events::RawCommand;
use crate::payload::Payload;
use crate::session::SessionId;
use async_trait::async_trait;
use std::sync::Arc;
use switchboard_core::types::{
    AgentIdentity, AgentSummary, CallSnapshot, ChannelHandle, ChannelPhase, ReleaseOption,
    ReleaseState,
};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by agent actors and managers.
#[derive(Debug, Clone, Error)]
pub enum ActorError {
    /// The actor is already attached to another live session.
    #[error("agent {0} is attached to another session")]
    Refused(String),

    /// The requested transition is not allowed from the current state.
    #[error("{0}")]
    InvalidStateChange(String),

    /// The actor does not hold that channel.
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    /// The actor has stopped.
    #[error("agent {0} is not running")]
    Unavailable(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl From<ActorError> for GatewayError {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::Refused(login) => GatewayError::DuplicateSession(login),
            ActorError::InvalidStateChange(msg) => GatewayError::InvalidStateChange(msg),
            ActorError::UnknownChannel(handle) => GatewayError::ChannelNotFound(handle),
            ActorError::Unavailable(login) => GatewayError::ActorUnavailable(login),
            ActorError::Failed(msg) => GatewayError::HandlerFault(msg),
        }
    }
}

/// Result type for actor calls.
pub type ActorResult<T> = std::result::Result<T, ActorError>;

/// Something that happened on the actor side and concerns the attached session.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentNotice {
    /// Release state changed.
    ReleaseChanged(ReleaseState),

    /// A new call leg was offered to or opened by the agent.
    ChannelOpened {
        handle: ChannelHandle,
        phase: ChannelPhase,
        call: CallSnapshot,
    },

    /// A call leg changed phase.
    ChannelState {
        handle: ChannelHandle,
        phase: ChannelPhase,
    },

    /// A call leg is gone.
    ChannelEnded { handle: ChannelHandle },

    /// Arbitrary command for the client (media events, URL pops, plugin output).
    Command(RawCommand),

    /// The actor stopped.
    Stopped { reason: String },
}

/// Handle an actor uses to post notices into one session.
#[derive(Debug, Clone)]
pub struct AgentNotifier {
    session: SessionId,
    tx: mpsc::UnboundedSender<AgentNotice>,
}

impl AgentNotifier {
    /// Create a notifier and the receiving end the session listens on.
    pub fn channel(session: SessionId) -> (Self, mpsc::UnboundedReceiver<AgentNotice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { session, tx }, rx)
    }

    /// Session this notifier feeds.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Post a notice. Returns `false` once the session is gone.
    pub fn notify(&self, notice: AgentNotice) -> bool {
        self.tx.send(notice).is_ok()
    }

    /// Check if the session has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One agent's live state, owned outside the gateway.
#[async_trait]
pub trait AgentActor: Send + Sync {
    /// Login this actor serves.
    fn login(&self) -> &str;

    /// Whether the actor is still running.
    fn is_alive(&self) -> bool;

    /// Attach a session. Fails with [`ActorError::Refused`] while another live
    /// session is attached.
    async fn attach(&self, notifier: AgentNotifier) -> ActorResult<()>;

    /// Detach a session. A no-op when `session` is not the attached one.
    async fn detach(&self, session: &SessionId);

    /// Current release state.
    async fn release_state(&self) -> ActorResult<ReleaseState>;

    /// Go idle or released.
    async fn set_release(&self, state: ReleaseState) -> ActorResult<()>;

    /// Request a phase change on a channel.
    async fn set_channel_state(&self, handle: &ChannelHandle, phase: ChannelPhase)
        -> ActorResult<()>;

    /// Hang up a channel.
    async fn hangup(&self, handle: &ChannelHandle) -> ActorResult<()>;

    /// Finish wrap-up on a channel.
    async fn end_wrapup(&self, handle: &ChannelHandle) -> ActorResult<()>;

    /// Send the call on a channel back to a queue.
    async fn queue_transfer(&self, handle: &ChannelHandle, queue: &str) -> ActorResult<()>;

    /// Transfer the call on a channel to another agent.
    async fn agent_transfer(&self, handle: &ChannelHandle, login: &str) -> ActorResult<()>;

    /// Forward a media-specific command to the channel's media driver.
    async fn media_command(
        &self,
        handle: &ChannelHandle,
        command: &str,
        args: Vec<Payload>,
    ) -> ActorResult<Payload>;

    /// Routing-level summary.
    fn summary(&self) -> AgentSummary;
}

/// Starts and looks up agent actors.
#[async_trait]
pub trait AgentManager: Send + Sync {
    /// Start (or reuse) the actor for an authenticated identity.
    async fn start_agent(&self, identity: &AgentIdentity) -> ActorResult<Arc<dyn AgentActor>>;

    /// Find the running actor for a login.
    async fn find_agent(&self, login: &str) -> Option<Arc<dyn AgentActor>>;

    /// Agents available as transfer targets.
    async fn available_agents(&self) -> Vec<AgentSummary>;

    /// Queues available as transfer targets.
    fn queues(&self) -> Vec<String>;

    /// Configured release reasons.
    fn release_options(&self) -> Vec<ReleaseOption>;
}
