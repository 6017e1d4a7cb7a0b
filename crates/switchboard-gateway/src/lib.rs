//! Session and protocol core of the Switchboard agent-control server.
//!
//! This crate provides:
//! - A capability-gated request dispatcher with agent and supervisor tiers
//! - Reliable at-least-once event delivery with explicit acknowledgment
//! - Per-session tasks tying a client connection to its agent actor
//! - HTTP poll and WebSocket transports

pub mod actor;
pub mod auth;
pub mod channels;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod handlers;
pub mod hooks;
pub mod lifecycle;
pub mod methods;
pub mod payload;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use actor::{AgentActor, AgentManager, AgentNotice, AgentNotifier};
pub use auth::{Authenticator, DirectoryAuthenticator};
pub use channels::{ChannelBinding, ChannelId, ChannelRegistry};
pub use dispatch::{Dispatcher, Outcome};
pub use error::GatewayError;
pub use events::{DeliveryState, EventQueue, PendingEvent, RawCommand, ServerEvent};
pub use hooks::ExtensionHook;
pub use lifecycle::{Phase, TerminateReason};
pub use methods::{CapabilityTable, Reply};
pub use payload::Payload;
pub use protocol::{RequestEnvelope, ResponseEnvelope};
pub use server::{Gateway, GatewayConfig};
pub use session::{Session, SessionHandle, SessionId};
pub use store::{SessionSettings, SessionStore};

/// Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
