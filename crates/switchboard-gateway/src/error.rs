//! Gateway error types.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that can occur in the gateway.
///
/// Every variant except [`GatewayError::ActorUnavailable`] is reported to the
/// client as a `success: false` response carrying [`GatewayError::errcode`].
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Login or session start rejected.
    #[error("Authentication denied: {0}")]
    AuthDenied(String),

    /// The login is already active elsewhere.
    #[error("Duplicate session: {0}")]
    DuplicateSession(String),

    /// No module/function match. Also used when the tier forbids the method.
    #[error("Function not found: {0}")]
    MethodNotFound(String),

    /// The request named a channel id that is not bound in this session.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// The named agent is not logged in.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// The agent actor rejected a state transition.
    #[error("Invalid state change: {0}")]
    InvalidStateChange(String),

    /// Arguments did not match what the method expects.
    #[error("Bad arguments: {0}")]
    BadArguments(String),

    /// A handler failed unexpectedly (panic or timeout).
    #[error("Handler exception: {0}")]
    HandlerFault(String),

    /// The backing agent actor is unreachable or dead.
    #[error("Agent actor unavailable: {0}")]
    ActorUnavailable(String),

    /// The session is not yet active.
    #[error("Session not ready: {0}")]
    NotReady(String),

    /// The session is terminating or gone.
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Machine-readable error code sent to clients.
    pub fn errcode(&self) -> &'static str {
        match self {
            Self::AuthDenied(_) => "AUTH_DENIED",
            Self::DuplicateSession(_) => "DUPLICATE_SESSION",
            Self::MethodNotFound(_) => "FUNCTION_NOEXISTS",
            Self::ChannelNotFound(_) => "CHANNEL_NOEXISTS",
            Self::AgentNotFound(_) => "AGENT_NOEXISTS",
            Self::InvalidStateChange(_) => "INVALID_STATE_CHANGE",
            Self::BadArguments(_) | Self::Json(_) => "BAD_ARGUMENTS",
            Self::HandlerFault(_) => "HANDLER_EXCEPTION",
            Self::ActorUnavailable(_) => "ACTOR_UNAVAILABLE",
            Self::NotReady(_) => "NOT_READY",
            Self::SessionClosed(_) => "SESSION_CLOSED",
            Self::Io(_) | Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status used when the error ends a transport request.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthDenied(_) | Self::SessionClosed(_) => StatusCode::UNAUTHORIZED,
            Self::DuplicateSession(_) => StatusCode::CONFLICT,
            Self::BadArguments(_) | Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotFound(_) | Self::ChannelNotFound(_) | Self::AgentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::InvalidStateChange(_) | Self::NotReady(_) => StatusCode::CONFLICT,
            Self::ActorUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::HandlerFault(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether this error is fatal to the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ActorUnavailable(_))
    }
}
