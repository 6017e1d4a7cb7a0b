//! Call channel types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque handle the agent actor uses for one in-progress call leg.
///
/// Never exposed to clients; the gateway maps it to a per-session public id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelHandle(String);

impl ChannelHandle {
    /// Create a new channel handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Generate a fresh random handle.
    pub fn generate() -> Self {
        Self(crate::id::uuid())
    }

    /// Get the handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelHandle {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Lifecycle phase of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelPhase {
    Prering,
    Ringing,
    Precall,
    Oncall,
    WarmtransferHold,
    #[serde(rename = "warmtransfer_3rd_party")]
    Warmtransfer3rdParty,
    Wrapup,
    Ended,
}

impl ChannelPhase {
    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prering => "prering",
            Self::Ringing => "ringing",
            Self::Precall => "precall",
            Self::Oncall => "oncall",
            Self::WarmtransferHold => "warmtransfer_hold",
            Self::Warmtransfer3rdParty => "warmtransfer_3rd_party",
            Self::Wrapup => "wrapup",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for ChannelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelPhase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prering" => Ok(Self::Prering),
            "ringing" => Ok(Self::Ringing),
            "precall" => Ok(Self::Precall),
            "oncall" => Ok(Self::Oncall),
            "warmtransfer_hold" => Ok(Self::WarmtransferHold),
            "warmtransfer_3rd_party" => Ok(Self::Warmtransfer3rdParty),
            "wrapup" => Ok(Self::Wrapup),
            "ended" => Ok(Self::Ended),
            other => Err(format!("unknown channel state: {}", other)),
        }
    }
}

/// Media type of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Voice,
    Voicemail,
    Email,
    Chat,
}

impl MediaType {
    /// Wire name of the media type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voice => "voice",
            Self::Voicemail => "voicemail",
            Self::Email => "email",
            Self::Chat => "chat",
        }
    }
}

/// Direction of a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    #[default]
    Inbound,
    Outbound,
}

impl CallDirection {
    /// Wire name of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }
}

/// Caller identification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerId {
    /// Display name.
    pub name: String,

    /// Number or address.
    pub number: String,
}

/// Denormalized view of the call behind a channel, kept for client display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSnapshot {
    /// Call identifier in the routing engine.
    pub call_id: String,

    /// Caller identification.
    #[serde(default)]
    pub caller_id: CallerId,

    /// Queue the call came through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Client (brand) the call belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,

    /// Skills required by the call.
    #[serde(default)]
    pub skills: Vec<String>,

    /// Media type.
    #[serde(default)]
    pub media_type: MediaType,

    /// Direction.
    #[serde(default)]
    pub direction: CallDirection,
}

impl CallSnapshot {
    /// Create a snapshot for a call.
    pub fn new(call_id: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            ..Default::default()
        }
    }

    /// Set the caller id.
    pub fn with_caller(mut self, name: impl Into<String>, number: impl Into<String>) -> Self {
        self.caller_id = CallerId {
            name: name.into(),
            number: number.into(),
        };
        self
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the client (brand).
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Set the media type.
    pub fn with_media_type(mut self, media_type: MediaType) -> Self {
        self.media_type = media_type;
        self
    }
}
