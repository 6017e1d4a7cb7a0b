//! Per-session channel registry.
//!
//! Maps the agent actor's internal [`ChannelHandle`]s to small public
//! [`ChannelId`]s that are safe to hand to the client. Ids come from a
//! per-session counter and are never reused within a session, so an id carried
//! by an unacknowledged event can never come to mean a different channel.

use crate::error::GatewayError;
use crate::payload::Payload;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use switchboard_core::types::{CallSnapshot, ChannelHandle, ChannelPhase};

/// Public channel identifier, unique within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Numeric value.
    pub fn get(&self) -> u64 {
        self.0
    }

    /// Parse a channel id from a request argument (number or numeric string).
    pub fn from_arg(value: &serde_json::Value) -> Result<Self> {
        let parsed = match value {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed
            .filter(|id| *id > 0)
            .map(Self)
            .ok_or_else(|| GatewayError::BadArguments(format!("invalid channel id: {}", value)))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<ChannelId> for Payload {
    fn from(id: ChannelId) -> Self {
        Payload::from(id.0)
    }
}

/// One bound channel.
#[derive(Debug, Clone)]
pub struct ChannelBinding {
    /// Public id.
    pub id: ChannelId,

    /// Internal handle.
    pub handle: ChannelHandle,

    /// Last known phase.
    pub phase: ChannelPhase,

    /// Call snapshot for display.
    pub call: CallSnapshot,

    /// When the binding was created.
    pub bound_at: DateTime<Utc>,
}

impl ChannelBinding {
    /// Client-facing description of the binding.
    pub fn to_payload(&self) -> Payload {
        Payload::map()
            .with("channelid", self.id)
            .with("state", self.phase.as_str())
            .with("statedata", call_payload(&self.call))
            .with("bound_at", self.bound_at.to_rfc3339())
    }
}

/// Encode a call snapshot.
pub fn call_payload(call: &CallSnapshot) -> Payload {
    Payload::map()
        .with("callid", call.call_id.as_str())
        .with(
            "callerid",
            Payload::map()
                .with("name", call.caller_id.name.as_str())
                .with("number", call.caller_id.number.as_str()),
        )
        .with("queue", call.queue.as_deref())
        .with("client", call.client.as_deref())
        .with("skills", call.skills.clone())
        .with("type", call.media_type.as_str())
        .with("direction", call.direction.as_str())
}

/// Bidirectional handle ⇄ id mapping for one session.
#[derive(Debug)]
pub struct ChannelRegistry {
    next_id: u64,
    by_handle: HashMap<ChannelHandle, ChannelId>,
    bindings: BTreeMap<ChannelId, ChannelBinding>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: 1,
            by_handle: HashMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    /// Bind a handle, returning its public id. Binding a bound handle returns the existing id.
    pub fn bind(&mut self, handle: ChannelHandle) -> ChannelId {
        self.bind_call(handle, ChannelPhase::Prering, CallSnapshot::default())
    }

    /// Bind a handle with its initial phase and call snapshot.
    ///
    /// If the handle is already bound, the existing binding is refreshed and its id returned.
    pub fn bind_call(
        &mut self,
        handle: ChannelHandle,
        phase: ChannelPhase,
        call: CallSnapshot,
    ) -> ChannelId {
        if let Some(id) = self.by_handle.get(&handle).copied() {
            if let Some(binding) = self.bindings.get_mut(&id) {
                binding.phase = phase;
                if call != CallSnapshot::default() {
                    binding.call = call;
                }
            }
            return id;
        }

        let id = ChannelId(self.next_id);
        self.next_id += 1;
        self.by_handle.insert(handle.clone(), id);
        self.bindings.insert(
            id,
            ChannelBinding {
                id,
                handle,
                phase,
                call,
                bound_at: Utc::now(),
            },
        );
        id
    }

    /// Resolve a public id to its internal handle.
    pub fn lookup(&self, id: ChannelId) -> Option<&ChannelHandle> {
        self.bindings.get(&id).map(|b| &b.handle)
    }

    /// Resolve a public id to its binding, or fail with `ChannelNotFound`.
    pub fn resolve(&self, id: ChannelId) -> Result<&ChannelBinding> {
        self.bindings
            .get(&id)
            .ok_or_else(|| GatewayError::ChannelNotFound(id.to_string()))
    }

    /// Public id of a bound handle.
    pub fn public_id(&self, handle: &ChannelHandle) -> Option<ChannelId> {
        self.by_handle.get(handle).copied()
    }

    /// Record a new phase for a bound handle.
    pub fn set_phase(&mut self, handle: &ChannelHandle, phase: ChannelPhase) -> Option<ChannelId> {
        let id = self.public_id(handle)?;
        if let Some(binding) = self.bindings.get_mut(&id) {
            binding.phase = phase;
        }
        Some(id)
    }

    /// Remove a binding, returning the id it had.
    pub fn unbind(&mut self, handle: &ChannelHandle) -> Option<ChannelId> {
        let id = self.by_handle.remove(handle)?;
        self.bindings.remove(&id);
        Some(id)
    }

    /// Iterate bindings in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ChannelBinding> {
        self.bindings.values()
    }

    /// Number of bound channels.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no channels are bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding. Ids stay retired.
    pub fn clear(&mut self) {
        self.by_handle.clear();
        self.bindings.clear();
    }
}
