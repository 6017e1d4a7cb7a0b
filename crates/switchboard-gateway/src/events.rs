//! Reliable outbound event delivery.
//!
//! Every server-originated notice for a session goes through its
//! [`EventQueue`]. Events get a sequence number, stay in the queue until the
//! client acknowledges them (or reports it could not apply them), and are
//! handed out again on every drain until then.

use crate::channels::{ChannelId, ChannelRegistry};
use crate::payload::Payload;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use switchboard_core::types::ChannelHandle;
use tracing::{debug, warn};

/// Keys the envelope owns. Event fields with these names are dropped on encode.
const RESERVED_KEYS: &[&str] = &["seq", "command", "channelid"];

/// A server event before it is queued.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    /// Command name.
    pub command: String,

    /// Channel the event concerns.
    pub channel: Option<ChannelId>,

    /// Command-specific fields.
    pub fields: BTreeMap<String, Payload>,
}

impl ServerEvent {
    /// Create an event with no fields.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            channel: None,
            fields: BTreeMap::new(),
        }
    }

    /// Scope the event to a channel.
    pub fn channel(mut self, id: ChannelId) -> Self {
        self.channel = Some(id);
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Shape a collaborator's raw command for this session.
    ///
    /// Returns `None` when the command is channel-scoped and the handle is not
    /// bound here: the client cannot act on a channel it was never told about.
    pub fn shape(raw: RawCommand, channels: &ChannelRegistry) -> Option<Self> {
        let channel = match raw.channel {
            Some(ref handle) => Some(channels.public_id(handle)?),
            None => None,
        };
        Some(Self {
            command: raw.command,
            channel,
            fields: raw.fields,
        })
    }
}

/// A command emitted by a collaborator (agent actor, media driver, plugin).
#[derive(Debug, Clone, PartialEq)]
pub struct RawCommand {
    /// Command name.
    pub command: String,

    /// Internal handle of the channel it concerns.
    pub channel: Option<ChannelHandle>,

    /// Fields.
    pub fields: BTreeMap<String, Payload>,
}

impl RawCommand {
    /// Create a raw command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            channel: None,
            fields: BTreeMap::new(),
        }
    }

    /// Scope the command to a channel handle.
    pub fn on_channel(mut self, handle: ChannelHandle) -> Self {
        self.channel = Some(handle);
        self
    }

    /// Add a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Delivery state of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryState {
    /// Not yet handed to the client.
    Queued,

    /// Handed out at least once, not yet acknowledged.
    DeliveredUnacked,
}

/// One queued event.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent {
    /// Sequence number, strictly increasing per session from 1.
    pub seq: u64,

    /// The event.
    pub event: ServerEvent,

    /// Delivery state.
    pub state: DeliveryState,
}

impl PendingEvent {
    /// Wire encoding: `{seq, command, [channelid], ...fields}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (key, value) in &self.event.fields {
            if !RESERVED_KEYS.contains(&key.as_str()) {
                object.insert(key.clone(), value.to_json());
            }
        }
        object.insert("seq".to_string(), serde_json::Value::from(self.seq));
        object.insert(
            "command".to_string(),
            serde_json::Value::String(self.event.command.clone()),
        );
        if let Some(channel) = self.event.channel {
            object.insert("channelid".to_string(), serde_json::Value::from(channel.get()));
        }
        serde_json::Value::Object(object)
    }
}

/// Per-session outbox.
#[derive(Debug)]
pub struct EventQueue {
    next_seq: u64,
    pending: VecDeque<PendingEvent>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            next_seq: 1,
            pending: VecDeque::new(),
        }
    }

    /// Queue an event and return its sequence number.
    pub fn enqueue(&mut self, event: ServerEvent) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        debug!("Queued event {} ({})", seq, event.command);
        self.pending.push_back(PendingEvent {
            seq,
            event,
            state: DeliveryState::Queued,
        });
        seq
    }

    /// Every queued and unacknowledged event, in sequence order.
    ///
    /// Marks them all delivered; removes nothing.
    pub fn drain(&mut self) -> Vec<PendingEvent> {
        self.pending
            .iter_mut()
            .map(|event| {
                event.state = DeliveryState::DeliveredUnacked;
                event.clone()
            })
            .collect()
    }

    /// Mark one event delivered and return a copy of it.
    pub fn deliver(&mut self, seq: u64) -> Option<PendingEvent> {
        let index = self.position(seq)?;
        let event = &mut self.pending[index];
        event.state = DeliveryState::DeliveredUnacked;
        Some(event.clone())
    }

    /// Remove an acknowledged event. Unknown sequence numbers are ignored.
    pub fn acknowledge(&mut self, seq: u64) -> bool {
        match self.position(seq) {
            Some(index) => {
                self.pending.remove(index);
                debug!("Event {} acknowledged", seq);
                true
            }
            None => false,
        }
    }

    /// Remove an event the client could not apply. It is not resent.
    pub fn report_error(&mut self, seq: u64, message: Option<&str>) -> bool {
        let Some(index) = self.position(seq) else {
            return false;
        };
        if let Some(event) = self.pending.remove(index) {
            warn!(
                "Client rejected event {} ({}): {}",
                seq,
                event.event.command,
                message.unwrap_or("no reason given")
            );
        }
        true
    }

    /// Look at a pending event.
    pub fn get(&self, seq: u64) -> Option<&PendingEvent> {
        self.position(seq).map(|index| &self.pending[index])
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Sequence number the next event will get.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Drop every pending event. Sequence numbers are not rewound.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    fn position(&self, seq: u64) -> Option<usize> {
        // Appended in sequence order, so the deque stays sorted.
        self.pending.binary_search_by_key(&seq, |e| e.seq).ok()
    }
}
