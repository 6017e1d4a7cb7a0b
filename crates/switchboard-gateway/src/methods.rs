//! Capability table: the built-in methods a session may call.
//!
//! Methods are keyed by name and arity, where arity counts the session itself,
//! so `set_release(session, "lunch")` is `set_release/2`. Two sets exist: every
//! session may use the agent set, and supervisor-tier sessions may also use the
//! supervisor set.

use crate::protocol::Args;
use crate::session::Session;
use crate::Result;
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use switchboard_core::types::Tier;

/// What a handler wants sent back, and whether the session should end.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Success with no result.
    Ok,

    /// Success with a result.
    Value(serde_json::Value),

    /// Failure the handler chose to report.
    Error { message: String, errcode: String },

    /// Success, then end the session.
    Terminate,

    /// Success with a result, then end the session.
    TerminateWith(serde_json::Value),
}

impl Reply {
    /// Success carrying any serializable value.
    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value(value.into())
    }

    /// Handler-reported failure.
    pub fn error(message: impl Into<String>, errcode: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            errcode: errcode.into(),
        }
    }
}

/// Result of a handler invocation.
pub type HandlerResult = Result<Reply>;

/// Future returned by a handler.
pub type HandlerFuture<'a> = BoxFuture<'a, HandlerResult>;

/// A built-in handler.
pub type HandlerFn = for<'a> fn(&'a mut Session, Args) -> HandlerFuture<'a>;

/// One tier's methods.
#[derive(Default, Clone)]
pub struct CapabilitySet {
    methods: HashMap<&'static str, BTreeMap<usize, HandlerFn>>,
}

impl CapabilitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, builder style.
    pub fn with(mut self, name: &'static str, arity: usize, handler: HandlerFn) -> Self {
        self.insert(name, arity, handler);
        self
    }

    /// Register a handler.
    pub fn insert(&mut self, name: &'static str, arity: usize, handler: HandlerFn) {
        self.methods.entry(name).or_default().insert(arity, handler);
    }

    /// Look up a handler.
    pub fn get(&self, name: &str, arity: usize) -> Option<HandlerFn> {
        self.methods.get(name)?.get(&arity).copied()
    }

    /// Check if a method is registered.
    pub fn contains(&self, name: &str, arity: usize) -> bool {
        self.get(name, arity).is_some()
    }

    /// All registered `(name, arity)` pairs, sorted.
    pub fn signatures(&self) -> Vec<(&'static str, usize)> {
        let mut signatures: Vec<_> = self
            .methods
            .iter()
            .flat_map(|(name, arities)| arities.keys().map(move |arity| (*name, *arity)))
            .collect();
        signatures.sort_unstable();
        signatures
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.methods.values().map(BTreeMap::len).sum()
    }

    /// Check if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.signatures()).finish()
    }
}

/// Agent and supervisor capability sets.
#[derive(Debug, Default, Clone)]
pub struct CapabilityTable {
    /// Methods any session may call.
    pub agent: CapabilitySet,

    /// Methods only supervisor-tier sessions may call.
    pub supervisor: CapabilitySet,
}

impl CapabilityTable {
    /// Create a table from its two sets.
    pub fn new(agent: CapabilitySet, supervisor: CapabilitySet) -> Self {
        Self { agent, supervisor }
    }

    /// Find the handler a session of `tier` may use for `name/arity`.
    ///
    /// The agent set is consulted first. A supervisor method looked up by an
    /// agent-tier session resolves to `None`, same as a missing method.
    pub fn resolve(&self, name: &str, arity: usize, tier: Tier) -> Option<HandlerFn> {
        self.agent.get(name, arity).or_else(|| {
            if tier.is_supervisor() {
                self.supervisor.get(name, arity)
            } else {
                None
            }
        })
    }
}
