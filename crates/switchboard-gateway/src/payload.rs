//! Structured event payload values.
//!
//! Collaborators hand the gateway loosely shaped data (release reasons, call
//! details, plugin fields). [`Payload`] gives it a closed set of shapes with one
//! JSON encoding per tag.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use switchboard_core::types::{ReleaseOption, ReleaseState};

/// A payload value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

impl Payload {
    /// Create an empty map payload.
    pub fn map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Insert into a map payload, builder style. No-op on other tags.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Payload>) -> Self {
        if let Self::Map(ref mut map) = self {
            map.insert(key.into(), value.into());
        }
        self
    }

    /// Look up a key in a map payload.
    pub fn get(&self, key: &str) -> Option<&Payload> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Borrow the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Encode as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::from(*i),
            // Non-finite floats have no JSON form.
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Str(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Payload::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Decode from JSON.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => Self::Str(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Payload::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Payload::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Null
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Payload {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i8> for Payload {
    fn from(i: i8) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u64> for Payload {
    fn from(u: u64) -> Self {
        i64::try_from(u).map(Self::Int).unwrap_or(Self::Float(u as f64))
    }
}

impl From<usize> for Payload {
    fn from(u: usize) -> Self {
        Self::from(u as u64)
    }
}

impl From<f64> for Payload {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<&String> for Payload {
    fn from(s: &String) -> Self {
        Self::Str(s.clone())
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl<T: Into<Payload>> From<Vec<T>> for Payload {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(map: BTreeMap<String, Payload>) -> Self {
        Self::Map(map)
    }
}

impl From<&ReleaseOption> for Payload {
    fn from(option: &ReleaseOption) -> Self {
        Payload::map()
            .with("id", option.id.as_str())
            .with("label", option.label.as_str())
            .with("bias", option.bias)
    }
}

impl From<&ReleaseState> for Payload {
    fn from(state: &ReleaseState) -> Self {
        match state {
            ReleaseState::Idle => Payload::Null,
            ReleaseState::Released { release } => Payload::from(release),
        }
    }
}
