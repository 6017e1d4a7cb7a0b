//! Built-in request handlers.
//!
//! Handlers are plain functions registered in the capability table under a
//! name and arity. Arguments arrive positionally, after the session.

pub mod agent;
pub mod supervisor;

use crate::channels::ChannelId;
use crate::error::GatewayError;
use crate::methods::CapabilityTable;
use crate::payload::Payload;
use crate::protocol::Args;
use crate::session::Session;
use crate::Result;
use switchboard_core::types::{ChannelHandle, ReleaseOption, ReleaseState};

/// The built-in capability table.
pub fn builtin_table() -> CapabilityTable {
    CapabilityTable::new(agent::capabilities(), supervisor::capabilities())
}

/// Positional argument, or `BadArguments`.
pub(crate) fn arg(args: &Args, index: usize) -> Result<&serde_json::Value> {
    args.get(index)
        .ok_or_else(|| GatewayError::BadArguments(format!("missing argument {}", index + 1)))
}

/// Positional string argument.
pub(crate) fn arg_str(args: &Args, index: usize) -> Result<&str> {
    let value = arg(args, index)?;
    value.as_str().ok_or_else(|| {
        GatewayError::BadArguments(format!(
            "argument {} must be a string, got {}",
            index + 1,
            value
        ))
    })
}

/// Positional channel id, resolved against the session's registry.
pub(crate) fn arg_channel(
    session: &Session,
    args: &Args,
    index: usize,
) -> Result<(ChannelId, ChannelHandle)> {
    let id = ChannelId::from_arg(arg(args, index)?)?;
    let binding = session.channels().resolve(id)?;
    Ok((id, binding.handle.clone()))
}

/// Positional list argument. A scalar counts as a one-element list.
pub(crate) fn arg_list(args: &Args, index: usize) -> Result<Vec<Payload>> {
    Ok(match arg(args, index)? {
        serde_json::Value::Array(items) => items.iter().map(Payload::from_json).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![Payload::from_json(other)],
    })
}

/// The configured `default` release, or the built-in one.
fn default_release(options: &[ReleaseOption]) -> ReleaseOption {
    options
        .iter()
        .find(|option| option.id == "default")
        .cloned()
        .unwrap_or_else(ReleaseOption::default_release)
}

/// Interpret a release argument.
///
/// `false`, `null`, `"none"` and `"idle"` mean available; `true` and
/// `"default"` mean released for the default reason; any other string names a
/// configured release option.
pub(crate) fn parse_release(
    value: &serde_json::Value,
    options: &[ReleaseOption],
) -> Result<ReleaseState> {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(false) => Ok(ReleaseState::Idle),
        serde_json::Value::Bool(true) => Ok(ReleaseState::Released {
            release: default_release(options),
        }),
        serde_json::Value::String(s) => match s.as_str() {
            "none" | "idle" => Ok(ReleaseState::Idle),
            "default" => Ok(ReleaseState::Released {
                release: default_release(options),
            }),
            id => options
                .iter()
                .find(|option| option.id == id)
                .cloned()
                .map(|release| ReleaseState::Released { release })
                .ok_or_else(|| GatewayError::BadArguments(format!("unknown release {}", id))),
        },
        other => Err(GatewayError::BadArguments(format!(
            "invalid release {}",
            other
        ))),
    }
}
