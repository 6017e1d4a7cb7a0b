//! Supervisor-tier handlers.
//!
//! These only resolve for sessions whose tier is `supervisor`. For anyone
//! else they do not exist.

use super::{arg, arg_str, parse_release};
use crate::error::GatewayError;
use crate::events::ServerEvent;
use crate::methods::{CapabilitySet, HandlerFuture, Reply};
use crate::protocol::Args;
use crate::session::{Session, SessionHandle};
use futures::FutureExt;
use serde_json::json;
use switchboard_core::id::normalize_login;
use tracing::info;

/// Methods reserved for supervisors.
pub fn capabilities() -> CapabilitySet {
    CapabilitySet::new()
        .with("list_sessions", 1, list_sessions)
        .with("kick_agent", 2, kick_agent)
        .with("set_agent_release", 3, set_agent_release)
        .with("blab", 2, blab)
        .with("blab", 3, blab)
}

fn list_sessions(session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async move {
        let sessions = session.store().list();
        Ok(Reply::value(serde_json::to_value(sessions)?))
    }
    .boxed()
}

fn kick_agent(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let login = normalize_login(arg_str(&args, 0)?);
        if !session.store().kick(&login) {
            return Err(GatewayError::AgentNotFound(login));
        }
        info!("{} kicked {}", session.login(), login);
        Ok(Reply::Ok)
    }
    .boxed()
}

fn set_agent_release(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let login = normalize_login(arg_str(&args, 0)?);
        let manager = session.manager().clone();
        let actor = manager
            .find_agent(&login)
            .await
            .ok_or_else(|| GatewayError::AgentNotFound(login.clone()))?;
        let state = parse_release(arg(&args, 1)?, &manager.release_options())?;
        session.bounded(actor.set_release(state)).await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

/// Which sessions a broadcast reaches.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Audience {
    All,
    Agent(String),
    Profile(String),
}

impl Audience {
    fn parse(target: &str) -> crate::Result<Self> {
        match target.split_once(':') {
            None if target == "all" => Ok(Self::All),
            Some(("agent", login)) if !login.is_empty() => Ok(Self::Agent(normalize_login(login))),
            Some(("profile", name)) if !name.is_empty() => Ok(Self::Profile(name.to_string())),
            _ => Err(GatewayError::BadArguments(format!(
                "unknown blab target {}",
                target
            ))),
        }
    }

    fn includes(&self, handle: &SessionHandle) -> bool {
        match self {
            Self::All => true,
            Self::Agent(login) => handle.login() == login.as_str(),
            Self::Profile(name) => handle.identity().profile.as_deref() == Some(name.as_str()),
        }
    }
}

/// `blab(message)` reaches every session; `blab(message, target)` narrows it.
fn blab(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let text = arg_str(&args, 0)?;
        let audience = if args.len() > 1 {
            Audience::parse(arg_str(&args, 1)?)?
        } else {
            Audience::All
        };

        let event = ServerEvent::new("blab")
            .field("text", text)
            .field("from", session.login());
        let delivered = session
            .store()
            .broadcast(|handle| audience.includes(handle), event);
        Ok(Reply::value(json!({ "delivered": delivered })))
    }
    .boxed()
}
