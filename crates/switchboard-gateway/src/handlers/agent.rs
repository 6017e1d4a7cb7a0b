//! Agent-tier handlers.

use super::{arg, arg_channel, arg_list, arg_str, parse_release};
use crate::error::GatewayError;
use crate::methods::{CapabilitySet, HandlerFuture, Reply};
use crate::protocol::Args;
use crate::session::Session;
use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use switchboard_core::id::normalize_login;
use switchboard_core::types::ChannelPhase;

/// Methods every session may call.
pub fn capabilities() -> CapabilitySet {
    CapabilitySet::new()
        .with("ping", 1, ping)
        .with("logout", 1, logout)
        .with("set_release", 2, set_release)
        .with("get_release_opts", 1, get_release_opts)
        .with("list_channels", 1, list_channels)
        .with("get_channel", 2, get_channel)
        .with("set_state", 3, set_state)
        .with("hangup", 2, hangup)
        .with("end_wrapup", 2, end_wrapup)
        .with("queue_transfer", 3, queue_transfer)
        .with("agent_transfer", 3, agent_transfer)
        .with("get_queue_transfer_options", 2, get_queue_transfer_options)
        .with("get_avail_agents", 1, get_avail_agents)
        .with("media_command", 3, media_command)
        .with("media_command", 4, media_command)
}

fn ping(session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async move {
        Ok(Reply::value(json!({
            "pong": true,
            "login": session.login(),
            "timestamp": Utc::now().to_rfc3339(),
        })))
    }
    .boxed()
}

fn logout(_session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async { Ok(Reply::Terminate) }.boxed()
}

fn set_release(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let options = session.manager().release_options();
        let state = parse_release(arg(&args, 0)?, &options)?;
        session.bounded(session.actor().set_release(state)).await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn get_release_opts(session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async move {
        let options = session.manager().release_options();
        Ok(Reply::value(serde_json::to_value(options)?))
    }
    .boxed()
}

fn list_channels(session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async move {
        let channels: Vec<serde_json::Value> = session
            .channels()
            .iter()
            .map(|binding| binding.to_payload().to_json())
            .collect();
        Ok(Reply::value(channels))
    }
    .boxed()
}

fn get_channel(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (id, _) = arg_channel(session, &args, 0)?;
        let binding = session.channels().resolve(id)?;
        Ok(Reply::Value(binding.to_payload().to_json()))
    }
    .boxed()
}

fn set_state(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        let phase: ChannelPhase = arg_str(&args, 1)?
            .parse()
            .map_err(GatewayError::BadArguments)?;
        session
            .bounded(session.actor().set_channel_state(&handle, phase))
            .await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn hangup(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        session.bounded(session.actor().hangup(&handle)).await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn end_wrapup(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        session.bounded(session.actor().end_wrapup(&handle)).await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn queue_transfer(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        let queue = arg_str(&args, 1)?;
        session
            .bounded(session.actor().queue_transfer(&handle, queue))
            .await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn agent_transfer(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        let login = normalize_login(arg_str(&args, 1)?);
        session
            .bounded(session.actor().agent_transfer(&handle, &login))
            .await?;
        Ok(Reply::Ok)
    }
    .boxed()
}

fn get_queue_transfer_options(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (id, _) = arg_channel(session, &args, 0)?;
        Ok(Reply::value(json!({
            "channelid": id.get(),
            "queues": session.manager().queues(),
            "skills": session.identity().skills,
        })))
    }
    .boxed()
}

fn get_avail_agents(session: &mut Session, _args: Args) -> HandlerFuture<'_> {
    async move {
        let agents: Vec<_> = session
            .manager()
            .available_agents()
            .await
            .into_iter()
            .filter(|agent| agent.login != session.login())
            .collect();
        Ok(Reply::value(serde_json::to_value(agents)?))
    }
    .boxed()
}

/// `media_command(channel, command)` and `media_command(channel, command, args)`.
fn media_command(session: &mut Session, args: Args) -> HandlerFuture<'_> {
    async move {
        let (_, handle) = arg_channel(session, &args, 0)?;
        let command = arg_str(&args, 1)?;
        let extra = if args.len() > 2 {
            arg_list(&args, 2)?
        } else {
            Vec::new()
        };
        let result = session
            .bounded(session.actor().media_command(&handle, command, extra))
            .await?;
        Ok(Reply::Value(result.to_json()))
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use crate::actor::{AgentActor, AgentManager};
    use crate::dispatch::Dispatcher;
    use crate::events::ServerEvent;
    use crate::payload::Payload;
    use crate::protocol::{RequestEnvelope, ResponseEnvelope};
    use crate::session::testing::{self, Fixture};
    use serde_json::{json, Value};
    use switchboard_core::types::{AgentIdentity, CallSnapshot, ChannelHandle, Tier};

    async fn call(fixture: &mut Fixture, function: &str, args: Vec<Value>) -> ResponseEnvelope {
        let (response, _) = Dispatcher::builtin()
            .dispatch(
                &mut fixture.session,
                RequestEnvelope::new(function).with_id(1).with_args(args),
            )
            .await;
        fixture.pump();
        response
    }

    fn last_event(fixture: &mut Fixture) -> ServerEvent {
        fixture
            .session
            .events_mut()
            .drain()
            .pop()
            .map(|pending| pending.event)
            .unwrap()
    }

    async fn ringing(fixture: &mut Fixture) -> (u64, ChannelHandle) {
        let handle = fixture
            .agent
            .offer_call(CallSnapshot::new("call-1").with_caller("Jane", "5551234"))
            .unwrap();
        fixture.pump();
        let id = fixture.session.channels().public_id(&handle).unwrap();
        (id.get(), handle)
    }

    #[tokio::test]
    async fn test_set_release_single_argument() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let response = call(&mut fixture, "set_release", vec![json!("lunch")]).await;
        assert!(response.success);

        let event = last_event(&mut fixture);
        assert_eq!(event.command, "arelease");
        assert_eq!(event.fields["state"], Payload::from("released"));

        let response = call(&mut fixture, "set_release", vec![json!(false)]).await;
        assert!(response.success);
        assert_eq!(last_event(&mut fixture).fields["state"], Payload::from("idle"));
    }

    #[tokio::test]
    async fn test_set_release_unknown_reason() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let response = call(&mut fixture, "set_release", vec![json!("vacation")]).await;
        assert_eq!(response.errcode.as_deref(), Some("BAD_ARGUMENTS"));
    }

    #[tokio::test]
    async fn test_get_release_opts() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let response = call(&mut fixture, "get_release_opts", vec![]).await;
        let ids: Vec<&str> = response.result.as_ref().unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["default", "lunch"]);
    }

    #[tokio::test]
    async fn test_call_lifecycle_through_handlers() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let (id, handle) = ringing(&mut fixture).await;

        let response = call(&mut fixture, "get_channel", vec![json!(id)]).await;
        let result = response.result.unwrap();
        assert_eq!(result["state"], "ringing");
        assert_eq!(result["statedata"]["callerid"]["name"], "Jane");

        assert!(call(&mut fixture, "set_state", vec![json!(id), json!("oncall")]).await.success);
        assert_eq!(last_event(&mut fixture).fields["state"], Payload::from("oncall"));

        assert!(call(&mut fixture, "hangup", vec![json!(id)]).await.success);
        assert_eq!(last_event(&mut fixture).fields["state"], Payload::from("wrapup"));

        assert!(call(&mut fixture, "end_wrapup", vec![json!(id)]).await.success);
        assert_eq!(last_event(&mut fixture).command, "endchannel");
        assert!(fixture.agent.channel_phase(&handle).is_none());

        let response = call(&mut fixture, "list_channels", vec![]).await;
        assert_eq!(response.result, Some(json!([])));
    }

    #[tokio::test]
    async fn test_unknown_channel_id() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let response = call(&mut fixture, "hangup", vec![json!(42)]).await;
        assert_eq!(response.errcode.as_deref(), Some("CHANNEL_NOEXISTS"));
    }

    #[tokio::test]
    async fn test_set_state_errors() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let (id, _) = ringing(&mut fixture).await;

        let response = call(&mut fixture, "set_state", vec![json!(id), json!("dancing")]).await;
        assert_eq!(response.errcode.as_deref(), Some("BAD_ARGUMENTS"));

        let response = call(&mut fixture, "set_state", vec![json!(id), json!("wrapup")]).await;
        assert_eq!(response.errcode.as_deref(), Some("INVALID_STATE_CHANGE"));
    }

    #[tokio::test]
    async fn test_transfers() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        fixture
            .manager
            .start_agent(&AgentIdentity::new("alice", Tier::Agent))
            .await
            .unwrap();

        let (id, _) = ringing(&mut fixture).await;
        call(&mut fixture, "set_state", vec![json!(id), json!("oncall")]).await;

        let options = call(&mut fixture, "get_queue_transfer_options", vec![json!(id)]).await;
        assert_eq!(options.result.unwrap()["queues"], json!(["support", "sales"]));

        let agents = call(&mut fixture, "get_avail_agents", vec![]).await;
        let agents = agents.result.unwrap();
        assert_eq!(agents.as_array().unwrap().len(), 1);
        assert_eq!(agents[0]["login"], "alice");

        let response = call(&mut fixture, "agent_transfer", vec![json!(id), json!("Alice")]).await;
        assert!(response.success);
        assert_eq!(last_event(&mut fixture).command, "endchannel");
        assert_eq!(fixture.manager.agent("alice").unwrap().summary().channels, 1);

        let (id, _) = ringing(&mut fixture).await;
        call(&mut fixture, "set_state", vec![json!(id), json!("oncall")]).await;
        let response = call(&mut fixture, "queue_transfer", vec![json!(id), json!("sales")]).await;
        assert!(response.success);
        assert!(fixture.session.channels().is_empty());
    }

    #[tokio::test]
    async fn test_media_command_arities() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let (id, _) = ringing(&mut fixture).await;

        let response = call(&mut fixture, "media_command", vec![json!(id), json!("mute")]).await;
        assert_eq!(response.result.unwrap()["args"], json!([]));

        let response = call(
            &mut fixture,
            "media_command",
            vec![json!(id), json!("dtmf"), json!(["1", "2"])],
        )
        .await;
        let result = response.result.unwrap();
        assert_eq!(result["command"], "dtmf");
        assert_eq!(result["args"], json!(["1", "2"]));
        assert_eq!(result["type"], "voice");
    }

    #[tokio::test]
    async fn test_logout_terminates() {
        let mut fixture = testing::active("bob", Tier::Agent).await;
        let (response, outcome) = Dispatcher::builtin()
            .dispatch(&mut fixture.session, RequestEnvelope::new("logout"))
            .await;
        assert!(response.success);
        assert_eq!(
            outcome,
            crate::dispatch::Outcome::Terminate(crate::lifecycle::TerminateReason::Logout)
        );
    }
}
