//! Session lifecycle and protocol flow across the store, dispatcher and
//! in-memory agent actor.

use serde_json::{json, Value};
use switchboard_core::types::{AgentIdentity, CallSnapshot, Tier};
use switchboard_gateway::{Phase, RawCommand, RequestEnvelope, SessionHandle};
use switchboard_integration_tests::store;

async fn call(handle: &SessionHandle, function: &str, args: Vec<Value>) -> Value {
    let response = handle
        .request(RequestEnvelope::new(function).with_id(1).with_args(args))
        .await
        .unwrap();
    serde_json::to_value(response).unwrap()
}

async fn poll_json(handle: &SessionHandle) -> Vec<Value> {
    handle
        .poll()
        .await
        .unwrap()
        .iter()
        .map(|pending| pending.to_json())
        .collect()
}

async fn ack_all(handle: &SessionHandle) {
    for pending in handle.poll().await.unwrap() {
        handle.ack(pending.seq).await.unwrap();
    }
}

#[tokio::test]
async fn test_relogin_evicts_previous_session() {
    let (store, _) = store();
    let first = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    let second = store
        .create(AgentIdentity::new("Bob", Tier::Agent))
        .await
        .unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(first.phase(), Phase::Terminated);
    assert_eq!(second.phase(), Phase::Active);
    assert_eq!(store.len(), 1);
    assert_eq!(store.find_by_login("bob").unwrap().id(), second.id());
    assert!(first.request(RequestEnvelope::new("ping")).await.is_err());

    let pong = call(&second, "ping", vec![]).await;
    assert_eq!(pong["result"]["pong"], true);
}

#[tokio::test]
async fn test_unacked_event_redelivered_with_same_seq() {
    let (store, manager) = store();
    let handle = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    ack_all(&handle).await;

    let agent = manager.agent("bob").unwrap();
    assert!(agent.emit(RawCommand::new("mediaload").field("url", "https://crm.example/42")));

    let first = poll_json(&handle).await;
    let second = poll_json(&handle).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
    assert_eq!(first[0]["command"], "mediaload");
    assert_eq!(first[0]["url"], "https://crm.example/42");

    let seq = first[0]["seq"].as_u64().unwrap();
    assert!(handle.ack(seq).await.unwrap());
    assert!(!handle.ack(seq).await.unwrap());
    assert!(poll_json(&handle).await.is_empty());
}

#[tokio::test]
async fn test_events_keep_enqueue_order() {
    let (store, manager) = store();
    let handle = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    let agent = manager.agent("bob").unwrap();
    for command in ["urlpop", "mediaevent", "mediaload"] {
        agent.emit(RawCommand::new(command));
    }

    let events = poll_json(&handle).await;
    let commands: Vec<&str> = events
        .iter()
        .map(|e| e["command"].as_str().unwrap())
        .collect();
    assert_eq!(commands, vec!["arelease", "urlpop", "mediaevent", "mediaload"]);

    let seqs: Vec<u64> = events.iter().map(|e| e["seq"].as_u64().unwrap()).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_supervisor_methods_indistinguishable_from_missing() {
    let (store, _) = store();
    let bob = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    let sue = store
        .create(AgentIdentity::new("sue", Tier::Supervisor))
        .await
        .unwrap();

    let forbidden = call(&bob, "kick_agent", vec![json!("sue")]).await;
    let missing = call(&bob, "no_such_method", vec![json!("sue")]).await;
    assert_eq!(forbidden["success"], false);
    assert_eq!(forbidden["errcode"], missing["errcode"]);
    assert_eq!(forbidden["errcode"], "FUNCTION_NOEXISTS");
    assert_eq!(
        forbidden["message"].as_str().unwrap().replace("kick_agent", "X"),
        missing["message"].as_str().unwrap().replace("no_such_method", "X"),
    );

    let listed = call(&sue, "list_sessions", vec![]).await;
    assert_eq!(listed["result"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_release_and_call_flow() {
    let (store, manager) = store();
    let handle = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    ack_all(&handle).await;

    let response = call(&handle, "set_release", vec![json!("lunch")]).await;
    assert_eq!(response["success"], true);
    let events = poll_json(&handle).await;
    assert_eq!(events[0]["command"], "arelease");
    assert_eq!(events[0]["state"], "released");
    assert_eq!(events[0]["release"]["id"], "lunch");
    ack_all(&handle).await;

    call(&handle, "set_release", vec![json!(false)]).await;
    ack_all(&handle).await;

    let agent = manager.agent("bob").unwrap();
    agent
        .offer_call(CallSnapshot::new("c-1").with_caller("Jane", "5551234"))
        .unwrap();
    let events = poll_json(&handle).await;
    assert_eq!(events[0]["command"], "setchannel");
    assert_eq!(events[0]["state"], "ringing");
    let channel = events[0]["channelid"].clone();
    ack_all(&handle).await;

    assert_eq!(call(&handle, "set_state", vec![channel.clone(), json!("oncall")]).await["success"], true);
    assert_eq!(call(&handle, "hangup", vec![channel.clone()]).await["success"], true);
    assert_eq!(call(&handle, "end_wrapup", vec![channel.clone()]).await["success"], true);

    let commands: Vec<Value> = poll_json(&handle)
        .await
        .into_iter()
        .map(|e| e["command"].clone())
        .collect();
    assert_eq!(commands, vec![json!("setchannel"), json!("setchannel"), json!("endchannel")]);

    let stale = call(&handle, "hangup", vec![channel]).await;
    assert_eq!(stale["errcode"], "CHANNEL_NOEXISTS");
}

#[tokio::test]
async fn test_actor_death_ends_session() {
    let (store, manager) = store();
    let handle = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    ack_all(&handle).await;

    manager.agent("bob").unwrap().kill("switch restarted");
    let events = poll_json(&handle).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["command"], "stopped");
    assert_eq!(events[0]["reason"], "actor_down");

    let refused = call(&handle, "ping", vec![]).await;
    assert_eq!(refused["errcode"], "SESSION_CLOSED");

    handle.ack(events[0]["seq"].as_u64().unwrap()).await.unwrap();
    handle.closed().await;
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_logout_lingers_for_final_poll() {
    let (store, _) = store();
    let handle = store
        .create(AgentIdentity::new("bob", Tier::Agent))
        .await
        .unwrap();
    ack_all(&handle).await;

    let response = call(&handle, "logout", vec![]).await;
    assert_eq!(response["success"], true);

    let events = poll_json(&handle).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["reason"], "logout");
    assert_eq!(handle.phase(), Phase::Terminating);

    handle.closed().await;
    assert_eq!(handle.phase(), Phase::Terminated);
    assert!(store.find_by_login("bob").is_none());
}
