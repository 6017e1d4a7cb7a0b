//! WebSocket transport over a real listener.

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use switchboard_core::types::{AgentIdentity, Tier};
use switchboard_gateway::{Gateway, Phase, ServerEvent, SessionHandle};
use switchboard_integration_tests::config;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(gateway: &Gateway) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = gateway.router();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    addr
}

async fn start(gateway: &Gateway, login: &str) -> SessionHandle {
    gateway
        .store()
        .create(AgentIdentity::new(login, Tier::Agent))
        .await
        .unwrap()
}

async fn connect(addr: SocketAddr, handle: &SessionHandle) -> Socket {
    let url = format!("ws://{}/ws?session={}", addr, handle.id().as_str());
    let (socket, _) = connect_async(url.as_str()).await.unwrap();
    socket
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("no frame within 2s")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_backlog_acks_and_pushed_events() {
    let gateway = Gateway::from_config(&config());
    let addr = serve(&gateway).await;
    let handle = start(&gateway, "alice").await;
    assert!(handle.notify(ServerEvent::new("urlpop").field("url", "http://crm/42")));

    let mut socket = connect(addr, &handle).await;
    let first = next_json(&mut socket).await;
    assert_eq!(first["command"], "arelease");
    assert_eq!(first["seq"], 1);
    let second = next_json(&mut socket).await;
    assert_eq!(second["command"], "urlpop");
    assert_eq!(second["seq"], 2);
    assert_eq!(second["url"], "http://crm/42");

    send_json(&mut socket, json!({"ack": 1})).await;
    send_json(&mut socket, json!({"err": 2, "message": "popup blocked"})).await;
    send_json(&mut socket, json!({"request_id": 7, "function": "ping"})).await;
    let response = next_json(&mut socket).await;
    assert_eq!(response["request_id"], 7);
    assert_eq!(response["success"], true);

    // Frames are handled in order, so both events are gone by now.
    assert!(handle.poll().await.unwrap().is_empty());

    assert!(handle.notify(ServerEvent::new("blab").field("text", "hello")));
    let pushed = next_json(&mut socket).await;
    assert_eq!(pushed["command"], "blab");
    assert_eq!(pushed["seq"], 3);
    assert_eq!(pushed["text"], "hello");
}

#[tokio::test]
async fn test_bad_frame_gets_error_response() {
    let gateway = Gateway::from_config(&config());
    let addr = serve(&gateway).await;
    let handle = start(&gateway, "bob").await;
    let mut socket = connect(addr, &handle).await;
    assert_eq!(next_json(&mut socket).await["command"], "arelease");

    socket
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let response = next_json(&mut socket).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["errcode"], "BAD_ARGUMENTS");
    assert_eq!(handle.phase(), Phase::Active);
}

#[tokio::test]
async fn test_closing_socket_ends_session() {
    let gateway = Gateway::from_config(&config());
    let addr = serve(&gateway).await;
    let handle = start(&gateway, "alice").await;
    let mut socket = connect(addr, &handle).await;
    assert_eq!(next_json(&mut socket).await["command"], "arelease");

    socket.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle.closed())
        .await
        .unwrap();
    assert_eq!(handle.phase(), Phase::Terminated);
    assert!(gateway.store().find_by_login("alice").is_none());
}

#[tokio::test]
async fn test_unknown_session_is_refused() {
    let gateway = Gateway::from_config(&config());
    let addr = serve(&gateway).await;
    let url = format!("ws://{}/ws?session=nope", addr);
    assert!(connect_async(url.as_str()).await.is_err());
}
