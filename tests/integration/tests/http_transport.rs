//! HTTP transport driven through the axum router.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use switchboard_gateway::Gateway;
use switchboard_integration_tests::{config, PASSWORD};
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    cookie: Option<String>,
    body: Value,
}

async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        cookie,
        body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
    }
}

fn post(uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Log in and return the `name=value` part of the session cookie.
async fn login(router: &Router, username: &str) -> String {
    let reply = send(
        router,
        post(
            "/login",
            None,
            json!({"username": username, "password": PASSWORD}),
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK, "login failed: {}", reply.body);
    let cookie = reply.cookie.unwrap();
    cookie.split(';').next().unwrap().to_string()
}

async fn poll(router: &Router, cookie: &str) -> Reply {
    send(router, post("/poll", Some(cookie), json!({}))).await
}

async fn ack_all(router: &Router, cookie: &str) {
    let reply = poll(router, cookie).await;
    for event in reply.body["result"].as_array().unwrap() {
        let uri = format!("/ack/{}", event["seq"]);
        send(router, post(&uri, Some(cookie), json!({}))).await;
    }
}

#[tokio::test]
async fn test_cookie_session_flow() {
    let router = Gateway::from_config(&config()).router();
    let cookie = login(&router, "alice").await;
    assert!(cookie.starts_with("switchboard_session="));

    let reply = poll(&router, &cookie).await;
    assert_eq!(reply.body["success"], true);
    assert_eq!(reply.body["result"][0]["command"], "arelease");
    ack_all(&router, &cookie).await;

    let reply = send(
        &router,
        post(
            "/api",
            Some(&cookie),
            json!({"request_id": "r1", "function": "get_release_opts"}),
        ),
    )
    .await;
    assert_eq!(reply.body["request_id"], "r1");
    let ids: Vec<&str> = reply.body["result"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["default", "lunch", "meeting"]);

    let reply = send(
        &router,
        post(
            "/api",
            Some(&cookie),
            json!({"request_id": "r2", "module": "builtin", "function": "set_release", "args": ["meeting"]}),
        ),
    )
    .await;
    assert_eq!(reply.body["success"], true);

    let reply = poll(&router, &cookie).await;
    let event = &reply.body["result"][0];
    assert_eq!(event["command"], "arelease");
    assert_eq!(event["release"]["label"], "Meeting");
}

#[tokio::test]
async fn test_relogin_invalidates_old_cookie() {
    let router = Gateway::from_config(&config()).router();
    let old = login(&router, "bob").await;
    let new = login(&router, "BOB").await;
    assert_ne!(old, new);

    let reply = poll(&router, &old).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["errcode"], "SESSION_CLOSED");

    let reply = poll(&router, &new).await;
    assert_eq!(reply.status, StatusCode::OK);
}

#[tokio::test]
async fn test_supervisor_blab_reaches_profile() {
    let gateway = Gateway::from_config(&config());
    let router = gateway.router();
    let alice = login(&router, "alice").await;
    let bob = login(&router, "bob").await;
    let sue = login(&router, "sue").await;
    ack_all(&router, &alice).await;
    ack_all(&router, &bob).await;

    let reply = send(
        &router,
        post(
            "/api",
            Some(&sue),
            json!({"request_id": 1, "function": "blab", "args": ["night shift starts", "profile:night"]}),
        ),
    )
    .await;
    assert_eq!(reply.body["result"]["delivered"], 1);

    assert_eq!(poll(&router, &alice).await.body["result"], json!([]));
    let reply = poll(&router, &bob).await;
    assert_eq!(reply.body["result"][0]["command"], "blab");
    assert_eq!(reply.body["result"][0]["text"], "night shift starts");
    assert_eq!(reply.body["result"][0]["from"], "sue");

    let reply = send(
        &router,
        post(
            "/api",
            Some(&bob),
            json!({"request_id": 2, "function": "blab", "args": ["hi"]}),
        ),
    )
    .await;
    assert_eq!(reply.body["errcode"], "FUNCTION_NOEXISTS");
    assert_eq!(gateway.store().len(), 3);
}

#[tokio::test]
async fn test_err_route_removes_event() {
    let router = Gateway::from_config(&config()).router();
    let cookie = login(&router, "alice").await;
    let reply = poll(&router, &cookie).await;
    let seq = reply.body["result"][0]["seq"].as_u64().unwrap();

    let uri = format!("/err/{}/screen%20pop%20failed", seq);
    let reply = send(&router, post(&uri, Some(&cookie), json!({}))).await;
    assert_eq!(reply.body["result"], true);

    let uri = format!("/err/{}", seq);
    let reply = send(&router, post(&uri, Some(&cookie), json!({}))).await;
    assert_eq!(reply.body["result"], false);
}

#[tokio::test]
async fn test_logout_route() {
    let router = Gateway::from_config(&config()).router();
    let cookie = login(&router, "alice").await;
    ack_all(&router, &cookie).await;

    let reply = send(&router, post("/logout", Some(&cookie), json!({}))).await;
    assert_eq!(reply.status, StatusCode::OK);

    let reply = poll(&router, &cookie).await;
    assert_eq!(reply.body["result"][0]["command"], "stopped");
    assert_eq!(reply.body["result"][0]["reason"], "logout");
}
