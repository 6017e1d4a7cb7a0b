//! HTTP poll and WebSocket transport.

use crate::actor::InMemoryAgentManager;
use crate::auth::{Authenticator, DirectoryAuthenticator};
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::events::PendingEvent;
use crate::lifecycle::TerminateReason;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::session::{SessionHandle, SessionId};
use crate::store::{SessionSettings, SessionStore};
use crate::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::config::{BindMode, SessionConfig};
use switchboard_core::Config;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 5050;

/// Header naming the session when cookies are unavailable.
const SESSION_HEADER: &str = "x-session-id";

const SESSION_CLOSED: &str = "SESSION_CLOSED";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind mode.
    pub bind: BindMode,

    /// Port number.
    pub port: u16,

    /// Enable CORS.
    pub cors: bool,

    /// Name of the session cookie.
    pub cookie_name: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::Loopback,
            port: DEFAULT_PORT,
            cors: true,
            cookie_name: SessionConfig::default().cookie_name,
        }
    }
}

impl GatewayConfig {
    /// Transport settings from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind: config.server.bind,
            port: config.server.port,
            cors: config.server.cors,
            cookie_name: config.session.cookie_name.clone(),
        }
    }
}

/// Shared transport state.
pub struct GatewayState {
    /// Live sessions.
    pub store: Arc<SessionStore>,

    /// Credential check for `/login`.
    pub auth: Arc<dyn Authenticator>,

    /// Configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Session named by the request, if it is still registered.
    fn session(&self, headers: &HeaderMap, fallback: Option<&str>) -> Result<SessionHandle> {
        let id = session_id(headers, &self.config.cookie_name)
            .or_else(|| fallback.map(SessionId::from))
            .ok_or_else(|| GatewayError::SessionClosed("no session".to_string()))?;
        self.store
            .get(&id)
            .ok_or_else(|| GatewayError::SessionClosed(format!("unknown session {}", id)))
    }
}

/// Pull the session id from the `x-session-id` header or the session cookie.
fn session_id(headers: &HeaderMap, cookie_name: &str) -> Option<SessionId> {
    if let Some(value) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        return Some(SessionId::from(value.trim()));
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| SessionId::from(value))
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ResponseEnvelope::from_error(Value::Null, &self);
        (self.status(), Json(body)).into_response()
    }
}

/// The agent-control server.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway over an existing store and authenticator.
    pub fn new(
        config: GatewayConfig,
        store: Arc<SessionStore>,
        auth: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            state: Arc::new(GatewayState {
                store,
                auth,
                config,
            }),
        }
    }

    /// Create a gateway backed by the in-memory directory and agent manager.
    pub fn from_config(config: &Config) -> Self {
        let manager = InMemoryAgentManager::from_config(config);
        let store = SessionStore::new(
            Arc::new(manager),
            Arc::new(Dispatcher::builtin()),
            SessionSettings::from_config(&config.session),
        );
        let auth = DirectoryAuthenticator::from_config(config);
        if auth.is_empty() {
            warn!("No agent accounts configured; every login will be refused");
        }
        Self::new(GatewayConfig::from_config(config), store, Arc::new(auth))
    }

    /// The session store.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.state.store
    }

    /// Run until Ctrl-C, then end every session.
    pub async fn run(&self) -> Result<()> {
        let addr = self.bind_address();
        if self.state.config.bind != BindMode::Loopback {
            warn!("Listening on {}; the server is reachable from the network", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(GatewayError::Io)?;
        info!("Starting switchboard on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                    std::future::pending::<()>().await;
                }
            })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        info!("Shutting down, ending {} sessions", self.state.store.len());
        self.state.store.shutdown(TerminateReason::Disconnected).await;
        Ok(())
    }

    /// Build the axum router.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/login", post(login_handler))
            .route("/logout", post(logout_handler))
            .route("/api", post(api_handler))
            .route("/poll", get(poll_handler).post(poll_handler))
            .route("/ack/:seq", post(ack_handler))
            .route("/err/:seq", post(err_handler))
            .route("/err/:seq/:message", post(err_message_handler))
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        if self.state.config.cors {
            router = router.layer(cors_layer(self.state.config.bind));
        }

        router
    }

    /// The socket address to listen on.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.state.config.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };
        SocketAddr::from((ip, self.state.config.port))
    }
}

/// CORS with credentials. Loopback binds only admit local origins.
fn cors_layer(bind: BindMode) -> CorsLayer {
    let origins = match bind {
        BindMode::Loopback => AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(is_local_origin)
                .unwrap_or(false)
        }),
        BindMode::Lan => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(SESSION_HEADER)])
        .max_age(Duration::from_secs(3600))
}

fn is_local_origin(origin: &str) -> bool {
    let host = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin);
    let host = host.rsplit_once(':').map(|(h, _)| h).unwrap_or(host);
    matches!(host, "localhost" | "127.0.0.1" | "[::1]")
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    let identity = state
        .auth
        .authenticate(&request.username, &request.password)
        .await?;
    let handle = state.store.create(identity).await?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict",
        state.config.cookie_name,
        handle.id()
    );
    let body = ResponseEnvelope::success(
        Value::Null,
        json!({
            "session": handle.id().as_str(),
            "login": handle.login(),
            "tier": handle.tier().as_str(),
        }),
    );
    Ok(([(header::SET_COOKIE, cookie)], Json(body)).into_response())
}

async fn logout_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Response> {
    let handle = state.session(&headers, None)?;
    handle.terminate(TerminateReason::Logout);

    let cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0",
        state.config.cookie_name
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(ResponseEnvelope::ok(Value::Null)),
    )
        .into_response())
}

async fn api_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(envelope): Json<RequestEnvelope>,
) -> Result<(StatusCode, Json<ResponseEnvelope>)> {
    let handle = state.session(&headers, None)?;
    let response = handle.request(envelope).await?;
    let status = match response.errcode.as_deref() {
        Some(SESSION_CLOSED) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(response)))
}

fn events_json(events: &[PendingEvent]) -> Value {
    Value::Array(events.iter().map(PendingEvent::to_json).collect())
}

async fn poll_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> Result<Json<ResponseEnvelope>> {
    let handle = state.session(&headers, None)?;
    let events = handle.poll().await?;
    debug!("Poll for {} returned {} events", handle.login(), events.len());
    Ok(Json(ResponseEnvelope::success(
        Value::Null,
        events_json(&events),
    )))
}

async fn ack_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(seq): Path<u64>,
) -> Result<Json<ResponseEnvelope>> {
    let handle = state.session(&headers, None)?;
    let removed = handle.ack(seq).await?;
    Ok(Json(ResponseEnvelope::success(Value::Null, json!(removed))))
}

async fn err_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path(seq): Path<u64>,
) -> Result<Json<ResponseEnvelope>> {
    report_error(&state, &headers, seq, None).await
}

async fn err_message_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Path((seq, message)): Path<(u64, String)>,
) -> Result<Json<ResponseEnvelope>> {
    report_error(&state, &headers, seq, Some(message)).await
}

async fn report_error(
    state: &GatewayState,
    headers: &HeaderMap,
    seq: u64,
    message: Option<String>,
) -> Result<Json<ResponseEnvelope>> {
    let handle = state.session(headers, None)?;
    let removed = handle.report_error(seq, message).await?;
    Ok(Json(ResponseEnvelope::success(Value::Null, json!(removed))))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.store.len(),
    }))
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    session: Option<String>,
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<GatewayState>>,
) -> Result<Response> {
    let handle = state.session(&headers, query.session.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, handle)))
}

/// One frame from a WebSocket client.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientFrame {
    Ack {
        ack: u64,
    },
    Nack {
        err: u64,
        #[serde(default)]
        message: Option<String>,
    },
    Request(RequestEnvelope),
}

/// Send one JSON frame. Returns `false` once the socket is unusable; a value
/// that fails to serialize is logged and skipped.
async fn send_json<S>(sender: &mut S, value: &impl serde::Serialize) -> bool
where
    S: Sink<Message> + Unpin,
{
    match serde_json::to_string(value) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            warn!("Dropping unserializable WebSocket frame: {}", e);
            true
        }
    }
}

/// Pump requests in and responses plus pushed events out until either side ends.
async fn handle_socket(socket: WebSocket, handle: SessionHandle) {
    let (mut sender, mut receiver) = socket.split();
    let (backlog, mut pushed) = match handle.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!("WebSocket subscribe failed for {}: {}", handle.id(), e);
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };
    info!("WebSocket attached to session {} ({})", handle.id(), handle.login());

    let mut open = true;
    for pending in &backlog {
        if !send_json(&mut sender, &pending.to_json()).await {
            open = false;
            break;
        }
    }

    while open {
        tokio::select! {
            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(response) = handle_frame(&handle, &text).await {
                        open = send_json(&mut sender, &response).await;
                    }
                }
                Some(Ok(Message::Close(_))) | None => open = false,
                Some(Err(e)) => {
                    warn!("WebSocket error on {}: {}", handle.id(), e);
                    open = false;
                }
                Some(Ok(_)) => {}
            },
            event = pushed.recv() => match event {
                Some(pending) => open = send_json(&mut sender, &pending.to_json()).await,
                None => {
                    debug!("Session {} ended, closing socket", handle.id());
                    let _ = sender.send(Message::Close(None)).await;
                    return;
                }
            },
        }
    }

    info!("WebSocket closed for session {}", handle.id());
    handle.terminate(TerminateReason::Disconnected);
}

async fn handle_frame(handle: &SessionHandle, text: &str) -> Option<ResponseEnvelope> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            return Some(ResponseEnvelope::from_error(
                Value::Null,
                &GatewayError::Json(e),
            ))
        }
    };

    match frame {
        ClientFrame::Ack { ack } => {
            if let Err(e) = handle.ack(ack).await {
                debug!("Ack {} on {} failed: {}", ack, handle.id(), e);
            }
            None
        }
        ClientFrame::Nack { err, message } => {
            if let Err(e) = handle.report_error(err, message).await {
                debug!("Err {} on {} failed: {}", err, handle.id(), e);
            }
            None
        }
        ClientFrame::Request(envelope) => {
            let request_id = envelope.request_id.clone();
            Some(
                handle
                    .request(envelope)
                    .await
                    .unwrap_or_else(|e| ResponseEnvelope::from_error(request_id, &e)),
            )
        }
    }
}
