//! Sessions.
//!
//! A [`Session`] is the state of one logged-in client: who it is, the agent
//! actor it drives, its channel registry and its event queue. Each session is
//! owned by a single tokio task. Everything else (transports, the store,
//! supervisors in other sessions) reaches it through a cloneable
//! [`SessionHandle`] that posts commands into the task's mailbox, so requests,
//! polls, acks and actor notices for one session are processed one at a time.

use crate::actor::{ActorResult, AgentActor, AgentManager, AgentNotice};
use crate::channels::{call_payload, ChannelBinding, ChannelRegistry};
use crate::error::GatewayError;
use crate::events::{EventQueue, PendingEvent, ServerEvent};
use crate::lifecycle::{wait_terminated, Lifecycle, Phase, TerminateReason};
use crate::payload::Payload;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::store::{SessionSettings, SessionStore};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use switchboard_core::types::{AgentIdentity, ReleaseState, Tier};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        Self(switchboard_core::id::uuid())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Supervisor-facing description of a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: SessionId,
    pub login: String,
    pub tier: Tier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
}

/// Work posted into a session's mailbox.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Request {
        envelope: RequestEnvelope,
        reply: oneshot::Sender<ResponseEnvelope>,
    },
    Poll {
        reply: oneshot::Sender<Vec<PendingEvent>>,
    },
    Ack {
        seq: u64,
        reply: oneshot::Sender<bool>,
    },
    ReportError {
        seq: u64,
        message: Option<String>,
        reply: oneshot::Sender<bool>,
    },
    Subscribe {
        push: mpsc::UnboundedSender<PendingEvent>,
        reply: oneshot::Sender<Vec<PendingEvent>>,
    },
    Notify(ServerEvent),
    Terminate(TerminateReason),
}

impl SessionCommand {
    /// Whether this command counts as client activity for the idle timer.
    fn is_client_activity(&self) -> bool {
        !matches!(self, Self::Notify(_) | Self::Terminate(_))
    }
}

/// State of one logged-in client.
pub struct Session {
    id: SessionId,
    identity: AgentIdentity,
    actor: Arc<dyn AgentActor>,
    channels: ChannelRegistry,
    events: EventQueue,
    lifecycle: Lifecycle,
    store: Arc<SessionStore>,
    push: Option<mpsc::UnboundedSender<PendingEvent>>,
    linger_until: Option<Instant>,
    created_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("login", &self.identity.login)
            .field("tier", &self.identity.tier)
            .field("phase", &self.phase())
            .field("channels", &self.channels.len())
            .field("pending", &self.events.len())
            .finish()
    }
}

impl Session {
    /// Create a session in `Initializing`.
    pub(crate) fn new(
        id: SessionId,
        identity: AgentIdentity,
        actor: Arc<dyn AgentActor>,
        store: Arc<SessionStore>,
    ) -> Self {
        Self {
            id,
            identity,
            actor,
            channels: ChannelRegistry::new(),
            events: EventQueue::new(),
            lifecycle: Lifecycle::new(),
            store,
            push: None,
            linger_until: None,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn login(&self) -> &str {
        &self.identity.login
    }

    pub fn tier(&self) -> Tier {
        self.identity.tier
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    /// The agent actor this session drives.
    pub fn actor(&self) -> &Arc<dyn AgentActor> {
        &self.actor
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    pub fn channels_mut(&mut self) -> &mut ChannelRegistry {
        &mut self.channels
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Store this session is registered in.
    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<dyn AgentManager> {
        self.store.manager()
    }

    pub fn settings(&self) -> &SessionSettings {
        self.store.settings()
    }

    /// Queue an event for the client, pushing it at once when a push
    /// subscriber is attached.
    pub fn enqueue(&mut self, event: ServerEvent) -> u64 {
        let seq = self.events.enqueue(event);
        let mut subscriber_gone = false;
        if let Some(ref push) = self.push {
            if let Some(pending) = self.events.deliver(seq) {
                subscriber_gone = push.send(pending).is_err();
            }
        }
        if subscriber_gone {
            debug!("Push subscriber for session {} went away", self.id);
            self.push = None;
        }
        seq
    }

    /// Run an actor call under the actor timeout.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = ActorResult<T>>,
    {
        match tokio::time::timeout(self.settings().actor_timeout, call).await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(_) => Err(GatewayError::HandlerFault(format!(
                "agent {} did not answer within {:?}",
                self.identity.login,
                self.settings().actor_timeout
            ))),
        }
    }

    pub(crate) fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub(crate) fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Translate an actor notice into client events.
    pub(crate) fn apply_notice(&mut self, notice: AgentNotice) {
        match notice {
            AgentNotice::ReleaseChanged(state) => {
                let label = match state {
                    ReleaseState::Idle => "idle",
                    ReleaseState::Released { .. } => "released",
                };
                self.enqueue(
                    ServerEvent::new("arelease")
                        .field("state", label)
                        .field("release", Payload::from(&state)),
                );
            }
            AgentNotice::ChannelOpened {
                handle,
                phase,
                call,
            } => {
                let id = self.channels.bind_call(handle, phase, call);
                if let Ok(binding) = self.channels.resolve(id) {
                    let event = channel_event(binding);
                    self.enqueue(event);
                }
            }
            AgentNotice::ChannelState { handle, phase } => {
                let Some(id) = self.channels.set_phase(&handle, phase) else {
                    debug!("State change for unbound channel {} ignored", handle);
                    return;
                };
                if let Ok(binding) = self.channels.resolve(id) {
                    let event = channel_event(binding);
                    self.enqueue(event);
                }
            }
            AgentNotice::ChannelEnded { handle } => {
                if let Some(id) = self.channels.unbind(&handle) {
                    self.enqueue(ServerEvent::new("endchannel").channel(id));
                }
            }
            AgentNotice::Command(raw) => {
                let command = raw.command.clone();
                match ServerEvent::shape(raw, &self.channels) {
                    Some(event) => {
                        self.enqueue(event);
                    }
                    None => debug!("Dropped {} for a channel this session never saw", command),
                }
            }
            AgentNotice::Stopped { reason } => {
                warn!("Agent {} stopped: {}", self.identity.login, reason);
                self.begin_terminate(TerminateReason::ActorDown);
            }
        }
    }

    /// Move to `Terminating` and queue the final `stopped` event.
    pub(crate) fn begin_terminate(&mut self, reason: TerminateReason) {
        if self.phase() >= Phase::Terminating {
            if !reason.lingers() {
                self.linger_until = None;
            }
            return;
        }

        info!(
            "Session {} ({}) terminating: {}",
            self.id, self.identity.login, reason
        );
        self.enqueue(ServerEvent::new("stopped").field("reason", reason.as_str()));
        self.lifecycle.advance(Phase::Terminating);

        let linger = self.settings().linger;
        self.linger_until = if reason.lingers() && !linger.is_zero() {
            Some(Instant::now() + linger)
        } else {
            None
        };
    }

    /// Whether the task should stop serving and finish.
    fn done(&self) -> bool {
        match self.phase() {
            Phase::Initializing | Phase::Active => false,
            Phase::Terminating => self.linger_until.is_none() || self.events.is_empty(),
            Phase::Terminated => true,
        }
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Request { envelope, reply } => {
                let response = if self.phase() >= Phase::Terminating {
                    ResponseEnvelope::from_error(
                        envelope.request_id,
                        &GatewayError::SessionClosed(self.id.to_string()),
                    )
                } else {
                    let dispatcher = self.store.dispatcher().clone();
                    let (response, outcome) = dispatcher.dispatch(self, envelope).await;
                    if let crate::dispatch::Outcome::Terminate(reason) = outcome {
                        self.begin_terminate(reason);
                    }
                    response
                };
                let _ = reply.send(response);
            }
            SessionCommand::Poll { reply } => {
                let _ = reply.send(self.events.drain());
            }
            SessionCommand::Ack { seq, reply } => {
                let _ = reply.send(self.events.acknowledge(seq));
            }
            SessionCommand::ReportError {
                seq,
                message,
                reply,
            } => {
                let _ = reply.send(self.events.report_error(seq, message.as_deref()));
            }
            SessionCommand::Subscribe { push, reply } => {
                debug!("Push subscriber attached to session {}", self.id);
                self.push = Some(push);
                let _ = reply.send(self.events.drain());
            }
            SessionCommand::Notify(event) => {
                self.enqueue(event);
            }
            SessionCommand::Terminate(reason) => self.begin_terminate(reason),
        }
    }

    /// Serve the mailbox and actor notices until the session ends.
    pub(crate) async fn run(
        mut self,
        mut mailbox: mpsc::UnboundedReceiver<SessionCommand>,
        mut notices: mpsc::UnboundedReceiver<AgentNotice>,
    ) {
        let idle_timeout = self.settings().idle_timeout;
        let mut idle_deadline = idle_timeout.map(|timeout| Instant::now() + timeout);
        let mut notices_open = true;

        while !self.done() {
            let idle_at = if self.phase() == Phase::Active && self.push.is_none() {
                idle_deadline
            } else {
                None
            };
            let linger_at = self.linger_until;

            // Notices first, so a poll sees everything the actor already posted.
            tokio::select! {
                biased;

                notice = notices.recv(), if notices_open => match notice {
                    Some(notice) => self.apply_notice(notice),
                    None => {
                        notices_open = false;
                        if self.phase() == Phase::Active {
                            self.begin_terminate(TerminateReason::ActorDown);
                        }
                    }
                },
                command = mailbox.recv() => match command {
                    Some(command) => {
                        if command.is_client_activity() {
                            idle_deadline = idle_timeout.map(|timeout| Instant::now() + timeout);
                        }
                        self.handle_command(command).await;
                    }
                    // Every handle is gone, including the store's.
                    None => self.begin_terminate(TerminateReason::Replaced),
                },
                _ = sleep_until(idle_at) => {
                    self.begin_terminate(TerminateReason::Idle);
                }
                _ = sleep_until(linger_at) => {
                    debug!("Linger period over for session {}", self.id);
                    self.linger_until = None;
                }
            }
        }

        self.finish().await;
    }

    /// Release everything and leave the store.
    async fn finish(mut self) {
        let timeout = self.settings().actor_timeout;
        if tokio::time::timeout(timeout, self.actor.detach(&self.id))
            .await
            .is_err()
        {
            warn!("Detaching session {} from its agent timed out", self.id);
        }

        self.channels.clear();
        self.events.clear();
        self.push = None;
        self.store.remove(&self.id, &self.identity.login);
        self.lifecycle.advance(Phase::Terminated);
        info!("Session {} ({}) terminated", self.id, self.identity.login);
    }
}

fn channel_event(binding: &ChannelBinding) -> ServerEvent {
    ServerEvent::new("setchannel")
        .channel(binding.id)
        .field("state", binding.phase.as_str())
        .field("statedata", call_payload(&binding.call))
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

struct HandleInner {
    id: SessionId,
    identity: AgentIdentity,
    created_at: DateTime<Utc>,
    tx: mpsc::UnboundedSender<SessionCommand>,
    phase: watch::Receiver<Phase>,
}

/// Cloneable reference to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.inner.id)
            .field("login", &self.inner.identity.login)
            .field("phase", &self.phase())
            .finish()
    }
}

impl SessionHandle {
    pub(crate) fn new(session: &Session, tx: mpsc::UnboundedSender<SessionCommand>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: session.id().clone(),
                identity: session.identity().clone(),
                created_at: session.created_at(),
                tx,
                phase: session.lifecycle().subscribe(),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn login(&self) -> &str {
        &self.inner.identity.login
    }

    pub fn tier(&self) -> Tier {
        self.inner.identity.tier
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.inner.identity
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.inner.phase.borrow()
    }

    /// Supervisor-facing summary.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.inner.id.clone(),
            login: self.inner.identity.login.clone(),
            tier: self.inner.identity.tier,
            profile: self.inner.identity.profile.clone(),
            phase: self.phase(),
            created_at: self.inner.created_at,
        }
    }

    fn closed_error(&self) -> GatewayError {
        GatewayError::SessionClosed(self.inner.id.to_string())
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.inner.tx.send(command).map_err(|_| self.closed_error())
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await.map_err(|_| self.closed_error())
    }

    /// Dispatch a request within the session.
    pub async fn request(&self, envelope: RequestEnvelope) -> Result<ResponseEnvelope> {
        self.call(|reply| SessionCommand::Request { envelope, reply })
            .await
    }

    /// Every unacknowledged event, in order.
    pub async fn poll(&self) -> Result<Vec<PendingEvent>> {
        self.call(|reply| SessionCommand::Poll { reply }).await
    }

    /// Acknowledge an event. Returns whether it was still pending.
    pub async fn ack(&self, seq: u64) -> Result<bool> {
        self.call(|reply| SessionCommand::Ack { seq, reply }).await
    }

    /// Report that the client could not apply an event.
    pub async fn report_error(&self, seq: u64, message: Option<String>) -> Result<bool> {
        self.call(|reply| SessionCommand::ReportError {
            seq,
            message,
            reply,
        })
        .await
    }

    /// Attach a push subscriber.
    ///
    /// Returns the events already pending plus a stream of every event queued
    /// from now on. A later subscriber replaces this one.
    pub async fn subscribe(
        &self,
    ) -> Result<(Vec<PendingEvent>, mpsc::UnboundedReceiver<PendingEvent>)> {
        let (push, events) = mpsc::unbounded_channel();
        let backlog = self
            .call(|reply| SessionCommand::Subscribe { push, reply })
            .await?;
        Ok((backlog, events))
    }

    /// Queue an event without waiting. Returns `false` if the session is gone.
    pub fn notify(&self, event: ServerEvent) -> bool {
        self.send(SessionCommand::Notify(event)).is_ok()
    }

    /// Ask the session to end. Takes effect after any request in flight.
    pub fn terminate(&self, reason: TerminateReason) -> bool {
        self.send(SessionCommand::Terminate(reason)).is_ok()
    }

    /// Wait until the session has fully terminated.
    pub async fn closed(&self) {
        let mut phase = self.inner.phase.clone();
        wait_terminated(&mut phase).await;
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures for building sessions outside the store.

    use super::*;
    use crate::actor::{AgentNotifier, InMemoryAgent, InMemoryAgentManager};
    use crate::dispatch::Dispatcher;
    use switchboard_core::types::ReleaseOption;

    pub(crate) struct Fixture {
        pub session: Session,
        pub agent: Arc<InMemoryAgent>,
        pub manager: InMemoryAgentManager,
        pub notices: mpsc::UnboundedReceiver<AgentNotice>,
    }

    impl Fixture {
        /// Apply every notice the actor has posted so far.
        pub fn pump(&mut self) {
            while let Ok(notice) = self.notices.try_recv() {
                self.session.apply_notice(notice);
            }
        }
    }

    pub(crate) fn manager() -> InMemoryAgentManager {
        InMemoryAgentManager::new(
            vec![
                ReleaseOption::default_release(),
                ReleaseOption::new("lunch", "Lunch", 0),
            ],
            vec!["support".to_string(), "sales".to_string()],
        )
    }

    /// An attached, active session for `login`.
    pub(crate) async fn active(login: &str, tier: Tier) -> Fixture {
        let manager = manager();
        let store = SessionStore::new(
            Arc::new(manager.clone()),
            Arc::new(Dispatcher::builtin()),
            SessionSettings::default(),
        );
        attached(store, manager, login, tier).await
    }

    /// An attached, active session for `login` registered against `store`.
    pub(crate) async fn attached(
        store: Arc<SessionStore>,
        manager: InMemoryAgentManager,
        login: &str,
        tier: Tier,
    ) -> Fixture {
        let identity = AgentIdentity::new(login, tier);
        let actor = manager.start_agent(&identity).await.unwrap();
        let agent = manager.agent(&identity.login).unwrap();

        let id = SessionId::generate();
        let (notifier, notices) = AgentNotifier::channel(id.clone());
        actor.attach(notifier).await.unwrap();

        let session = Session::new(id, identity, actor, store);
        session.lifecycle().advance(Phase::Active);

        let mut fixture = Fixture {
            session,
            agent,
            manager,
            notices,
        };
        fixture.pump();
        fixture
    }
}
