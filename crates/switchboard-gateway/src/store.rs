//! Session store.
//!
//! The authoritative index of live sessions, by id and by login. Creating a
//! session for a login that already has one evicts the old session and waits
//! for it to finish before the new one is attached to the agent actor.

use crate::actor::{AgentManager, AgentNotifier};
use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::events::ServerEvent;
use crate::lifecycle::{Phase, TerminateReason};
use crate::session::{Session, SessionHandle, SessionId, SessionSummary};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::config::SessionConfig;
use switchboard_core::types::AgentIdentity;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Timing knobs for sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Upper bound on one handler invocation.
    pub dispatch_timeout: Duration,

    /// Upper bound on one call into the agent actor.
    pub actor_timeout: Duration,

    /// How long a terminating session stays pollable.
    pub linger: Duration,

    /// Idle period after which a session without a push subscriber ends.
    pub idle_timeout: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

impl SessionSettings {
    /// Build settings from configuration.
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            dispatch_timeout: Duration::from_millis(config.dispatch_timeout_ms),
            actor_timeout: Duration::from_millis(config.actor_timeout_ms),
            linger: Duration::from_millis(config.linger_ms),
            idle_timeout: (config.idle_timeout_ms > 0)
                .then(|| Duration::from_millis(config.idle_timeout_ms)),
        }
    }
}

#[derive(Default)]
struct StoreIndex {
    by_id: HashMap<SessionId, SessionHandle>,
    by_login: HashMap<String, SessionId>,
    creating: HashMap<String, Arc<Mutex<()>>>,
}

/// Index of live sessions.
pub struct SessionStore {
    index: RwLock<StoreIndex>,
    manager: Arc<dyn AgentManager>,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SessionStore {
    /// Create a store.
    pub fn new(
        manager: Arc<dyn AgentManager>,
        dispatcher: Arc<Dispatcher>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            index: RwLock::new(StoreIndex::default()),
            manager,
            dispatcher,
            settings,
        })
    }

    pub fn manager(&self) -> &Arc<dyn AgentManager> {
        &self.manager
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Create and start a session for an authenticated identity.
    ///
    /// A live session for the same login is terminated first. Fails with
    /// [`GatewayError::DuplicateSession`] if that session does not finish in
    /// time or the agent actor refuses to attach.
    ///
    /// Creations for the same login are serialized; other logins proceed
    /// independently.
    pub async fn create(self: &Arc<Self>, identity: AgentIdentity) -> Result<SessionHandle> {
        let login = identity.login.clone();
        let lock = self.login_lock(&login);
        let created = {
            let _guard = lock.lock().await;
            self.create_exclusive(identity).await
        };
        self.release_login_lock(&login, lock);
        created
    }

    fn login_lock(&self, login: &str) -> Arc<Mutex<()>> {
        self.index
            .write()
            .creating
            .entry(login.to_string())
            .or_default()
            .clone()
    }

    fn release_login_lock(&self, login: &str, lock: Arc<Mutex<()>>) {
        let mut index = self.index.write();
        // Only the index and this caller hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            index.creating.remove(login);
        }
    }

    async fn create_exclusive(self: &Arc<Self>, identity: AgentIdentity) -> Result<SessionHandle> {
        let login = identity.login.clone();

        if let Some(existing) = self.find_by_login(&login) {
            info!("Evicting session {} for {}", existing.id(), login);
            existing.terminate(TerminateReason::Replaced);
            let grace = self.settings.dispatch_timeout + self.settings.actor_timeout;
            if tokio::time::timeout(grace, existing.closed()).await.is_err() {
                warn!("Session {} for {} did not finish in time", existing.id(), login);
                return Err(GatewayError::DuplicateSession(login));
            }
        }

        let actor = match tokio::time::timeout(
            self.settings.actor_timeout,
            self.manager.start_agent(&identity),
        )
        .await
        {
            Ok(actor) => actor?,
            Err(_) => return Err(GatewayError::ActorUnavailable(login)),
        };

        let id = SessionId::generate();
        let (notifier, notices) = AgentNotifier::channel(id.clone());
        let session = Session::new(id.clone(), identity, actor.clone(), self.clone());
        let (tx, mailbox) = mpsc::unbounded_channel();
        let handle = SessionHandle::new(&session, tx);

        match tokio::time::timeout(self.settings.actor_timeout, actor.attach(notifier)).await {
            Ok(attached) => attached?,
            Err(_) => return Err(GatewayError::ActorUnavailable(login)),
        }

        session.lifecycle().advance(Phase::Active);
        {
            let mut index = self.index.write();
            index.by_login.insert(login.clone(), id.clone());
            index.by_id.insert(id.clone(), handle.clone());
        }
        tokio::spawn(session.run(mailbox, notices));

        info!("Session {} started for {} ({})", id, login, handle.tier());
        Ok(handle)
    }

    /// Look up a session by id.
    pub fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        self.index.read().by_id.get(id).cloned()
    }

    /// Look up the session of a login.
    pub fn find_by_login(&self, login: &str) -> Option<SessionHandle> {
        let index = self.index.read();
        let id = index.by_login.get(login)?;
        index.by_id.get(id).cloned()
    }

    /// Summaries of every live session, by login.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = self
            .index
            .read()
            .by_id
            .values()
            .map(SessionHandle::summary)
            .collect();
        summaries.sort_by(|a, b| a.login.cmp(&b.login));
        summaries
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.index.read().by_id.len()
    }

    /// Check if there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Terminate the session of a login. Returns `false` if there is none.
    pub fn kick(&self, login: &str) -> bool {
        match self.find_by_login(login) {
            Some(handle) => {
                info!("Kicking {} (session {})", login, handle.id());
                handle.terminate(TerminateReason::Kicked)
            }
            None => false,
        }
    }

    /// Queue an event in every session matching `filter`.
    ///
    /// Returns how many sessions accepted it.
    pub fn broadcast<F>(&self, filter: F, event: ServerEvent) -> usize
    where
        F: Fn(&SessionHandle) -> bool,
    {
        let targets: Vec<SessionHandle> = self
            .index
            .read()
            .by_id
            .values()
            .filter(|handle| filter(handle))
            .cloned()
            .collect();
        let delivered = targets
            .iter()
            .filter(|handle| handle.notify(event.clone()))
            .count();
        debug!("Broadcast {} to {} sessions", event.command, delivered);
        delivered
    }

    /// Terminate every session and wait for them to finish.
    pub async fn shutdown(&self, reason: TerminateReason) {
        let handles: Vec<SessionHandle> = self.index.read().by_id.values().cloned().collect();
        for handle in &handles {
            handle.terminate(reason);
        }
        let grace = self.settings.linger + self.settings.actor_timeout;
        for handle in &handles {
            if tokio::time::timeout(grace, handle.closed()).await.is_err() {
                warn!("Session {} did not finish during shutdown", handle.id());
            }
        }
    }

    /// Drop a finished session from the index.
    pub(crate) fn remove(&self, id: &SessionId, login: &str) {
        let mut index = self.index.write();
        index.by_id.remove(id);
        if index.by_login.get(login) == Some(id) {
            index.by_login.remove(login);
        }
    }
}
