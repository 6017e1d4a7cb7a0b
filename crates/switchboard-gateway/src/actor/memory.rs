//! In-process agent actors.
//!
//! Used by the standalone server and by tests. Call arrival, plugin output and
//! actor death are driven through the simulation methods on [`InMemoryAgent`].

use super::{ActorError, ActorResult, AgentActor, AgentManager, AgentNotice, AgentNotifier};
use crate::events::RawCommand;
use crate::payload::Payload;
use crate::session::SessionId;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use switchboard_core::types::{
    AgentIdentity, AgentSummary, CallSnapshot, ChannelHandle, ChannelPhase, ReleaseOption,
    ReleaseState,
};
use switchboard_core::Config;
use tracing::{debug, info};

/// Whether an agent may move a channel from `from` to `to`.
fn transition_allowed(from: ChannelPhase, to: ChannelPhase) -> bool {
    use ChannelPhase::*;

    matches!(
        (from, to),
        (Prering, Ringing | Precall | Ended)
            | (Ringing, Oncall | Ended)
            | (Precall, Oncall | Ended)
            | (Oncall, WarmtransferHold | Wrapup | Ended)
            | (WarmtransferHold, Oncall | Warmtransfer3rdParty | Wrapup)
            | (Warmtransfer3rdParty, Oncall | WarmtransferHold | Wrapup)
            | (Wrapup, Ended)
    )
}

/// Whether the call on a channel in this phase can be handed off.
fn transferable(phase: ChannelPhase) -> bool {
    matches!(phase, ChannelPhase::Oncall | ChannelPhase::WarmtransferHold)
}

#[derive(Debug, Clone)]
struct Leg {
    phase: ChannelPhase,
    call: CallSnapshot,
}

#[derive(Debug, Default)]
struct AgentState {
    owner: Option<AgentNotifier>,
    release: ReleaseState,
    channels: BTreeMap<ChannelHandle, Leg>,
}

impl AgentState {
    fn notify(&self, notice: AgentNotice) {
        if let Some(ref owner) = self.owner {
            owner.notify(notice);
        }
    }

    fn leg(&self, handle: &ChannelHandle) -> ActorResult<&Leg> {
        self.channels
            .get(handle)
            .ok_or_else(|| ActorError::UnknownChannel(handle.to_string()))
    }

    fn end_leg(&mut self, handle: &ChannelHandle) {
        if self.channels.remove(handle).is_some() {
            self.notify(AgentNotice::ChannelEnded {
                handle: handle.clone(),
            });
        }
    }
}

#[derive(Debug)]
struct ManagerInner {
    agents: RwLock<HashMap<String, Arc<InMemoryAgent>>>,
    queues: Vec<String>,
    release_options: Vec<ReleaseOption>,
}

impl ManagerInner {
    fn live_agent(&self, login: &str) -> Option<Arc<InMemoryAgent>> {
        self.agents
            .read()
            .get(login)
            .filter(|agent| agent.is_alive())
            .cloned()
    }
}

/// An agent actor living in this process.
#[derive(Debug)]
pub struct InMemoryAgent {
    identity: AgentIdentity,
    alive: AtomicBool,
    state: Mutex<AgentState>,
    manager: Weak<ManagerInner>,
}

impl InMemoryAgent {
    fn new(identity: AgentIdentity, manager: Weak<ManagerInner>) -> Self {
        Self {
            identity,
            alive: AtomicBool::new(true),
            state: Mutex::new(AgentState::default()),
            manager,
        }
    }

    fn ensure_alive(&self) -> ActorResult<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(ActorError::Unavailable(self.identity.login.clone()))
        }
    }

    /// Offer a call to the agent. The new channel starts ringing.
    pub fn offer_call(&self, call: CallSnapshot) -> ActorResult<ChannelHandle> {
        self.ensure_alive()?;
        let handle = ChannelHandle::generate();
        let mut state = self.state.lock();
        state.channels.insert(
            handle.clone(),
            Leg {
                phase: ChannelPhase::Ringing,
                call: call.clone(),
            },
        );
        state.notify(AgentNotice::ChannelOpened {
            handle: handle.clone(),
            phase: ChannelPhase::Ringing,
            call,
        });
        debug!("Offered call to {} on {}", self.identity.login, handle);
        Ok(handle)
    }

    /// Push an arbitrary command to the attached session.
    ///
    /// Returns `false` when no live session is attached.
    pub fn emit(&self, command: RawCommand) -> bool {
        let state = self.state.lock();
        match state.owner {
            Some(ref owner) => owner.notify(AgentNotice::Command(command)),
            None => false,
        }
    }

    /// Stop the actor. The attached session is told and then detached.
    pub fn kill(&self, reason: impl Into<String>) {
        if !self.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        info!("Agent {} stopped: {}", self.identity.login, reason);
        let mut state = self.state.lock();
        state.notify(AgentNotice::Stopped { reason });
        state.owner = None;
        state.channels.clear();
    }

    /// Session currently attached, if any.
    pub fn owner(&self) -> Option<SessionId> {
        let state = self.state.lock();
        state
            .owner
            .as_ref()
            .filter(|owner| !owner.is_closed())
            .map(|owner| owner.session().clone())
    }

    /// Phase of one of this agent's channels.
    pub fn channel_phase(&self, handle: &ChannelHandle) -> Option<ChannelPhase> {
        self.state.lock().channels.get(handle).map(|leg| leg.phase)
    }

    /// Identity the actor was started with.
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }
}

#[async_trait]
impl AgentActor for InMemoryAgent {
    fn login(&self) -> &str {
        &self.identity.login
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn attach(&self, notifier: AgentNotifier) -> ActorResult<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        if let Some(ref owner) = state.owner {
            if !owner.is_closed() && owner.session() != notifier.session() {
                return Err(ActorError::Refused(self.identity.login.clone()));
            }
        }

        // Bring the new session up to date before anything else is sent.
        notifier.notify(AgentNotice::ReleaseChanged(state.release.clone()));
        for (handle, leg) in &state.channels {
            notifier.notify(AgentNotice::ChannelOpened {
                handle: handle.clone(),
                phase: leg.phase,
                call: leg.call.clone(),
            });
        }
        debug!(
            "Agent {} attached to session {}",
            self.identity.login,
            notifier.session()
        );
        state.owner = Some(notifier);
        Ok(())
    }

    async fn detach(&self, session: &SessionId) {
        let mut state = self.state.lock();
        if state.owner.as_ref().map(|o| o.session()) == Some(session) {
            state.owner = None;
            debug!("Agent {} detached from session {}", self.identity.login, session);
        }
    }

    async fn release_state(&self) -> ActorResult<ReleaseState> {
        self.ensure_alive()?;
        Ok(self.state.lock().release.clone())
    }

    async fn set_release(&self, release: ReleaseState) -> ActorResult<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        if state.release != release {
            state.release = release.clone();
            state.notify(AgentNotice::ReleaseChanged(release));
        }
        Ok(())
    }

    async fn set_channel_state(
        &self,
        handle: &ChannelHandle,
        phase: ChannelPhase,
    ) -> ActorResult<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        let current = state.leg(handle)?.phase;
        if !transition_allowed(current, phase) {
            return Err(ActorError::InvalidStateChange(format!(
                "cannot go from {} to {}",
                current, phase
            )));
        }

        if phase == ChannelPhase::Ended {
            state.end_leg(handle);
            return Ok(());
        }
        if let Some(leg) = state.channels.get_mut(handle) {
            leg.phase = phase;
        }
        state.notify(AgentNotice::ChannelState {
            handle: handle.clone(),
            phase,
        });
        Ok(())
    }

    async fn hangup(&self, handle: &ChannelHandle) -> ActorResult<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        let phase = state.leg(handle)?.phase;
        match phase {
            ChannelPhase::Prering | ChannelPhase::Ringing | ChannelPhase::Precall => {
                state.end_leg(handle);
            }
            ChannelPhase::Oncall
            | ChannelPhase::WarmtransferHold
            | ChannelPhase::Warmtransfer3rdParty => {
                if let Some(leg) = state.channels.get_mut(handle) {
                    leg.phase = ChannelPhase::Wrapup;
                }
                state.notify(AgentNotice::ChannelState {
                    handle: handle.clone(),
                    phase: ChannelPhase::Wrapup,
                });
            }
            phase => {
                return Err(ActorError::InvalidStateChange(format!(
                    "cannot hang up a channel in {}",
                    phase
                )));
            }
        }
        Ok(())
    }

    async fn end_wrapup(&self, handle: &ChannelHandle) -> ActorResult<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        let phase = state.leg(handle)?.phase;
        if phase != ChannelPhase::Wrapup {
            return Err(ActorError::InvalidStateChange(format!(
                "channel is in {}, not wrapup",
                phase
            )));
        }
        state.end_leg(handle);
        Ok(())
    }

    async fn queue_transfer(&self, handle: &ChannelHandle, queue: &str) -> ActorResult<()> {
        self.ensure_alive()?;
        let known = self
            .manager
            .upgrade()
            .map(|m| m.queues.iter().any(|q| q == queue))
            .unwrap_or(false);
        if !known {
            return Err(ActorError::InvalidStateChange(format!(
                "unknown queue {}",
                queue
            )));
        }

        let mut state = self.state.lock();
        let phase = state.leg(handle)?.phase;
        if !transferable(phase) {
            return Err(ActorError::InvalidStateChange(format!(
                "cannot transfer a channel in {}",
                phase
            )));
        }
        state.end_leg(handle);
        info!("{} sent {} to queue {}", self.identity.login, handle, queue);
        Ok(())
    }

    async fn agent_transfer(&self, handle: &ChannelHandle, login: &str) -> ActorResult<()> {
        self.ensure_alive()?;
        if login == self.identity.login {
            return Err(ActorError::InvalidStateChange(
                "cannot transfer to yourself".to_string(),
            ));
        }
        let target = self
            .manager
            .upgrade()
            .and_then(|m| m.live_agent(login))
            .ok_or_else(|| {
                ActorError::InvalidStateChange(format!("agent {} is not available", login))
            })?;

        let call = {
            let mut state = self.state.lock();
            let leg = state.leg(handle)?.clone();
            if !transferable(leg.phase) {
                return Err(ActorError::InvalidStateChange(format!(
                    "cannot transfer a channel in {}",
                    leg.phase
                )));
            }
            state.end_leg(handle);
            leg.call
        };

        target.offer_call(call)?;
        info!("{} transferred {} to {}", self.identity.login, handle, login);
        Ok(())
    }

    async fn media_command(
        &self,
        handle: &ChannelHandle,
        command: &str,
        args: Vec<Payload>,
    ) -> ActorResult<Payload> {
        self.ensure_alive()?;
        let state = self.state.lock();
        let leg = state.leg(handle)?;
        Ok(Payload::map()
            .with("command", command)
            .with("type", leg.call.media_type.as_str())
            .with("args", Payload::List(args)))
    }

    fn summary(&self) -> AgentSummary {
        let state = self.state.lock();
        AgentSummary {
            login: self.identity.login.clone(),
            profile: self.identity.profile.clone(),
            release: state.release.clone(),
            channels: state.channels.len(),
        }
    }
}

/// Agent manager keeping every actor in process.
#[derive(Debug, Clone)]
pub struct InMemoryAgentManager {
    inner: Arc<ManagerInner>,
}

impl Default for InMemoryAgentManager {
    fn default() -> Self {
        Self::new(vec![ReleaseOption::default_release()], Vec::new())
    }
}

impl InMemoryAgentManager {
    /// Create a manager with the given release reasons and queues.
    pub fn new(release_options: Vec<ReleaseOption>, queues: Vec<String>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                agents: RwLock::new(HashMap::new()),
                queues,
                release_options,
            }),
        }
    }

    /// Create a manager from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.release_options.clone(), config.queues.clone())
    }

    /// Concrete actor for a login, alive or not.
    pub fn agent(&self, login: &str) -> Option<Arc<InMemoryAgent>> {
        self.inner.agents.read().get(login).cloned()
    }
}

#[async_trait]
impl AgentManager for InMemoryAgentManager {
    async fn start_agent(&self, identity: &AgentIdentity) -> ActorResult<Arc<dyn AgentActor>> {
        let mut agents = self.inner.agents.write();
        if let Some(agent) = agents.get(&identity.login).filter(|a| a.is_alive()) {
            return Ok(agent.clone());
        }

        let agent = Arc::new(InMemoryAgent::new(
            identity.clone(),
            Arc::downgrade(&self.inner),
        ));
        agents.insert(identity.login.clone(), agent.clone());
        info!("Started agent {}", identity.login);
        Ok(agent)
    }

    async fn find_agent(&self, login: &str) -> Option<Arc<dyn AgentActor>> {
        self.inner
            .live_agent(login)
            .map(|agent| agent as Arc<dyn AgentActor>)
    }

    async fn available_agents(&self) -> Vec<AgentSummary> {
        let agents = self.inner.agents.read();
        let mut available: Vec<AgentSummary> = agents
            .values()
            .filter(|agent| agent.is_alive())
            .map(|agent| agent.summary())
            .filter(|summary| !summary.release.is_released())
            .collect();
        available.sort_by(|a, b| a.login.cmp(&b.login));
        available
    }

    fn queues(&self) -> Vec<String> {
        self.inner.queues.clone()
    }

    fn release_options(&self) -> Vec<ReleaseOption> {
        self.inner.release_options.clone()
    }
}
