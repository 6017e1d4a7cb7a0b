//! Request dispatch.
//!
//! Resolves a request against the capability table and the extension hooks,
//! runs the handler under a timeout with panics caught, and turns whatever
//! came back into a response envelope plus an instruction for the session.

use crate::error::GatewayError;
use crate::handlers;
use crate::hooks::ExtensionHook;
use crate::lifecycle::{Phase, TerminateReason};
use crate::methods::{CapabilityTable, HandlerResult, Reply};
use crate::protocol::{Args, RequestEnvelope, ResponseEnvelope};
use crate::session::Session;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Module name that addresses the built-in handler set explicitly.
pub const BUILTIN_MODULE: &str = "builtin";

/// Methods accepted before a session is active.
const LOGIN_CLASS: &[&str] = &["ping"];

/// What the session should do after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep going.
    Continue,

    /// Begin termination for the given reason. The response is still sent
    /// first, including for [`GatewayError::ActorUnavailable`].
    Terminate(TerminateReason),
}

/// Routes requests to handlers.
pub struct Dispatcher {
    table: CapabilityTable,
    hooks: Vec<Arc<dyn ExtensionHook>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("table", &self.table)
            .field(
                "hooks",
                &self.hooks.iter().map(|h| h.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Dispatcher {
    /// Create a dispatcher over a table, with no hooks.
    pub fn new(table: CapabilityTable) -> Self {
        Self {
            table,
            hooks: Vec::new(),
        }
    }

    /// Create a dispatcher over the built-in handlers.
    pub fn builtin() -> Self {
        Self::new(handlers::builtin_table())
    }

    /// Append an extension hook. Hooks are consulted in the order added.
    pub fn with_hook(mut self, hook: Arc<dyn ExtensionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Dispatch one request within a session.
    pub async fn dispatch(
        &self,
        session: &mut Session,
        request: RequestEnvelope,
    ) -> (ResponseEnvelope, Outcome) {
        let RequestEnvelope {
            request_id,
            module,
            function,
            args,
        } = request;
        let module = module.filter(|m| !m.is_empty());
        let builtin = matches!(module.as_deref(), None | Some(BUILTIN_MODULE));
        let arity = args.len() + 1;
        debug!(
            "Session {} calls {}:{}/{}",
            session.id(),
            module.as_deref().unwrap_or(BUILTIN_MODULE),
            function,
            arity
        );

        if let Err(err) = admit(session.phase(), builtin, &function) {
            return (ResponseEnvelope::from_error(request_id, &err), Outcome::Continue);
        }

        let timeout = session.settings().dispatch_timeout;
        let handler = if builtin {
            self.table.resolve(&function, arity, session.tier())
        } else {
            None
        };

        let result = match handler {
            Some(handler) => guarded(timeout, handler(session, args))
                .await
                .and_then(|result| result),
            None => self
                .run_hooks(session, module.as_deref(), &function, &args, timeout)
                .await
                .unwrap_or_else(|| {
                    Err(GatewayError::MethodNotFound(format!(
                        "{}/{}",
                        function, arity
                    )))
                }),
        };

        normalize(request_id, result)
    }

    async fn run_hooks(
        &self,
        session: &mut Session,
        module: Option<&str>,
        function: &str,
        args: &Args,
        timeout: Duration,
    ) -> Option<HandlerResult> {
        for hook in &self.hooks {
            match guarded(timeout, hook.try_handle(session, module, function, args)).await {
                Ok(Some(result)) => {
                    debug!("Hook {} answered {}", hook.name(), function);
                    return Some(result);
                }
                Ok(None) => continue,
                Err(fault) => {
                    warn!("Hook {} failed on {}: {}", hook.name(), function, fault);
                    return Some(Err(fault));
                }
            }
        }
        None
    }
}

/// Check that a session in `phase` may make this call.
fn admit(phase: Phase, builtin: bool, function: &str) -> crate::Result<()> {
    match phase {
        Phase::Active => Ok(()),
        Phase::Initializing if builtin && LOGIN_CLASS.contains(&function) => Ok(()),
        Phase::Initializing => Err(GatewayError::NotReady(function.to_string())),
        Phase::Terminating | Phase::Terminated => {
            Err(GatewayError::SessionClosed(function.to_string()))
        }
    }
}

/// Await a handler future under a timeout, turning panics into faults.
async fn guarded<T>(timeout: Duration, call: impl Future<Output = T>) -> crate::Result<T> {
    match tokio::time::timeout(timeout, AssertUnwindSafe(call).catch_unwind()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            warn!("Handler panicked: {}", message);
            Err(GatewayError::HandlerFault(message))
        }
        Err(_) => {
            warn!("Handler timed out after {:?}", timeout);
            Err(GatewayError::HandlerFault(format!(
                "timed out after {:?}",
                timeout
            )))
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Shape a handler result into the wire response.
///
/// A fatal error (the agent actor is gone) still answers the request with a
/// `success:false` response carrying `ACTOR_UNAVAILABLE`, so the client never
/// waits on a reply that will not come. The session then terminates and its
/// `stopped` event with reason `actor_down` is the final notice.
fn normalize(
    request_id: serde_json::Value,
    result: HandlerResult,
) -> (ResponseEnvelope, Outcome) {
    match result {
        Ok(Reply::Ok) => (ResponseEnvelope::ok(request_id), Outcome::Continue),
        Ok(Reply::Value(value)) => (
            ResponseEnvelope::success(request_id, value),
            Outcome::Continue,
        ),
        Ok(Reply::Error { message, errcode }) => (
            ResponseEnvelope::error(request_id, message, errcode),
            Outcome::Continue,
        ),
        Ok(Reply::Terminate) => (
            ResponseEnvelope::ok(request_id),
            Outcome::Terminate(TerminateReason::Logout),
        ),
        Ok(Reply::TerminateWith(value)) => (
            ResponseEnvelope::success(request_id, value),
            Outcome::Terminate(TerminateReason::Logout),
        ),
        Err(err) if err.is_fatal() => {
            warn!("Fatal error, ending session: {}", err);
            (
                ResponseEnvelope::from_error(request_id, &err),
                Outcome::Terminate(TerminateReason::ActorDown),
            )
        }
        Err(err) => {
            debug!("Request failed: {}", err);
            (ResponseEnvelope::from_error(request_id, &err), Outcome::Continue)
        }
    }
}
