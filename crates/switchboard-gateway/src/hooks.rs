//! Extension hooks.
//!
//! Hooks let plugins answer requests the built-in table does not know, or any
//! request addressed to a named module. They are consulted in registration
//! order and the first one that answers wins.

use crate::methods::HandlerResult;
use crate::protocol::Args;
use crate::session::Session;
use async_trait::async_trait;

/// A request handler contributed from outside the core.
#[async_trait]
pub trait ExtensionHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Answer the request, or return `None` to pass it on.
    async fn try_handle(
        &self,
        session: &mut Session,
        module: Option<&str>,
        method: &str,
        args: &Args,
    ) -> Option<HandlerResult>;
}
