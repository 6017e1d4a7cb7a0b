//! Core types for Switchboard.

mod agent;
mod auth;
mod channel;

pub use agent::*;
pub use auth::*;
pub use channel::*;
