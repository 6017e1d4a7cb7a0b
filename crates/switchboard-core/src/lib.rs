//! # switchboard-core
//!
//! Core types, configuration, and utilities for Switchboard.
//!
//! This crate provides shared functionality used across all Switchboard crates:
//!
//! - **Configuration**: Loading, validation, and management of config files
//! - **Types**: Security tiers, agent identities, release options, channel phases
//! - **Utilities**: Path resolution, ID generation, and environment handling

pub mod config;
pub mod env;
pub mod error;
pub mod id;
pub mod paths;
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use types::*;
