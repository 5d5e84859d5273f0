//! Swap desk
//!
//! A multi-user conversational trading desk for constant-product AMM exchanges:
//! - custodial wallets, one keyed profile per chat user
//! - route discovery, quoting and a round-trip tax heuristic over the router
//! - approve-then-swap execution with fresh nonces and user gas/slippage settings
//! - a weighted-average cost-basis portfolio per user
//!
//! # Security Model
//!
//! - Keys are held as `SecretString` and never appear in logs or `Debug` output
//! - Every user's session, pending trade and positions are scoped to their user id
//! - Chain writes happen at most once per confirmed user action

pub mod chain;
pub mod config;
pub mod custody;
pub mod execution;
pub mod market;
pub mod portfolio;
pub mod runner;
pub mod session;
pub mod tokens;
pub mod transport;
pub mod wallet;

mod error;
#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{Config, RpcConfig};
pub use error::{Error, Result};
pub use runner::BotRunner;
pub use session::SessionEngine;
