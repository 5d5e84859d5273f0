//! Error types for the swap desk

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed user input (address, amount, key). Recovered locally by re-prompting.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("No route found: {0}")]
    RouteUnavailable(String),

    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    #[error("Approval {tx_hash} not confirmed within {timeout_secs}s")]
    ApprovalTimeout { tx_hash: String, timeout_secs: u64 },

    #[error("Transaction rejected: {0}")]
    Submission(String),

    #[error("Risk check failed: {0}")]
    RiskCheck(String),

    #[error("Not a readable token contract: {0}")]
    BadToken(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Chain error: {0}")]
    Chain(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the same user action can simply be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::QuoteUnavailable(_)
                | Error::ApprovalTimeout { .. }
                | Error::Chain(_)
                | Error::Network(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
