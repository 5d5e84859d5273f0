//! Custodial wallets
//!
//! Each connected user owns exactly one signing key. The key lives in a
//! [`SecureWallet`] only for as long as a transaction is being built and signed.

mod signer;

pub use signer::{looks_like_secret_key, SecureWallet};
