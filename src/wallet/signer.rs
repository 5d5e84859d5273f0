//! Secure wallet implementation
//!
//! SECURITY: keys are held in alloy's PrivateKeySigner and are never logged.
//! `Debug` is implemented by hand and redacts the signer.

use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use secrecy::{ExposeSecret, SecretString};

/// Minimum length of a submitted key, `0x` prefix included
const MIN_KEY_LEN: usize = 60;

/// Cheap shape check done before attempting to parse a submitted key.
///
/// Input that fails this check is re-prompted without touching the session.
pub fn looks_like_secret_key(input: &str) -> bool {
    input.starts_with("0x") && input.len() >= MIN_KEY_LEN
}

/// Signing wallet for one user
pub struct SecureWallet {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy integration
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        let address = signer.address();
        let wallet = EthereumWallet::from(signer.clone());

        Ok(Self {
            signer,
            address,
            wallet,
        })
    }

    /// Create a wallet from a stored custody secret
    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        Self::from_hex(secret.expose_secret())
    }

    /// Get the public address (safe to share)
    pub fn address(&self) -> Address {
        self.address
    }

    /// Get the address as a checksummed string
    pub fn address_string(&self) -> String {
        self.signer.address().to_checksum(None)
    }

    /// Get a reference to the EthereumWallet for use with alloy providers
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }
}

impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}
