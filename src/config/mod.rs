//! Configuration for the swap desk

pub mod rpc;

use crate::tokens::{addresses, chains, registry};
use crate::{Error, Result};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use rpc::RpcConfig;

/// Environment variable names for config overrides
mod env_vars {
    pub const WRAPPER_ADDRESS: &str = "WRAPPER_ADDRESS";
    pub const DATA_DIR: &str = "SWAP_DESK_DATA_DIR";
    pub const JOURNAL_PATH: &str = "SWAP_DESK_JOURNAL";
}

/// Target network and exchange contracts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    /// Display symbol of the native asset
    pub native_symbol: String,
    /// Wrapped native token, first hop of every buy path
    pub wrapped_native: Address,
    /// Stablecoin used to price the native asset in USD
    pub usd_reference: Address,
    /// Router used for `getAmountsOut` quotes
    pub router: Address,
    /// Contract that executes swaps and receives token approvals.
    /// Falls back to `router` when unset (e.g. no fee wrapper deployed).
    #[serde(default)]
    pub swap_executor: Option<Address>,
    /// Intermediate assets tried in order when no direct pool exists
    pub route_candidates: Vec<Address>,
    /// Upper bound for every single RPC call
    pub call_timeout_secs: u64,
    /// Block explorer base URL (no trailing slash)
    pub explorer_url: String,
}

impl ChainConfig {
    /// Spender and swap target for user transactions
    pub fn executor(&self) -> Address {
        self.swap_executor.unwrap_or(self.router)
    }

    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: chains::BSC,
            native_symbol: "BNB".to_string(),
            wrapped_native: addresses::WBNB,
            usd_reference: addresses::BUSD,
            router: addresses::PANCAKE_ROUTER,
            swap_executor: None,
            route_candidates: vec![addresses::BUSD, addresses::USDT, addresses::USDC],
            call_timeout_secs: 8,
            explorer_url: "https://bscscan.com".to_string(),
        }
    }
}

/// Gas limits per transaction kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasLimits {
    pub buy: u64,
    pub sell: u64,
    pub approve: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            buy: 600_000,
            sell: 800_000,
            approve: 150_000,
        }
    }
}

/// Trade execution parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Swap deadline = submission time + this many seconds
    pub deadline_grace_secs: u64,
    /// How long a sell waits for its approval to be mined
    pub approval_timeout_secs: u64,
    /// Receipt polling interval while waiting for an approval
    pub approval_poll_ms: u64,
    /// Native amount used to sample whether a route exists
    pub route_sample_native: Decimal,
    /// Native amount used for the round-trip risk simulation
    pub risk_sample_native: Decimal,
    pub gas_limits: GasLimits,
    /// Slippage given to newly connected wallets, in basis points
    pub default_slippage_bps: u16,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            deadline_grace_secs: 600,
            approval_timeout_secs: 120,
            approval_poll_ms: 1_500,
            route_sample_native: dec!(1),
            risk_sample_native: dec!(0.01),
            gas_limits: GasLimits::default(),
            default_slippage_bps: 300,
        }
    }
}

/// Where custody records live
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON record per user
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "users".to_string(),
        }
    }
}

/// Best-effort holder count scraping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolderLookupConfig {
    pub enabled: bool,
    /// Token page prefix; the token address is appended
    pub token_page_url: String,
    pub timeout_secs: u64,
}

impl Default for HolderLookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_page_url: "https://bscscan.com/token/".to_string(),
            timeout_secs: 15,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub holders: HolderLookupConfig,
    /// JSONL trade journal, disabled when unset
    #[serde(default)]
    pub journal_path: Option<String>,
}

impl Config {
    /// Load from a JSON file (or defaults) and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                serde_json::from_str(&content)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup(env_vars::WRAPPER_ADDRESS) {
            let executor: Address = raw.trim().parse().map_err(|e| {
                Error::Config(format!("{} is not an address: {}", env_vars::WRAPPER_ADDRESS, e))
            })?;
            if executor == addresses::ZERO_ADDRESS {
                return Err(Error::Config(format!(
                    "{} must be a deployed contract, not the zero address",
                    env_vars::WRAPPER_ADDRESS
                )));
            }
            tracing::debug!(executor = %executor, "Using swap executor from environment");
            self.chain.swap_executor = Some(executor);
        }
        if let Some(dir) = lookup(env_vars::DATA_DIR) {
            self.storage.data_dir = dir;
        }
        if let Some(path) = lookup(env_vars::JOURNAL_PATH) {
            self.journal_path = Some(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let bps = self.trading.default_slippage_bps;
        if bps == 0 || bps >= 10_000 {
            return Err(Error::Config(format!(
                "default_slippage_bps must be within 1..10000, got {}",
                bps
            )));
        }
        if self.chain.route_candidates.contains(&self.chain.wrapped_native) {
            return Err(Error::Config(
                "route_candidates must not contain the wrapped native token".to_string(),
            ));
        }
        if self.trading.risk_sample_native <= Decimal::ZERO
            || self.trading.route_sample_native <= Decimal::ZERO
        {
            return Err(Error::Config("sample amounts must be positive".to_string()));
        }
        if !registry().is_stablecoin(&self.chain.usd_reference) {
            tracing::warn!(
                usd_reference = %self.chain.usd_reference,
                "USD reference is not a known stablecoin, prices may be off"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_config_fills_defaults() {
        let value = serde_json::json!({
            "trading": {
                "deadline_grace_secs": 300,
                "approval_timeout_secs": 60,
                "approval_poll_ms": 500,
                "route_sample_native": "1",
                "risk_sample_native": "0.02",
                "gas_limits": { "buy": 500000, "sell": 700000, "approve": 100000 },
                "default_slippage_bps": 100
            }
        });
        let parsed: Config = serde_json::from_value(value).expect("parse config");
        assert_eq!(parsed.trading.deadline_grace_secs, 300);
        assert_eq!(parsed.trading.risk_sample_native, dec!(0.02));
        assert_eq!(parsed.chain.chain_id, chains::BSC);
        assert_eq!(parsed.storage.data_dir, "users");
        assert!(parsed.journal_path.is_none());
    }

    #[test]
    fn executor_falls_back_to_router() {
        let config = Config::default();
        assert_eq!(config.chain.executor(), addresses::PANCAKE_ROUTER);
    }

    #[test]
    fn overrides_set_executor_and_paths() {
        let mut env = HashMap::new();
        env.insert(
            "WRAPPER_ADDRESS",
            "0x1234567890123456789012345678901234567890".to_string(),
        );
        env.insert("SWAP_DESK_DATA_DIR", "/var/lib/swap-desk".to_string());

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).cloned())
            .expect("overrides");

        assert_eq!(
            config.chain.executor().to_string().to_lowercase(),
            "0x1234567890123456789012345678901234567890"
        );
        assert_eq!(config.storage.data_dir, "/var/lib/swap-desk");
    }

    #[test]
    fn zero_wrapper_address_is_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "WRAPPER_ADDRESS")
                .then(|| "0x0000000000000000000000000000000000000000".to_string())
        });
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_slippage() {
        let mut config = Config::default();
        config.trading.default_slippage_bps = 10_000;
        assert!(config.validate().is_err());

        config.trading.default_slippage_bps = 300;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explorer_tx_url() {
        let config = ChainConfig::default();
        assert_eq!(config.tx_url("0xabc"), "https://bscscan.com/tx/0xabc");
    }
}
