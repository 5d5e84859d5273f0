//! RPC endpoint configuration
//!
//! Builds an ordered failover list for BNB Smart Chain:
//! 1. `BSC_RPC_URL` - primary node, highest priority
//! 2. `BSC_RPC_FALLBACKS` - comma separated extra endpoints
//! 3. Public RPC fallbacks - rate limited, always appended last
//!
//! # Examples
//!
//! ```bash
//! export BSC_RPC_URL="https://bsc-mainnet.nodereal.io/v1/YOUR_KEY"
//! export BSC_RPC_FALLBACKS="https://bsc.publicnode.com,https://1rpc.io/bnb"
//! ```

/// Environment variable names
mod env_vars {
    pub const BSC_RPC_URL: &str = "BSC_RPC_URL";
    pub const BSC_RPC_FALLBACKS: &str = "BSC_RPC_FALLBACKS";
}

/// Public RPC endpoints (rate limited)
mod public_rpcs {
    pub const ANKR: &str = "https://rpc.ankr.com/bsc";
    pub const BLAST: &str = "https://bsc-mainnet.public.blastapi.io/";
    pub const NINICOIN: &str = "https://bsc-dataseed1.ninicoin.io/";

    pub const ALL: [&str; 3] = [ANKR, BLAST, NINICOIN];
}

/// Ordered list of RPC URLs, tried first to last
#[derive(Debug, Clone)]
pub struct RpcConfig {
    urls: Vec<String>,
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the failover list from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut urls: Vec<String> = Vec::new();

        if let Some(url) = lookup(env_vars::BSC_RPC_URL).filter(|u| !u.trim().is_empty()) {
            tracing::debug!("Using BSC_RPC_URL as primary RPC");
            urls.push(url.trim().to_string());
        } else {
            tracing::warn!("BSC_RPC_URL not set, relying on public RPCs (rate limited)");
        }

        if let Some(extra) = lookup(env_vars::BSC_RPC_FALLBACKS) {
            urls.extend(
                extra
                    .split(',')
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
            );
        }

        for public in public_rpcs::ALL {
            if !urls.iter().any(|u| u == public) {
                urls.push(public.to_string());
            }
        }

        Self { urls }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn primary(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
