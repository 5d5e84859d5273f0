//! Read-only market intelligence: routing, quoting, risk and token snapshots
//!
//! Everything here only reads chain state and is safe to repeat.

mod holders;
mod path;
mod quote;
mod risk;
mod snapshot;

pub use holders::{ExplorerHolderLookup, HolderLookup, NoHolderLookup};
pub use path::{PathResolver, Route};
pub use quote::{min_acceptable, Quote, QuoteEngine};
pub use risk::{RiskHeuristic, RiskLevel, RiskReport};
pub use snapshot::{SnapshotService, TokenSnapshot};

use crate::chain::ChainGateway;
use crate::config::Config;
use crate::tokens::{to_raw, NATIVE_DECIMALS};
use crate::{Error, Result};
use alloy::primitives::U256;
use rust_decimal::Decimal;
use std::sync::Arc;

/// The read-only services wired against one gateway
#[derive(Clone)]
pub struct Market {
    pub resolver: PathResolver,
    pub quotes: QuoteEngine,
    pub risk: RiskHeuristic,
    pub snapshots: Arc<SnapshotService>,
}

impl Market {
    pub fn new(config: &Config, gateway: Arc<dyn ChainGateway>, holders: Arc<dyn HolderLookup>) -> Result<Self> {
        let route_sample = native_sample(config.trading.route_sample_native)?;
        let risk_sample = native_sample(config.trading.risk_sample_native)?;

        let resolver = PathResolver::new(gateway.clone(), &config.chain, route_sample);
        let snapshots = SnapshotService::new(gateway.clone(), resolver.clone(), holders, &config.chain);
        Ok(Self {
            quotes: QuoteEngine::new(gateway.clone()),
            risk: RiskHeuristic::new(gateway, risk_sample),
            snapshots: Arc::new(snapshots),
            resolver,
        })
    }
}

fn native_sample(amount: Decimal) -> Result<U256> {
    to_raw(amount, NATIVE_DECIMALS)
        .filter(|raw| !raw.is_zero())
        .ok_or_else(|| Error::Config(format!("sample amount {} is not a positive native amount", amount)))
}
