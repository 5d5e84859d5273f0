//! Token snapshots for the review view

use super::{HolderLookup, PathResolver, Route};
use crate::chain::ChainGateway;
use crate::config::ChainConfig;
use crate::tokens::{registry, to_decimal, NATIVE_DECIMALS};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;

/// Point-in-time view of a token, recomputed for every review
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenSnapshot {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
    pub price_usd: Option<Decimal>,
    pub market_cap_usd: Option<Decimal>,
    pub holders: Option<u64>,
    pub fee_percent: Decimal,
    pub fee_receiver: Option<Address>,
    /// Route used for pricing, when one exists
    pub route: Option<Route>,
}

pub struct SnapshotService {
    gateway: Arc<dyn ChainGateway>,
    resolver: PathResolver,
    holders: Arc<dyn HolderLookup>,
    native: Address,
    usd_reference: Address,
}

impl SnapshotService {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        resolver: PathResolver,
        holders: Arc<dyn HolderLookup>,
        chain: &ChainConfig,
    ) -> Self {
        Self {
            gateway,
            resolver,
            holders,
            native: chain.wrapped_native,
            usd_reference: chain.usd_reference,
        }
    }

    fn one_native() -> U256 {
        U256::from(10u8).pow(U256::from(NATIVE_DECIMALS))
    }

    /// USD value of one native unit, `None` when the reference pool cannot be quoted
    pub async fn native_price_usd(&self) -> Option<Decimal> {
        let out = self
            .gateway
            .quote(Self::one_native(), &[self.native, self.usd_reference])
            .await
            .ok()?;
        let usd_decimals = registry()
            .get(&self.usd_reference)
            .map(|t| t.decimals)
            .unwrap_or(NATIVE_DECIMALS);
        to_decimal(out, usd_decimals)
    }

    /// Price and route for a token; either may be unknown
    async fn price(&self, token: Address, decimals: u8) -> (Option<Decimal>, Option<Route>) {
        let route = match self.resolver.resolve(token).await {
            Ok(route) => route,
            Err(e) => {
                tracing::debug!(token = %token, error = %e, "Token has no priceable route");
                return (None, None);
            }
        };

        let tokens_per_native = async {
            let out = self
                .gateway
                .quote(Self::one_native(), route.buy_path())
                .await
                .ok()?;
            to_decimal(out, decimals).filter(|v| !v.is_zero())
        };
        let (native_usd, tokens_per_native) =
            futures::join!(self.native_price_usd(), tokens_per_native);

        let price = match (native_usd, tokens_per_native) {
            (Some(usd), Some(per_native)) => usd.checked_div(per_native),
            _ => None,
        };
        (price, Some(route))
    }

    /// Full snapshot; only an unreadable token contract is an error
    pub async fn snapshot(&self, token: Address) -> Result<TokenSnapshot> {
        let meta = self
            .gateway
            .token_meta(token)
            .await
            .map_err(|e| Error::BadToken(format!("{}: {}", token, e)))?;

        let ((price_usd, route), fee, holders) = futures::join!(
            self.price(token, meta.decimals),
            self.gateway.token_fee(token),
            self.holders.holder_count(token),
        );

        let market_cap_usd = price_usd.and_then(|price| {
            to_decimal(meta.total_supply, meta.decimals).and_then(|supply| price.checked_mul(supply))
        });

        tracing::debug!(
            token = %token,
            symbol = %meta.symbol,
            price_usd = ?price_usd,
            holders = ?holders,
            "Snapshot built"
        );

        Ok(TokenSnapshot {
            address: token,
            symbol: meta.symbol,
            decimals: meta.decimals,
            total_supply: meta.total_supply,
            price_usd,
            market_cap_usd,
            holders,
            fee_percent: fee.percent,
            fee_receiver: fee.receiver,
            route,
        })
    }
}
