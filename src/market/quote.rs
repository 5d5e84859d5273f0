//! Expected output and slippage bounds

use super::Route;
use crate::chain::ChainGateway;
use crate::custody::Slippage;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;

const BPS_DENOMINATOR: u64 = 10_000;

/// Lowest output the swap may accept: `floor(expected * (1 - slippage))`
pub fn min_acceptable(expected: U256, slippage: Slippage) -> U256 {
    let keep = BPS_DENOMINATOR - u64::from(slippage.bps());
    expected * U256::from(keep) / U256::from(BPS_DENOMINATOR)
}

/// A priced trade on a fixed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub path: Vec<Address>,
    pub amount_in: U256,
    pub expected_out: U256,
    pub min_out: U256,
}

#[derive(Clone)]
pub struct QuoteEngine {
    gateway: Arc<dyn ChainGateway>,
}

impl QuoteEngine {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }

    /// Native in, token out along the buy path
    pub async fn quote_buy(&self, native_in: U256, route: &Route, slippage: Slippage) -> Result<Quote> {
        self.quote_path(native_in, route.buy_path().to_vec(), slippage).await
    }

    /// Token in, native out along the reversed buy path
    pub async fn quote_sell(&self, token_in: U256, route: &Route, slippage: Slippage) -> Result<Quote> {
        self.quote_path(token_in, route.sell_path(), slippage).await
    }

    async fn quote_path(&self, amount_in: U256, path: Vec<Address>, slippage: Slippage) -> Result<Quote> {
        if amount_in.is_zero() {
            return Err(Error::Validation("amount must be greater than zero".to_string()));
        }
        let expected_out = self
            .gateway
            .quote(amount_in, &path)
            .await
            .map_err(|e| Error::QuoteUnavailable(e.to_string()))?;

        Ok(Quote {
            min_out: min_acceptable(expected_out, slippage),
            path,
            amount_in,
            expected_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockGateway, QuoteRule};
    use crate::tokens::addresses::{BUSD, WBNB};

    fn pct(p: u8) -> Slippage {
        Slippage::from_percent(p).unwrap()
    }

    #[test]
    fn test_min_acceptable_three_percent() {
        assert_eq!(
            min_acceptable(U256::from(1_000_000u64), pct(3)),
            U256::from(970_000u64)
        );
    }

    #[test]
    fn test_min_acceptable_floors_for_presets() {
        for (percent, expected) in [(1u8, 98_998u64), (3, 96_998), (5, 94_998)] {
            let min = min_acceptable(U256::from(99_998u64), pct(percent));
            assert_eq!(min, U256::from(expected), "slippage {}%", percent);
            assert!(min < U256::from(99_998u64));
        }
        // 101 * 0.97 = 97.97, never rounded up
        assert_eq!(min_acceptable(U256::from(101u64), pct(3)), U256::from(97u64));
    }

    #[test]
    fn test_min_acceptable_handles_full_range() {
        let min = min_acceptable(U256::MAX / U256::from(BPS_DENOMINATOR), pct(1));
        assert!(min > U256::ZERO);
    }

    #[tokio::test]
    async fn test_sell_quotes_reversed_path() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, BUSD], QuoteRule::Rate { num: 600, den: 1 });
        mock.set_quote(&[BUSD, WBNB], QuoteRule::Rate { num: 1, den: 600 });

        let resolver = crate::market::PathResolver::new(
            mock.clone(),
            &crate::config::ChainConfig::default(),
            U256::from(1_000_000_000_000_000_000u128),
        );
        let route = resolver.resolve(BUSD).await.unwrap();
        let engine = QuoteEngine::new(mock);

        let buy = engine.quote_buy(U256::from(1_000u64), &route, pct(1)).await.unwrap();
        assert_eq!(buy.expected_out, U256::from(600_000u64));
        assert_eq!(buy.min_out, U256::from(594_000u64));

        let sell = engine.quote_sell(U256::from(600_000u64), &route, pct(5)).await.unwrap();
        assert_eq!(sell.path, vec![BUSD, WBNB]);
        assert_eq!(sell.expected_out, U256::from(1_000u64));
        assert_eq!(sell.min_out, U256::from(950u64));
    }

    #[tokio::test]
    async fn test_quote_failure_is_retryable() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, BUSD], QuoteRule::Rate { num: 1, den: 1 });
        let resolver = crate::market::PathResolver::new(
            mock.clone(),
            &crate::config::ChainConfig::default(),
            U256::from(1u64),
        );
        let route = resolver.resolve(BUSD).await.unwrap();
        mock.set_quote(&[WBNB, BUSD], QuoteRule::Transport);

        let err = QuoteEngine::new(mock)
            .quote_buy(U256::from(10u64), &route, pct(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuoteUnavailable(_)));
        assert!(err.is_retryable());
    }
}
