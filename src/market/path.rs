//! Swap route discovery

use crate::chain::ChainGateway;
use crate::config::ChainConfig;
use crate::tokens::registry;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;

/// Buy-direction hop sequence starting at the wrapped native token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    hops: Vec<Address>,
}

impl Route {
    pub fn buy_path(&self) -> &[Address] {
        &self.hops
    }

    /// Exact reverse of the buy path
    pub fn sell_path(&self) -> Vec<Address> {
        self.hops.iter().rev().copied().collect()
    }

    /// Intermediate asset, if the route is not direct
    pub fn via(&self) -> Option<Address> {
        (self.hops.len() == 3).then(|| self.hops[1])
    }

    /// Human readable route, e.g. `WBNB -> BUSD -> 0xAbC..`
    pub fn describe(&self) -> String {
        let registry = registry();
        self.hops
            .iter()
            .map(|hop| registry.label(hop))
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

/// Finds the first route whose sample quote succeeds.
///
/// Candidates are tried in configured order: direct, then one stable hop each.
/// There is no scoring, so the same reachable pools always give the same route.
#[derive(Clone)]
pub struct PathResolver {
    gateway: Arc<dyn ChainGateway>,
    native: Address,
    candidates: Vec<Address>,
    sample: U256,
}

impl PathResolver {
    pub fn new(gateway: Arc<dyn ChainGateway>, chain: &ChainConfig, sample: U256) -> Self {
        Self {
            gateway,
            native: chain.wrapped_native,
            candidates: chain.route_candidates.clone(),
            sample,
        }
    }

    pub async fn resolve(&self, target: Address) -> Result<Route> {
        if target == self.native {
            return Err(Error::RouteUnavailable(
                "the native asset cannot be traded against itself".to_string(),
            ));
        }

        let direct = std::iter::once(vec![self.native, target]);
        let via = self
            .candidates
            .iter()
            .filter(|c| **c != target)
            .map(|c| vec![self.native, *c, target]);

        for hops in direct.chain(via) {
            match self.gateway.quote(self.sample, &hops).await {
                Ok(out) if !out.is_zero() => {
                    let route = Route { hops };
                    tracing::debug!(token = %target, route = %route.describe(), "Route resolved");
                    return Ok(route);
                }
                Ok(_) => {
                    tracing::debug!(token = %target, hops = hops.len(), "Sample quote returned zero");
                }
                Err(e) if e.is_revert() => {
                    tracing::debug!(token = %target, hops = hops.len(), error = %e, "No pool on candidate route");
                }
                // The node could not answer: trying other routes would give a false "no route"
                Err(e) => return Err(Error::QuoteUnavailable(e.to_string())),
            }
        }

        Err(Error::RouteUnavailable(format!(
            "no pool connects {} to the native asset",
            target
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, MockGateway, QuoteRule};
    use crate::tokens::addresses::{BUSD, USDC, USDT, WBNB};
    use alloy::primitives::address;

    const TOKEN: Address = address!("1111111111111111111111111111111111111111");
    const ONE: u128 = 1_000_000_000_000_000_000;

    fn resolver(mock: Arc<MockGateway>) -> PathResolver {
        PathResolver::new(mock, &ChainConfig::default(), U256::from(ONE))
    }

    #[tokio::test]
    async fn test_prefers_direct_pool() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, TOKEN], QuoteRule::Rate { num: 1000, den: 1 });
        mock.set_quote(&[WBNB, BUSD, TOKEN], QuoteRule::Rate { num: 2000, den: 1 });

        let route = resolver(mock).resolve(TOKEN).await.unwrap();
        assert_eq!(route.buy_path(), &[WBNB, TOKEN]);
        assert_eq!(route.via(), None);
    }

    #[tokio::test]
    async fn test_falls_back_in_candidate_order() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, USDT, TOKEN], QuoteRule::Rate { num: 5, den: 1 });
        mock.set_quote(&[WBNB, USDC, TOKEN], QuoteRule::Rate { num: 9, den: 1 });

        let resolver = resolver(mock);
        let first = resolver.resolve(TOKEN).await.unwrap();
        let second = resolver.resolve(TOKEN).await.unwrap();

        assert_eq!(first.buy_path(), &[WBNB, USDT, TOKEN]);
        assert_eq!(first, second);
        assert_eq!(first.sell_path(), vec![TOKEN, USDT, WBNB]);
        assert_eq!(first.via(), Some(USDT));
    }

    #[tokio::test]
    async fn test_no_route_when_every_candidate_reverts() {
        let mock = Arc::new(MockGateway::new());
        let err = resolver(mock.clone()).resolve(TOKEN).await.unwrap_err();
        assert!(matches!(err, Error::RouteUnavailable(_)));
        assert!(mock.calls().iter().all(|c| !matches!(c, Call::Swap(_))));
    }

    #[tokio::test]
    async fn test_native_target_is_rejected_without_quoting() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, WBNB], QuoteRule::Rate { num: 1, den: 1 });
        let err = resolver(mock).resolve(WBNB).await.unwrap_err();
        assert!(matches!(err, Error::RouteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_a_missing_route() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, TOKEN], QuoteRule::Transport);
        mock.set_quote(&[WBNB, BUSD, TOKEN], QuoteRule::Rate { num: 1, den: 1 });

        let err = resolver(mock).resolve(TOKEN).await.unwrap_err();
        assert!(matches!(err, Error::QuoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_zero_sample_output_moves_on() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, TOKEN], QuoteRule::Rate { num: 0, den: 1 });
        mock.set_quote(&[WBNB, BUSD, TOKEN], QuoteRule::Rate { num: 3, den: 1 });

        let route = resolver(mock).resolve(TOKEN).await.unwrap();
        assert_eq!(route.via(), Some(BUSD));
    }

    #[tokio::test]
    async fn test_stable_target_skips_itself_as_hop() {
        let mock = Arc::new(MockGateway::new());
        mock.set_quote(&[WBNB, BUSD, BUSD], QuoteRule::Rate { num: 1, den: 1 });
        let err = resolver(mock).resolve(BUSD).await.unwrap_err();
        assert!(matches!(err, Error::RouteUnavailable(_)));
    }
}
