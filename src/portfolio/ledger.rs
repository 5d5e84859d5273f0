//! Durable ledger updates through the key store

use crate::custody::{KeyStore, UserId, UserProfile};
use crate::{Error, Result};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Applies fills to a user's positions and persists them before returning.
///
/// Callers serialize access per user; the ledger itself holds no lock.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn KeyStore>,
}

impl Ledger {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    async fn profile(&self, user_id: UserId) -> Result<UserProfile> {
        self.store
            .load(user_id)
            .await?
            .ok_or_else(|| Error::Wallet(format!("user {} has no connected wallet", user_id)))
    }

    pub async fn record_buy(
        &self,
        user_id: UserId,
        token: Address,
        symbol: &str,
        amount: Decimal,
        price_usd: Decimal,
    ) -> Result<()> {
        let mut profile = self.profile(user_id).await?;
        profile.positions.record_buy(token, symbol, amount, price_usd)?;
        self.store.save(&profile).await?;

        tracing::info!(
            user_id,
            token = %token,
            amount = %amount,
            price_usd = %price_usd,
            "Ledger buy recorded"
        );
        Ok(())
    }

    pub async fn record_sell(&self, user_id: UserId, token: Address, amount: Decimal) -> Result<()> {
        let mut profile = self.profile(user_id).await?;
        let closed = profile.positions.record_sell(token, amount).is_none();
        self.store.save(&profile).await?;

        tracing::info!(user_id, token = %token, amount = %amount, closed, "Ledger sell recorded");
        Ok(())
    }
}
