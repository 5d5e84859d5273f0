//! Portfolio ledger
//!
//! Per-user, per-token positions with a weighted-average cost basis:
//! - a buy blends the fill into the running average
//! - a sell only reduces the amount, the average is untouched
//! - a position that reaches zero is removed, never stored as an empty row
//!
//! Fills are recorded from the pre-trade quote, not the mined amount. For
//! fee-on-transfer tokens the stored amount can therefore exceed the real balance.

mod ledger;

pub use ledger::Ledger;

use crate::{Error, Result};
use alloy::primitives::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holding of one token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Human units, always > 0 while stored
    pub amount: Decimal,
    pub avg_cost_usd: Decimal,
}

/// All positions of one user, keyed by token address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionBook(BTreeMap<Address, Position>);

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, token: &Address) -> Option<&Position> {
        self.0.get(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Position)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Blend an acquisition into the position.
    ///
    /// Non-positive amounts are ignored. A negative price is clamped to zero.
    /// A blend that does not fit in a `Decimal` leaves the position unchanged.
    pub fn record_buy(&mut self, token: Address, symbol: &str, amount: Decimal, price_usd: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }
        let price_usd = price_usd.max(Decimal::ZERO);

        match self.0.get_mut(&token) {
            Some(position) => {
                let blended = blend(position.amount, position.avg_cost_usd, amount, price_usd)
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "position in {} too large to record {} at ${}",
                            position.symbol, amount, price_usd
                        ))
                    })?;
                (position.amount, position.avg_cost_usd) = blended;
            }
            None => {
                self.0.insert(
                    token,
                    Position {
                        symbol: symbol.to_string(),
                        amount,
                        avg_cost_usd: price_usd,
                    },
                );
            }
        }
        Ok(())
    }

    /// Reduce the position, removing it once nothing is left.
    ///
    /// Returns the remaining position, `None` when it was closed or never existed.
    pub fn record_sell(&mut self, token: Address, amount: Decimal) -> Option<&Position> {
        let remaining = self.0.get(&token)?.amount - amount;
        if remaining <= Decimal::ZERO {
            self.0.remove(&token);
            return None;
        }
        let position = self.0.get_mut(&token)?;
        position.amount = remaining;
        Some(position)
    }
}

/// New `(amount, average)` after adding `amount` at `price`
fn blend(held: Decimal, avg: Decimal, amount: Decimal, price: Decimal) -> Option<(Decimal, Decimal)> {
    let total = held.checked_add(amount)?;
    let cost = held
        .checked_mul(avg)?
        .checked_add(amount.checked_mul(price)?)?;
    Some((total, cost.checked_div(total)?))
}

/// Mark-to-market view of one position
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionValuation {
    pub token: Address,
    pub symbol: String,
    pub amount: Decimal,
    pub avg_cost_usd: Decimal,
    pub price_usd: Option<Decimal>,
    pub value_usd: Option<Decimal>,
    pub pnl_percent: Option<Decimal>,
}

impl PositionValuation {
    /// Value and PnL are `None` when the price is unknown or the math overflows
    pub fn new(token: Address, position: &Position, price_usd: Option<Decimal>) -> Self {
        let value_usd = price_usd.and_then(|p| position.amount.checked_mul(p));
        let pnl_percent = price_usd.and_then(|p| {
            let avg = position.avg_cost_usd;
            if avg.is_zero() {
                Some(Decimal::ZERO)
            } else {
                p.checked_sub(avg)?
                    .checked_div(avg)?
                    .checked_mul(Decimal::ONE_HUNDRED)
            }
        });
        Self {
            token,
            symbol: position.symbol.clone(),
            amount: position.amount,
            avg_cost_usd: position.avg_cost_usd,
            price_usd,
            value_usd,
            pnl_percent,
        }
    }
}

/// Portfolio summary; rows without a value do not count towards the total
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub rows: Vec<PositionValuation>,
    /// `None` when the sum does not fit in a `Decimal`
    pub total_value_usd: Option<Decimal>,
}

impl PortfolioValuation {
    pub fn from_rows(rows: Vec<PositionValuation>) -> Self {
        let total_value_usd = rows
            .iter()
            .filter_map(|r| r.value_usd)
            .try_fold(Decimal::ZERO, |total, value| total.checked_add(value));
        Self {
            rows,
            total_value_usd,
        }
    }
}
