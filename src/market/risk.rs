//! Round-trip tax/scam heuristic
//!
//! Quotes a small buy and immediately quotes selling the proceeds back. The
//! shortfall approximates transfer tax plus pool fees. Advisory only: the result
//! is shown on the review view and never gates execution.

use super::Route;
use crate::chain::ChainGateway;
use crate::tokens::{to_decimal, NATIVE_DECIMALS};
use crate::{Error, Result};
use alloy::primitives::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// `< 5%` low, `< 25%` medium, anything else high
    pub fn classify(loss_percent: Decimal) -> Self {
        if loss_percent < dec!(5) {
            RiskLevel::Low
        } else if loss_percent < dec!(25) {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RiskReport {
    Assessed {
        loss_percent: Decimal,
        level: RiskLevel,
        sample_in: U256,
        native_back: U256,
    },
    /// The simulation itself could not run (illiquid pair, reverted call)
    Failed(String),
}

impl RiskReport {
    /// Loss and level, or the reason the simulation could not run
    pub fn outcome(&self) -> Result<(Decimal, RiskLevel)> {
        match self {
            RiskReport::Assessed {
                loss_percent,
                level,
                ..
            } => Ok((*loss_percent, *level)),
            RiskReport::Failed(reason) => Err(Error::RiskCheck(reason.clone())),
        }
    }
}

/// `max(0, 1 - back / sample) * 100`
pub fn loss_percent(sample_in: U256, native_back: U256) -> Option<Decimal> {
    let sample = to_decimal(sample_in, NATIVE_DECIMALS)?;
    if sample.is_zero() {
        return None;
    }
    let back = to_decimal(native_back, NATIVE_DECIMALS)?;
    // A ratio too large for a Decimal is a gain, not a loss
    match back.checked_div(sample) {
        Some(kept) if kept < Decimal::ONE => Some((Decimal::ONE - kept) * Decimal::ONE_HUNDRED),
        _ => Some(Decimal::ZERO),
    }
}

#[derive(Clone)]
pub struct RiskHeuristic {
    gateway: Arc<dyn ChainGateway>,
    sample: U256,
}

impl RiskHeuristic {
    pub fn new(gateway: Arc<dyn ChainGateway>, sample: U256) -> Self {
        Self { gateway, sample }
    }

    pub async fn assess(&self, route: &Route) -> RiskReport {
        let tokens = match self.gateway.quote(self.sample, route.buy_path()).await {
            Ok(out) if !out.is_zero() => out,
            Ok(_) => return RiskReport::Failed("sample buy returns no tokens".to_string()),
            Err(e) => return RiskReport::Failed(format!("sample buy: {}", e)),
        };
        let native_back = match self.gateway.quote(tokens, &route.sell_path()).await {
            Ok(out) => out,
            Err(e) => return RiskReport::Failed(format!("sample sell: {}", e)),
        };

        match loss_percent(self.sample, native_back) {
            Some(loss) => {
                let level = RiskLevel::classify(loss);
                tracing::debug!(route = %route.describe(), loss_percent = %loss, level = ?level, "Risk assessed");
                RiskReport::Assessed {
                    loss_percent: loss,
                    level,
                    sample_in: self.sample,
                    native_back,
                }
            }
            None => RiskReport::Failed("sample amount is not representable".to_string()),
        }
    }
}
