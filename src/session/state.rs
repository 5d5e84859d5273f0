//! Per-user conversational state
//!
//! Never persisted. A restart drops every session and pending trade.

use crate::execution::{Direction, PendingTrade};
use crate::market::TokenSnapshot;

/// Where the user is in a flow; no step means idle
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    AwaitingSecretKey,
    AwaitingToken(Direction),
    /// Review view of a token
    AwaitingProceed {
        direction: Direction,
        snapshot: Box<TokenSnapshot>,
    },
    AwaitingAmount {
        direction: Direction,
        snapshot: Box<TokenSnapshot>,
    },
}

/// Step without its context, for callers outside the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    AwaitingSecretKey,
    AwaitingToken(Direction),
    AwaitingProceed(Direction),
    AwaitingAmount(Direction),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::AwaitingSecretKey => StepKind::AwaitingSecretKey,
            Step::AwaitingToken(d) => StepKind::AwaitingToken(*d),
            Step::AwaitingProceed { direction, .. } => StepKind::AwaitingProceed(*direction),
            Step::AwaitingAmount { direction, .. } => StepKind::AwaitingAmount(*direction),
        }
    }

    /// Token under review in `direction`, from either review or amount entry
    pub fn reviewed(&self, wanted: Direction) -> Option<&TokenSnapshot> {
        match self {
            Step::AwaitingProceed {
                direction,
                snapshot,
            }
            | Step::AwaitingAmount {
                direction,
                snapshot,
            } if *direction == wanted => Some(&**snapshot),
            _ => None,
        }
    }
}

/// Everything the engine keeps for one user between events
#[derive(Debug, Default)]
pub struct UserSlot {
    pub step: Option<Step>,
    /// At most one per user by construction
    pub pending: Option<PendingTrade>,
}

impl UserSlot {
    /// Back to idle, dropping any pending trade. Safe to call repeatedly.
    pub fn reset(&mut self) {
        self.step = None;
        self.pending = None;
    }

    pub fn is_idle(&self) -> bool {
        self.step.is_none() && self.pending.is_none()
    }

    /// Take the pending trade only if it matches `direction`
    pub fn take_pending(&mut self, direction: Direction) -> Option<PendingTrade> {
        match &self.pending {
            Some(trade) if trade.direction == direction => self.pending.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, U256};
    use uuid::Uuid;

    fn pending(direction: Direction) -> PendingTrade {
        PendingTrade {
            id: Uuid::new_v4(),
            direction,
            token: Address::ZERO,
            symbol: "TKN".into(),
            decimals: 18,
            amount: U256::from(1u8),
            expected_out: U256::from(1u8),
        }
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut slot = UserSlot {
            step: Some(Step::AwaitingToken(Direction::Buy)),
            pending: Some(pending(Direction::Buy)),
        };
        slot.reset();
        assert!(slot.is_idle());
        slot.reset();
        assert!(slot.is_idle());
    }

    #[test]
    fn test_take_pending_checks_direction() {
        let mut slot = UserSlot {
            step: None,
            pending: Some(pending(Direction::Sell)),
        };
        assert!(slot.take_pending(Direction::Buy).is_none());
        assert!(slot.pending.is_some());
        assert!(slot.take_pending(Direction::Sell).is_some());
        assert!(slot.take_pending(Direction::Sell).is_none());
    }
}
