//! Conversational trade sessions
//!
//! `Idle -> AwaitingSecretKey -> Idle` connects a wallet. With a wallet,
//! `AwaitingToken -> AwaitingProceed -> AwaitingAmount -> [pending trade] -> Idle`
//! walks one trade. Cancel returns to idle from anywhere.

mod action;
mod engine;
mod reply;
mod state;

pub use action::{Action, AMOUNT_PRESETS, SLIPPAGE_PRESETS};
pub use engine::SessionEngine;
pub use reply::{Button, Reply};
pub use state::{Step, StepKind, UserSlot};
