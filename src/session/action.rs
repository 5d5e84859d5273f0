//! Button actions and their wire codes

use crate::custody::GasMode;
use crate::execution::Direction;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Percentages offered as amount presets
pub const AMOUNT_PRESETS: [u8; 3] = [25, 50, 100];

/// Whole-percent slippage presets
pub const SLIPPAGE_PRESETS: [u8; 3] = [1, 3, 5];

/// Every button the engine can render or receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ConnectWallet,
    Disconnect,
    Wallet,
    Help,
    TradeMenu,
    MainMenu,
    Settings,
    SetSlippage(u8),
    SetGas(GasMode),
    Portfolio,
    StartFlow(Direction),
    Refresh(Direction),
    Risk(Direction),
    Proceed(Direction),
    Preset(Direction, u8),
    Confirm(Direction),
    Cancel,
}

impl Action {
    /// Opaque code carried by the transport
    pub fn code(&self) -> String {
        match self {
            Action::ConnectWallet => "connect_wallet".to_string(),
            Action::Disconnect => "disconnect".to_string(),
            Action::Wallet => "wallet".to_string(),
            Action::Help => "help".to_string(),
            Action::TradeMenu => "trade_menu".to_string(),
            Action::MainMenu => "back_main".to_string(),
            Action::Settings => "settings".to_string(),
            Action::SetSlippage(p) => format!("set_slip_{}", p),
            Action::SetGas(mode) => format!("set_gas_{}", mode.as_str()),
            Action::Portfolio => "portfolio".to_string(),
            Action::StartFlow(d) => format!("{}_flow", d.as_str()),
            Action::Refresh(d) => format!("{}_refresh", d.as_str()),
            Action::Risk(d) => format!("{}_risk", d.as_str()),
            Action::Proceed(d) => format!("{}_proceed", d.as_str()),
            Action::Preset(d, p) => format!("{}_pct_{}", d.as_str(), p),
            Action::Confirm(d) => format!("confirm_{}", d.as_str()),
            Action::Cancel => "cancel_trade".to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

fn direction(s: &str) -> Option<Direction> {
    match s {
        "buy" => Some(Direction::Buy),
        "sell" => Some(Direction::Sell),
        _ => None,
    }
}

fn preset<const N: usize>(raw: &str, allowed: [u8; N]) -> Option<u8> {
    raw.parse().ok().filter(|p| allowed.contains(p))
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(code: &str) -> Result<Self> {
        let unknown = || Error::Validation(format!("unknown action: {}", code));

        let action = match code {
            "connect_wallet" => Action::ConnectWallet,
            "disconnect" => Action::Disconnect,
            "wallet" => Action::Wallet,
            "help" => Action::Help,
            "trade_menu" => Action::TradeMenu,
            "back_main" => Action::MainMenu,
            "settings" => Action::Settings,
            "portfolio" => Action::Portfolio,
            "cancel_trade" => Action::Cancel,
            _ => {
                if let Some(p) = code.strip_prefix("set_slip_") {
                    return preset(p, SLIPPAGE_PRESETS)
                        .map(Action::SetSlippage)
                        .ok_or_else(unknown);
                }
                if let Some(mode) = code.strip_prefix("set_gas_") {
                    return mode.parse().map(Action::SetGas).map_err(|_| unknown());
                }
                if let Some(d) = code.strip_prefix("confirm_") {
                    return direction(d).map(Action::Confirm).ok_or_else(unknown);
                }

                let (d, rest) = code.split_once('_').ok_or_else(unknown)?;
                let d = direction(d).ok_or_else(unknown)?;
                match rest {
                    "flow" => Action::StartFlow(d),
                    "refresh" => Action::Refresh(d),
                    "risk" => Action::Risk(d),
                    "proceed" => Action::Proceed(d),
                    _ => {
                        let p = rest.strip_prefix("pct_").ok_or_else(unknown)?;
                        Action::Preset(d, preset(p, AMOUNT_PRESETS).ok_or_else(unknown)?)
                    }
                }
            }
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_parse_back() {
        let actions = [
            Action::ConnectWallet,
            Action::MainMenu,
            Action::SetSlippage(3),
            Action::SetGas(GasMode::Turbo),
            Action::StartFlow(Direction::Sell),
            Action::Refresh(Direction::Buy),
            Action::Risk(Direction::Sell),
            Action::Proceed(Direction::Buy),
            Action::Preset(Direction::Sell, 50),
            Action::Confirm(Direction::Buy),
            Action::Cancel,
        ];
        for action in actions {
            assert_eq!(action.code().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_known_wire_codes() {
        assert_eq!("buy_pct_25".parse::<Action>().unwrap(), Action::Preset(Direction::Buy, 25));
        assert_eq!("confirm_sell".parse::<Action>().unwrap(), Action::Confirm(Direction::Sell));
        assert_eq!("set_gas_fast".parse::<Action>().unwrap(), Action::SetGas(GasMode::Fast));
        assert_eq!(Action::MainMenu.code(), "back_main");
    }

    #[test]
    fn test_unknown_codes_are_rejected() {
        for code in ["", "buy", "hodl_flow", "buy_pct_33", "set_slip_2", "set_gas_warp", "confirm_swap"] {
            assert!(code.parse::<Action>().is_err(), "{} should not parse", code);
        }
    }
}
