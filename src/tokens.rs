//! Shared token registry and unit handling
//!
//! Centralizes well-known BNB Smart Chain addresses and the conversions between
//! raw on-chain integers (smallest unit) and human-readable decimals.
//!
//! All trade math stays in raw `U256`. `Decimal` is only used for display,
//! cost basis and USD prices, and conversions towards raw units always truncate.

use alloy::primitives::{address, Address, U256};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Decimals of the native asset (BNB) and its wrapped form.
pub const NATIVE_DECIMALS: u8 = 18;

/// Chain ID constants
pub mod chains {
    pub const BSC: u64 = 56;
}

/// Well-known addresses on BNB Smart Chain mainnet
pub mod addresses {
    use super::*;

    pub const WBNB: Address = address!("bb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c");
    pub const BUSD: Address = address!("e9e7cea3dedca5984780bafc599bd69add087d56");
    pub const USDT: Address = address!("55d398326f99059ff77548524699939b09a8cb00");
    pub const USDC: Address = address!("8ac76a51cc950d9822d68b83fe1ad97b32cd580d");

    /// PancakeSwap V2 router
    pub const PANCAKE_ROUTER: Address = address!("10ed43c718714eb63d5aa57b78b54704e256024e");

    pub const ZERO_ADDRESS: Address = address!("0000000000000000000000000000000000000000");
}

/// Token metadata
#[derive(Debug, Clone, Copy)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub decimals: u8,
    pub is_stablecoin: bool,
}

impl TokenInfo {
    pub const fn stablecoin(symbol: &'static str, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            is_stablecoin: true,
        }
    }

    pub const fn token(symbol: &'static str, decimals: u8) -> Self {
        Self {
            symbol,
            decimals,
            is_stablecoin: false,
        }
    }
}

/// Token registry providing token info lookups for the route assets
pub struct TokenRegistry {
    tokens: HashMap<Address, TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        use addresses::*;

        let mut tokens = HashMap::new();
        tokens.insert(WBNB, TokenInfo::token("WBNB", 18));
        // BSC-pegged stables all use 18 decimals
        tokens.insert(BUSD, TokenInfo::stablecoin("BUSD", 18));
        tokens.insert(USDT, TokenInfo::stablecoin("USDT", 18));
        tokens.insert(USDC, TokenInfo::stablecoin("USDC", 18));

        Self { tokens }
    }

    pub fn get(&self, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(address)
    }

    /// Symbol for logging; falls back to the checksummed address.
    pub fn label(&self, address: &Address) -> String {
        self.tokens
            .get(address)
            .map(|t| t.symbol.to_string())
            .unwrap_or_else(|| address.to_checksum(None))
    }

    pub fn is_stablecoin(&self, address: &Address) -> bool {
        self.tokens
            .get(address)
            .map(|t| t.is_stablecoin)
            .unwrap_or(false)
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: std::sync::OnceLock<TokenRegistry> = std::sync::OnceLock::new();

/// Get the global token registry
pub fn registry() -> &'static TokenRegistry {
    REGISTRY.get_or_init(TokenRegistry::new)
}

/// Largest mantissa a `Decimal` can carry (2^96 - 1).
fn decimal_mantissa_limit() -> U256 {
    U256::from(u128::MAX >> 32)
}

/// Convert a raw integer amount to human units.
///
/// Digits below the representable precision are truncated. Returns `None`
/// only when the integer part itself does not fit in a `Decimal`.
pub fn to_decimal(raw: U256, decimals: u8) -> Option<Decimal> {
    let ten = U256::from(10u8);
    let mut mantissa = raw;
    let mut scale = decimals as u32;

    while scale > 28 {
        mantissa /= ten;
        scale -= 1;
    }
    while mantissa > decimal_mantissa_limit() {
        if scale == 0 {
            return None;
        }
        mantissa /= ten;
        scale -= 1;
    }

    let m: u128 = mantissa.to::<u128>();
    Decimal::try_from_i128_with_scale(m as i128, scale).ok()
}

/// Convert a human amount to raw units, truncating any excess precision.
///
/// Negative amounts have no raw representation.
pub fn to_raw(amount: Decimal, decimals: u8) -> Option<U256> {
    if amount.is_sign_negative() {
        return None;
    }
    let normalized = amount.normalize();
    let scale = normalized.scale();
    let mantissa = U256::from(normalized.mantissa().unsigned_abs());
    let target = decimals as u32;

    if scale <= target {
        let factor = U256::from(10u8).checked_pow(U256::from(target - scale))?;
        mantissa.checked_mul(factor)
    } else {
        let divisor = U256::from(10u8).pow(U256::from(scale - target));
        Some(mantissa / divisor)
    }
}

/// Format a raw value with decimals, trimming trailing zeros
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        whole.to_string()
    } else {
        let remainder_str = format!("{:0>width$}", remainder, width = decimals as usize);
        let trimmed = remainder_str.trim_end_matches('0');
        if trimmed.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, trimmed)
        }
    }
}

/// Abbreviate a magnitude for display (K/M/B suffixes, 4 significant digits below 1).
///
/// Display only: never feed the result back into computation.
pub fn abbreviate(value: Decimal) -> String {
    if value.is_zero() {
        return "0".to_string();
    }
    let magnitude = value.abs();
    if magnitude >= dec!(1_000_000_000) {
        format!("{:.2}B", value / dec!(1_000_000_000))
    } else if magnitude >= dec!(1_000_000) {
        format!("{:.2}M", value / dec!(1_000_000))
    } else if magnitude >= dec!(1_000) {
        format!("{:.2}K", value / dec!(1_000))
    } else if magnitude >= Decimal::ONE {
        format!("{:.4}", value)
    } else {
        value
            .round_sf(4)
            .unwrap_or(value)
            .normalize()
            .to_string()
    }
}

/// Like [`abbreviate`] but renders missing values as "Unknown".
pub fn abbreviate_opt(value: Option<Decimal>) -> String {
    value.map(abbreviate).unwrap_or_else(|| "Unknown".to_string())
}

/// Apply a whole-number percentage to a raw amount (floor).
pub fn percent_of(raw: U256, percent: u8) -> U256 {
    raw * U256::from(percent) / U256::from(100u8)
}
