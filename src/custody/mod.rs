//! Key custody
//!
//! A keyed record per user holding {secret, derived address, settings, positions}.
//! No record on disk means the user has no wallet. The record is the only state
//! that survives a restart.

mod store;

pub use store::{FileKeyStore, MemoryKeyStore};

use crate::portfolio::PositionBook;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::Address;
use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// Opaque chat-platform user identifier
pub type UserId = i64;

/// Slippage tolerance in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Slippage(u16);

impl Slippage {
    /// Presets offered in the settings view
    pub const PRESETS: [Slippage; 3] = [Slippage(100), Slippage(300), Slippage(500)];

    pub fn from_bps(bps: u16) -> Result<Self> {
        if bps == 0 || bps >= 10_000 {
            return Err(Error::Validation(format!(
                "slippage must be between 0 and 100%, got {} bps",
                bps
            )));
        }
        Ok(Self(bps))
    }

    /// Whole-percent preset (1, 3, 5)
    pub fn from_percent(percent: u8) -> Result<Self> {
        Self::from_bps(u16::from(percent) * 100)
    }

    pub fn bps(&self) -> u16 {
        self.0
    }

    pub fn percent(&self) -> Decimal {
        Decimal::from(self.0) / Decimal::ONE_HUNDRED
    }
}

impl Default for Slippage {
    fn default() -> Self {
        Self(300)
    }
}

impl TryFrom<u16> for Slippage {
    type Error = Error;

    fn try_from(bps: u16) -> Result<Self> {
        Self::from_bps(bps)
    }
}

impl From<Slippage> for u16 {
    fn from(value: Slippage) -> Self {
        value.0
    }
}

/// Gas price multiplier applied on top of the node's base price
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasMode {
    #[default]
    Standard,
    Fast,
    Turbo,
}

impl GasMode {
    pub const ALL: [GasMode; 3] = [GasMode::Standard, GasMode::Fast, GasMode::Turbo];

    /// Multiplier in tenths (1.0, 1.2, 1.5)
    fn tenths(&self) -> u128 {
        match self {
            GasMode::Standard => 10,
            GasMode::Fast => 12,
            GasMode::Turbo => 15,
        }
    }

    /// Scale a base gas price, truncating to whole wei
    pub fn apply(&self, base: u128) -> u128 {
        base.saturating_mul(self.tenths()) / 10
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GasMode::Standard => "standard",
            GasMode::Fast => "fast",
            GasMode::Turbo => "turbo",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GasMode::Standard => "Standard",
            GasMode::Fast => "Fast",
            GasMode::Turbo => "Turbo",
        }
    }
}

impl std::str::FromStr for GasMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(GasMode::Standard),
            "fast" => Ok(GasMode::Fast),
            "turbo" => Ok(GasMode::Turbo),
            other => Err(Error::Validation(format!("unknown gas mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    #[serde(rename = "slippage_bps")]
    pub slippage: Slippage,
    pub gas_mode: GasMode,
}

/// Everything persisted for one user
pub struct UserProfile {
    pub user_id: UserId,
    secret: SecretString,
    pub address: Address,
    pub settings: UserSettings,
    pub positions: PositionBook,
}

impl UserProfile {
    /// Build a profile from a submitted key; the address is derived, never trusted from input
    pub fn connect(user_id: UserId, secret: SecretString, settings: UserSettings) -> Result<Self> {
        let wallet = SecureWallet::from_secret(&secret)?;
        Ok(Self {
            user_id,
            secret,
            address: wallet.address(),
            settings,
            positions: PositionBook::new(),
        })
    }

    /// Signing wallet for this profile
    pub fn wallet(&self) -> Result<SecureWallet> {
        SecureWallet::from_secret(&self.secret)
    }

    fn to_record(&self) -> ProfileRecord {
        ProfileRecord {
            user_id: self.user_id,
            secret: self.secret.expose_secret().to_string(),
            address: self.address,
            settings: self.settings,
            positions: self.positions.clone(),
        }
    }

    fn from_record(record: ProfileRecord) -> Self {
        Self {
            user_id: record.user_id,
            secret: SecretString::from(record.secret),
            address: record.address,
            settings: record.settings,
            positions: record.positions,
        }
    }
}

impl std::fmt::Debug for UserProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserProfile")
            .field("user_id", &self.user_id)
            .field("secret", &"[REDACTED]")
            .field("address", &self.address)
            .field("settings", &self.settings)
            .field("positions", &self.positions.len())
            .finish()
    }
}

/// On-disk layout of a profile
#[derive(Clone, Serialize, Deserialize)]
struct ProfileRecord {
    user_id: UserId,
    secret: String,
    address: Address,
    #[serde(default)]
    settings: UserSettings,
    #[serde(default)]
    positions: PositionBook,
}

/// Durable per-user profile storage
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn load(&self, user_id: UserId) -> Result<Option<UserProfile>>;

    /// Persist the whole profile; must be durable when this returns `Ok`
    async fn save(&self, profile: &UserProfile) -> Result<()>;

    /// Erase every stored field of the user; removing a missing user is not an error
    async fn remove(&self, user_id: UserId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_gas_mode_multipliers() {
        let base = 3_000_000_000u128;
        assert_eq!(GasMode::Standard.apply(base), 3_000_000_000);
        assert_eq!(GasMode::Fast.apply(base), 3_600_000_000);
        assert_eq!(GasMode::Turbo.apply(base), 4_500_000_000);
        // 7 * 1.5 = 10.5 truncates
        assert_eq!(GasMode::Turbo.apply(7), 10);
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(Slippage::from_percent(3).unwrap().bps(), 300);
        assert!(Slippage::from_bps(0).is_err());
        assert!(Slippage::from_bps(10_000).is_err());
        assert_eq!(Slippage::default().percent(), Decimal::from(3));
    }

    #[test]
    fn test_settings_wire_format() {
        let settings = UserSettings {
            slippage: Slippage::from_percent(5).unwrap(),
            gas_mode: GasMode::Turbo,
        };
        let value = serde_json::to_value(settings).unwrap();
        assert_eq!(value, serde_json::json!({"slippage_bps": 500, "gas_mode": "turbo"}));

        let bad = serde_json::json!({"slippage_bps": 0, "gas_mode": "fast"});
        assert!(serde_json::from_value::<UserSettings>(bad).is_err());
    }

    #[test]
    fn test_profile_derives_address_and_redacts() {
        let profile = UserProfile::connect(
            42,
            SecretString::from(TEST_KEY.to_string()),
            UserSettings::default(),
        )
        .unwrap();
        assert_eq!(
            profile.address.to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("ac0974bec"));
        assert!(debug.contains("[REDACTED]"));
    }
}
