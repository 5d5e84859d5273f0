//! Session engine
//!
//! One transition function per inbound event kind. Each user has a slot guarded
//! by its own async mutex, held for the whole event: two events of one user never
//! interleave, different users never contend. Chain reads happen inside the lock,
//! which is fine because only that user's slot is held.

use super::action::Action;
use super::reply::{self, Button, Reply};
use super::state::{Step, StepKind, UserSlot};
use crate::chain::ChainGateway;
use crate::config::{ChainConfig, Config};
use crate::custody::{KeyStore, Slippage, UserId, UserProfile, UserSettings};
use crate::execution::{Direction, ExecutionPipeline, PendingTrade, TradeJournal};
use crate::market::{HolderLookup, Market, Quote, RiskReport, TokenSnapshot};
use crate::portfolio::{Ledger, PortfolioValuation, PositionValuation};
use crate::tokens::{format_units, percent_of, to_decimal, to_raw, NATIVE_DECIMALS};
use crate::transport::Payload;
use crate::wallet::looks_like_secret_key;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use dashmap::DashMap;
use rust_decimal::Decimal;
use secrecy::SecretString;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

const NO_CONTEXT: &str = "No active trade context. Use the menu below.";

pub struct SessionEngine {
    store: Arc<dyn KeyStore>,
    gateway: Arc<dyn ChainGateway>,
    market: Market,
    pipeline: ExecutionPipeline,
    chain: ChainConfig,
    default_settings: UserSettings,
    slots: DashMap<UserId, Arc<Mutex<UserSlot>>>,
}

impl SessionEngine {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn ChainGateway>,
        store: Arc<dyn KeyStore>,
        holders: Arc<dyn HolderLookup>,
        journal: Option<TradeJournal>,
    ) -> Result<Self> {
        let market = Market::new(config, gateway.clone(), holders)?;
        let pipeline = ExecutionPipeline::new(
            gateway.clone(),
            market.resolver.clone(),
            Ledger::new(store.clone()),
            journal,
            &config.chain,
            config.trading.clone(),
        );
        let default_settings = UserSettings {
            slippage: Slippage::from_bps(config.trading.default_slippage_bps)?,
            ..UserSettings::default()
        };

        Ok(Self {
            store,
            gateway,
            market,
            pipeline,
            chain: config.chain.clone(),
            default_settings,
            slots: DashMap::new(),
        })
    }

    /// Entry point for every inbound event
    pub async fn handle_event(&self, user_id: UserId, payload: &Payload) -> Reply {
        match payload {
            Payload::Text(text) => self.handle_text(user_id, text).await,
            Payload::Action(code) => match code.parse::<Action>() {
                Ok(action) => self.handle_action(user_id, action).await,
                Err(_) => {
                    tracing::debug!(user_id, code = %code, "Ignoring unknown action code");
                    let has_wallet = self.has_wallet(user_id).await;
                    Reply::text(NO_CONTEXT).with_main_menu(has_wallet)
                }
            },
            Payload::Unknown => {
                let has_wallet = self.has_wallet(user_id).await;
                Reply::text("Use the menu buttons below.").with_main_menu(has_wallet)
            }
        }
    }

    pub async fn handle_text(&self, user_id: UserId, text: &str) -> Reply {
        let handle = self.slot(user_id);
        let reply = {
            let mut slot = handle.lock().await;
            self.on_text(user_id, text.trim(), &mut slot).await
        };
        drop(handle);
        self.evict_if_idle(user_id);
        reply
    }

    pub async fn handle_action(&self, user_id: UserId, action: Action) -> Reply {
        let handle = self.slot(user_id);
        let reply = {
            let mut slot = handle.lock().await;
            self.on_action(user_id, action, &mut slot).await
        };
        drop(handle);
        self.evict_if_idle(user_id);
        reply
    }

    async fn on_text(&self, user_id: UserId, text: &str, slot: &mut UserSlot) -> Reply {
        match slot.step.clone() {
            Some(Step::AwaitingSecretKey) => self.connect_wallet(user_id, text, slot).await,
            Some(Step::AwaitingToken(direction)) => {
                self.review_token(user_id, direction, text, slot).await
            }
            Some(Step::AwaitingAmount {
                direction,
                snapshot,
            }) => self.custom_amount(user_id, direction, &snapshot, text, slot).await,
            Some(Step::AwaitingProceed { .. }) | None => {
                let has_wallet = self.has_wallet(user_id).await;
                if text == "/start" {
                    Reply::text("Welcome to the swap desk.\nUse the menu below.").with_main_menu(has_wallet)
                } else {
                    Reply::text("Use the menu buttons below.").with_main_menu(has_wallet)
                }
            }
        }
    }

    async fn on_action(&self, user_id: UserId, action: Action, slot: &mut UserSlot) -> Reply {
        tracing::debug!(user_id, action = %action, step = ?slot.step.as_ref().map(Step::kind), "Handling action");

        match action {
            Action::ConnectWallet => {
                slot.reset();
                slot.step = Some(Step::AwaitingSecretKey);
                Reply::text(
                    "Send your PRIVATE KEY.\n\nUse a fresh wallet. You are responsible for your funds.",
                )
                .with_keyboard(vec![vec![Button::new("Cancel", Action::Cancel)]])
            }
            Action::Disconnect => self.disconnect(user_id, slot).await,
            Action::Wallet => self.wallet_view(user_id).await,
            Action::Help => reply::help(self.has_wallet(user_id).await),
            Action::MainMenu => {
                Reply::text("Main menu:").with_main_menu(self.has_wallet(user_id).await)
            }
            Action::TradeMenu => match self.require_profile(user_id).await {
                Ok(_) => reply::trade_menu(),
                Err(reply) => reply,
            },
            Action::Settings => {
                let settings = match self.store.load(user_id).await {
                    Ok(Some(profile)) => profile.settings,
                    _ => self.default_settings,
                };
                reply::settings(&settings)
            }
            Action::SetSlippage(percent) => {
                self.update_settings(user_id, |settings| {
                    settings.slippage = Slippage::from_percent(percent)?;
                    Ok(())
                })
                .await
            }
            Action::SetGas(mode) => {
                self.update_settings(user_id, |settings| {
                    settings.gas_mode = mode;
                    Ok(())
                })
                .await
            }
            Action::Portfolio => self.portfolio_view(user_id).await,
            Action::StartFlow(direction) => {
                if let Err(reply) = self.require_profile(user_id).await {
                    return reply;
                }
                slot.reset();
                slot.step = Some(Step::AwaitingToken(direction));
                Reply::text(format!(
                    "Send the token contract address to {}:",
                    direction.label()
                ))
                .with_keyboard(vec![vec![Button::new("Cancel", Action::Cancel)]])
            }
            Action::Refresh(direction) => self.refresh(user_id, direction, false, slot).await,
            Action::Risk(direction) => self.refresh(user_id, direction, true, slot).await,
            Action::Proceed(direction) => self.proceed(user_id, direction, slot).await,
            Action::Preset(direction, percent) => {
                self.preset(user_id, direction, percent, slot).await
            }
            Action::Confirm(direction) => self.confirm(user_id, direction, slot).await,
            Action::Cancel => {
                slot.reset();
                Reply::text("Trade cancelled.").with_main_menu(self.has_wallet(user_id).await)
            }
        }
    }

    /// Current step of a user, `None` when idle
    pub async fn step_kind(&self, user_id: UserId) -> Option<StepKind> {
        let slot = self.slots.get(&user_id).map(|s| s.clone())?;
        let slot = slot.lock().await;
        slot.step.as_ref().map(Step::kind)
    }

    pub async fn pending(&self, user_id: UserId) -> Option<PendingTrade> {
        let slot = self.slots.get(&user_id).map(|s| s.clone())?;
        let slot = slot.lock().await;
        slot.pending.clone()
    }

    fn slot(&self, user_id: UserId) -> Arc<Mutex<UserSlot>> {
        self.slots.entry(user_id).or_default().clone()
    }

    /// Drop the slot of an idle user nobody else is waiting on
    fn evict_if_idle(&self, user_id: UserId) {
        // The shard lock held by `remove_if` keeps `slot()` from cloning it meanwhile
        let evicted = self.slots.remove_if(&user_id, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().map(|s| s.is_idle()).unwrap_or(false)
        });
        if evicted.is_some() {
            tracing::trace!(user_id, "Idle session slot evicted");
        }
    }

    async fn has_wallet(&self, user_id: UserId) -> bool {
        match self.store.load(user_id).await {
            Ok(profile) => profile.is_some(),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Failed to load profile");
                false
            }
        }
    }

    /// Profile of a connected user, or the reply explaining why there is none
    async fn require_profile(&self, user_id: UserId) -> std::result::Result<UserProfile, Reply> {
        match self.store.load(user_id).await {
            Ok(Some(profile)) => Ok(profile),
            Ok(None) => Err(Reply::text("Connect a wallet first.").with_main_menu(false)),
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to load profile");
                Err(Reply::text(format!("Could not load your wallet: {}", e)).with_main_menu(false))
            }
        }
    }

    async fn connect_wallet(&self, user_id: UserId, text: &str, slot: &mut UserSlot) -> Reply {
        let retry = || vec![vec![Button::new("Cancel", Action::Cancel)]];
        if !looks_like_secret_key(text) {
            return Reply::text("Invalid private key format. Send it again.").with_keyboard(retry());
        }
        let profile = match UserProfile::connect(
            user_id,
            SecretString::from(text.to_string()),
            self.default_settings,
        ) {
            Ok(profile) => profile,
            Err(_) => {
                return Reply::text("Could not parse this private key.").with_keyboard(retry());
            }
        };

        slot.reset();
        if let Err(e) = self.store.save(&profile).await {
            tracing::error!(user_id, error = %e, "Failed to store new wallet");
            return Reply::text(format!("Could not store the wallet: {}", e)).with_main_menu(false);
        }
        tracing::info!(user_id, address = %profile.address, "Wallet connected");
        Reply::text(format!("Wallet connected!\nAddress:\n{}", profile.address)).with_main_menu(true)
    }

    async fn disconnect(&self, user_id: UserId, slot: &mut UserSlot) -> Reply {
        slot.reset();
        match self.store.remove(user_id).await {
            Ok(()) => {
                tracing::info!(user_id, "Wallet disconnected");
                Reply::text("Wallet disconnected.").with_main_menu(false)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to erase wallet");
                Reply::text(format!("Could not erase the wallet: {}", e))
                    .with_main_menu(self.has_wallet(user_id).await)
            }
        }
    }

    async fn wallet_view(&self, user_id: UserId) -> Reply {
        let profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => return reply,
        };
        let balance = match self.gateway.native_balance(profile.address).await {
            Ok(raw) => format_units(raw, u32::from(NATIVE_DECIMALS)),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Balance read failed");
                "unknown".to_string()
            }
        };
        Reply::text(format!(
            "Wallet\n\nAddress:\n{}\n\n{} Balance: {}",
            profile.address, self.chain.native_symbol, balance
        ))
        .with_main_menu(true)
    }

    async fn update_settings<F>(&self, user_id: UserId, change: F) -> Reply
    where
        F: FnOnce(&mut UserSettings) -> Result<()>,
    {
        let mut profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => return reply,
        };
        if let Err(e) = change(&mut profile.settings) {
            return Reply::text(e.to_string()).with_main_menu(true);
        }
        if let Err(e) = self.store.save(&profile).await {
            tracing::error!(user_id, error = %e, "Failed to save settings");
            return Reply::text(format!("Could not save settings: {}", e)).with_main_menu(true);
        }
        tracing::info!(
            user_id,
            slippage_bps = profile.settings.slippage.bps(),
            gas_mode = profile.settings.gas_mode.as_str(),
            "Settings updated"
        );
        reply::settings(&profile.settings)
    }

    async fn portfolio_view(&self, user_id: UserId) -> Reply {
        let profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => return reply,
        };
        let rows = futures::future::join_all(profile.positions.iter().map(|(token, position)| async move {
            let price = match self.market.snapshots.snapshot(*token).await {
                Ok(snapshot) => snapshot.price_usd,
                Err(e) => {
                    tracing::debug!(user_id, token = %token, error = %e, "Position left unpriced");
                    None
                }
            };
            PositionValuation::new(*token, position, price)
        }))
        .await;
        reply::portfolio(&PortfolioValuation::from_rows(rows))
    }

    /// Held amount of the reviewed token, in human units
    async fn token_balance(&self, owner: Address, snapshot: &TokenSnapshot) -> Option<Decimal> {
        match self.gateway.balance_of(snapshot.address, owner).await {
            Ok(raw) => to_decimal(raw, snapshot.decimals),
            Err(e) => {
                tracing::debug!(token = %snapshot.address, error = %e, "Token balance unavailable");
                None
            }
        }
    }

    async fn sell_balance(&self, user_id: UserId, direction: Direction, snapshot: &TokenSnapshot) -> Option<Decimal> {
        if direction != Direction::Sell {
            return None;
        }
        let profile = self.store.load(user_id).await.ok().flatten()?;
        self.token_balance(profile.address, snapshot).await
    }

    async fn review_token(
        &self,
        user_id: UserId,
        direction: Direction,
        text: &str,
        slot: &mut UserSlot,
    ) -> Reply {
        let token = match Address::from_str(text) {
            Ok(token) => token,
            Err(_) => {
                return Reply::text("Invalid contract address. Send again.")
                    .with_keyboard(vec![vec![Button::new("Cancel", Action::Cancel)]]);
            }
        };
        self.show_review(user_id, direction, token, false, slot).await
    }

    /// Fresh snapshot into the review step; a failed snapshot ends the flow
    async fn show_review(
        &self,
        user_id: UserId,
        direction: Direction,
        token: Address,
        with_risk: bool,
        slot: &mut UserSlot,
    ) -> Reply {
        let snapshot = match self.market.snapshots.snapshot(token).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                slot.reset();
                tracing::info!(user_id, token = %token, error = %e, "Token review aborted");
                return Reply::text(format!("Error reading token info: {}", e)).with_main_menu(true);
            }
        };

        let report = match (with_risk, &snapshot.route) {
            (true, Some(route)) => Some(self.market.risk.assess(route).await),
            (true, None) => Some(RiskReport::Failed("no route to the native asset".to_string())),
            (false, _) => None,
        };
        let balance = self.sell_balance(user_id, direction, &snapshot).await;
        let reply = reply::overview(direction, &snapshot, balance, report.as_ref());

        slot.pending = None;
        slot.step = Some(Step::AwaitingProceed {
            direction,
            snapshot: Box::new(snapshot),
        });
        reply
    }

    async fn refresh(
        &self,
        user_id: UserId,
        direction: Direction,
        with_risk: bool,
        slot: &mut UserSlot,
    ) -> Reply {
        let token = match slot.step.as_ref().and_then(|s| s.reviewed(direction)) {
            Some(snapshot) => snapshot.address,
            None => return Reply::text(NO_CONTEXT).with_main_menu(self.has_wallet(user_id).await),
        };
        self.show_review(user_id, direction, token, with_risk, slot).await
    }

    async fn proceed(&self, user_id: UserId, direction: Direction, slot: &mut UserSlot) -> Reply {
        let snapshot = match &slot.step {
            Some(Step::AwaitingProceed {
                direction: d,
                snapshot,
            }) if *d == direction => snapshot.clone(),
            _ => return Reply::text(NO_CONTEXT).with_main_menu(self.has_wallet(user_id).await),
        };
        let balance = self.sell_balance(user_id, direction, &snapshot).await;
        let reply = reply::amount_prompt(direction, &snapshot.symbol, balance);
        slot.step = Some(Step::AwaitingAmount { direction, snapshot });
        reply
    }

    /// Percentage of the live balance, straight to confirmation
    async fn preset(
        &self,
        user_id: UserId,
        direction: Direction,
        percent: u8,
        slot: &mut UserSlot,
    ) -> Reply {
        let snapshot = match slot.step.as_ref().and_then(|s| s.reviewed(direction)) {
            Some(snapshot) => snapshot.clone(),
            None => {
                return Reply::text("No token context for preset. Start the trade again.")
                    .with_main_menu(self.has_wallet(user_id).await)
            }
        };
        let profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => return reply,
        };

        let (balance, symbol) = match direction {
            Direction::Buy => (
                self.gateway.native_balance(profile.address).await,
                self.chain.native_symbol.as_str(),
            ),
            Direction::Sell => (
                self.gateway.balance_of(snapshot.address, profile.address).await,
                snapshot.symbol.as_str(),
            ),
        };
        let balance = match balance {
            Ok(balance) => balance,
            Err(e) => return Reply::text(format!("Could not read your balance: {}", e)),
        };
        let amount = percent_of(balance, percent);
        if amount.is_zero() {
            return Reply::text(format!("{} balance too low for this preset.", symbol));
        }

        self.prepare(&profile, direction, &snapshot, amount, slot).await
    }

    async fn custom_amount(
        &self,
        user_id: UserId,
        direction: Direction,
        snapshot: &TokenSnapshot,
        text: &str,
        slot: &mut UserSlot,
    ) -> Reply {
        let decimals = match direction {
            Direction::Buy => NATIVE_DECIMALS,
            Direction::Sell => snapshot.decimals,
        };
        let amount = match parse_amount(text, decimals) {
            Ok(amount) => amount,
            Err(e) => return Reply::text(format!("{}. Send a positive number.", e)),
        };
        let profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => {
                slot.reset();
                return reply;
            }
        };
        self.prepare(&profile, direction, snapshot, amount, slot).await
    }

    async fn quote(&self, direction: Direction, token: Address, amount: U256, slippage: Slippage) -> Result<Quote> {
        let route = self.market.resolver.resolve(token).await?;
        match direction {
            Direction::Buy => self.market.quotes.quote_buy(amount, &route, slippage).await,
            Direction::Sell => self.market.quotes.quote_sell(amount, &route, slippage).await,
        }
    }

    /// Quote the trade and park it as the single pending trade of this user
    async fn prepare(
        &self,
        profile: &UserProfile,
        direction: Direction,
        snapshot: &TokenSnapshot,
        amount: U256,
        slot: &mut UserSlot,
    ) -> Reply {
        // Slippage is read from the freshly loaded profile on every quote
        let quote = match self
            .quote(direction, snapshot.address, amount, profile.settings.slippage)
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                tracing::info!(user_id = profile.user_id, token = %snapshot.address, error = %e, "Quote failed");
                let text = format!("Error quoting {}: {}", direction.as_str(), e);
                if e.is_retryable() {
                    return Reply::text(text)
                        .with_keyboard(vec![vec![Button::new("Cancel", Action::Cancel)]]);
                }
                slot.reset();
                return Reply::text(text).with_main_menu(true);
            }
        };

        let trade = PendingTrade {
            id: Uuid::new_v4(),
            direction,
            token: snapshot.address,
            symbol: snapshot.symbol.clone(),
            decimals: snapshot.decimals,
            amount,
            expected_out: quote.expected_out,
        };
        tracing::info!(
            user_id = profile.user_id,
            trade_id = %trade.id,
            direction = direction.as_str(),
            token = %trade.token,
            amount = %amount,
            "Trade prepared"
        );

        let reply = reply::confirmation(&trade, &quote, &profile.settings, snapshot);
        slot.step = None;
        slot.pending = Some(trade);
        reply
    }

    async fn confirm(&self, user_id: UserId, direction: Direction, slot: &mut UserSlot) -> Reply {
        // Taken before anything else so no outcome can leave it behind
        let trade = match slot.take_pending(direction) {
            Some(trade) => trade,
            None => {
                return Reply::text(format!("No pending {} trade.", direction.label()))
                    .with_main_menu(self.has_wallet(user_id).await)
            }
        };
        slot.step = None;

        let profile = match self.require_profile(user_id).await {
            Ok(profile) => profile,
            Err(reply) => return reply,
        };
        let fill_price = match direction {
            Direction::Buy => self
                .market
                .snapshots
                .snapshot(trade.token)
                .await
                .ok()
                .and_then(|s| s.price_usd),
            Direction::Sell => None,
        };

        match self.pipeline.execute(&profile, &trade, fill_price).await {
            Ok(report) => reply::submitted(&report, &self.chain.tx_url(&report.swap_tx.to_string())),
            Err(e) => Reply::text(format!("{} failed: {}", direction.label(), e)).with_main_menu(true),
        }
    }
}

/// Parse a human amount into raw units; zero after truncation is rejected
fn parse_amount(text: &str, decimals: u8) -> Result<U256> {
    let invalid = || Error::Validation("Invalid amount".to_string());
    let amount = Decimal::from_str(text).map_err(|_| invalid())?;
    if amount <= Decimal::ZERO {
        return Err(invalid());
    }
    to_raw(amount, decimals)
        .filter(|raw| !raw.is_zero())
        .ok_or_else(|| Error::Validation("Amount is below the smallest unit".to_string()))
}
