//! Execution pipeline
//!
//! Turns a confirmed [`PendingTrade`] into chain transactions:
//! - buy: quote, submit the native-in swap, record the fill
//! - sell: approve the executor if needed and wait for it to be mined, then quote,
//!   submit the token-in swap and record the sale
//!
//! Swaps are fire-and-report: the pipeline returns once the swap is accepted by the
//! node. Only the approval is awaited, with a bounded timeout. Every step failure
//! aborts the attempt before the ledger is touched.

mod journal;

pub use journal::{JournalEntry, TradeJournal};

use crate::chain::{ApproveRequest, ChainGateway, GatewayError, SwapKind, SwapRequest, TxParams, TxStatus};
use crate::config::{ChainConfig, TradingConfig};
use crate::custody::{UserId, UserProfile, UserSettings};
use crate::market::{PathResolver, Quote, QuoteEngine};
use crate::portfolio::Ledger;
use crate::tokens::to_decimal;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::{Address, TxHash, U256};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

/// A trade the user reviewed and may now confirm.
///
/// `amount` is in the input asset's smallest unit: native wei for a buy,
/// token units for a sell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTrade {
    pub id: Uuid,
    pub direction: Direction,
    pub token: Address,
    pub symbol: String,
    pub decimals: u8,
    pub amount: U256,
    /// Output quoted when the trade was prepared, display only
    pub expected_out: U256,
}

/// Outcome of a submitted trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub trade_id: Uuid,
    pub direction: Direction,
    pub token: Address,
    pub symbol: String,
    pub swap_tx: TxHash,
    pub approval_tx: Option<TxHash>,
    pub quote: Quote,
    /// False when the swap went out but the ledger could not be saved
    pub ledger_synced: bool,
}

/// What happened before a failure, for the journal
#[derive(Default)]
struct Progress {
    quote: Option<Quote>,
    approval_tx: Option<TxHash>,
    swap_tx: Option<TxHash>,
}

pub struct ExecutionPipeline {
    gateway: Arc<dyn ChainGateway>,
    resolver: PathResolver,
    quotes: QuoteEngine,
    ledger: Ledger,
    journal: Option<TradeJournal>,
    executor: Address,
    trading: TradingConfig,
}

impl ExecutionPipeline {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        resolver: PathResolver,
        ledger: Ledger,
        journal: Option<TradeJournal>,
        chain: &ChainConfig,
        trading: TradingConfig,
    ) -> Self {
        Self {
            quotes: QuoteEngine::new(gateway.clone()),
            gateway,
            resolver,
            ledger,
            journal,
            executor: chain.executor(),
            trading,
        }
    }

    /// Run one trade attempt. Call at most once per confirmed user action.
    ///
    /// `fill_price_usd` is the token price recorded as cost basis for a buy;
    /// unknown prices are recorded as zero.
    pub async fn execute(
        &self,
        profile: &UserProfile,
        trade: &PendingTrade,
        fill_price_usd: Option<Decimal>,
    ) -> Result<ExecutionReport> {
        let mut progress = Progress::default();
        let result = match profile.wallet() {
            Ok(wallet) => match trade.direction {
                Direction::Buy => {
                    self.buy(profile, &wallet, trade, fill_price_usd, &mut progress)
                        .await
                }
                Direction::Sell => self.sell(profile, &wallet, trade, &mut progress).await,
            },
            Err(e) => Err(e),
        };

        match &result {
            Ok(report) => tracing::info!(
                user_id = profile.user_id,
                trade_id = %trade.id,
                direction = trade.direction.as_str(),
                token = %trade.token,
                tx_hash = %report.swap_tx,
                ledger_synced = report.ledger_synced,
                "Trade submitted"
            ),
            Err(e) => tracing::warn!(
                user_id = profile.user_id,
                trade_id = %trade.id,
                direction = trade.direction.as_str(),
                token = %trade.token,
                error = %e,
                "Trade aborted"
            ),
        }

        if let Some(journal) = &self.journal {
            journal
                .record(&journal_entry(profile.user_id, trade, &progress, &result))
                .await;
        }
        result
    }

    async fn buy(
        &self,
        profile: &UserProfile,
        wallet: &SecureWallet,
        trade: &PendingTrade,
        fill_price_usd: Option<Decimal>,
        progress: &mut Progress,
    ) -> Result<ExecutionReport> {
        let route = self.resolver.resolve(trade.token).await?;
        let quote = self
            .quotes
            .quote_buy(trade.amount, &route, profile.settings.slippage)
            .await?;
        progress.quote = Some(quote.clone());

        let gas_price = self.gas_price(&profile.settings).await?;
        let nonce = self.fresh_nonce(wallet.address()).await?;

        let request = SwapRequest {
            kind: SwapKind::NativeForTokens,
            executor: self.executor,
            amount_in: trade.amount,
            min_out: quote.min_out,
            path: quote.path.clone(),
            recipient: wallet.address(),
            deadline: self.deadline(),
            tx: TxParams {
                nonce,
                gas_limit: self.trading.gas_limits.buy,
                gas_price,
            },
        };
        let swap_tx = self
            .gateway
            .submit_swap(wallet, request)
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;
        progress.swap_tx = Some(swap_tx);

        // Quoted output stands in for the mined amount
        let acquired = to_decimal(quote.expected_out, trade.decimals).unwrap_or_default();
        let price = fill_price_usd.unwrap_or(Decimal::ZERO);
        let ledger_synced = self.sync_ledger(
            profile.user_id,
            self.ledger
                .record_buy(profile.user_id, trade.token, &trade.symbol, acquired, price)
                .await,
        );

        Ok(ExecutionReport {
            trade_id: trade.id,
            direction: Direction::Buy,
            token: trade.token,
            symbol: trade.symbol.clone(),
            swap_tx,
            approval_tx: None,
            quote,
            ledger_synced,
        })
    }

    async fn sell(
        &self,
        profile: &UserProfile,
        wallet: &SecureWallet,
        trade: &PendingTrade,
        progress: &mut Progress,
    ) -> Result<ExecutionReport> {
        let owner = wallet.address();
        let route = self.resolver.resolve(trade.token).await?;

        let allowance = self
            .gateway
            .allowance(trade.token, owner, self.executor)
            .await
            .map_err(|e| Error::Chain(format!("allowance: {}", e)))?;

        let approval = if allowance < trade.amount {
            Some(self.approve_and_wait(profile, wallet, trade, progress).await?)
        } else {
            None
        };

        let quote = self
            .quotes
            .quote_sell(trade.amount, &route, profile.settings.slippage)
            .await?;
        progress.quote = Some(quote.clone());

        let gas_price = self.gas_price(&profile.settings).await?;
        let mut nonce = self.fresh_nonce(owner).await?;
        if let Some((_, approve_nonce)) = approval {
            // A lagging node may not count the mined approval yet
            nonce = nonce.max(approve_nonce + 1);
        }

        let request = SwapRequest {
            kind: SwapKind::TokensForNative,
            executor: self.executor,
            amount_in: trade.amount,
            min_out: quote.min_out,
            path: quote.path.clone(),
            recipient: owner,
            deadline: self.deadline(),
            tx: TxParams {
                nonce,
                gas_limit: self.trading.gas_limits.sell,
                gas_price,
            },
        };
        let swap_tx = self
            .gateway
            .submit_swap(wallet, request)
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;
        progress.swap_tx = Some(swap_tx);

        let sold = to_decimal(trade.amount, trade.decimals).unwrap_or_default();
        let ledger_synced = self.sync_ledger(
            profile.user_id,
            self.ledger
                .record_sell(profile.user_id, trade.token, sold)
                .await,
        );

        Ok(ExecutionReport {
            trade_id: trade.id,
            direction: Direction::Sell,
            token: trade.token,
            symbol: trade.symbol.clone(),
            swap_tx,
            approval_tx: approval.map(|(hash, _)| hash),
            quote,
            ledger_synced,
        })
    }

    /// Approve the executor for the maximum amount and block until mined.
    ///
    /// Returns the approval hash and the nonce it consumed.
    async fn approve_and_wait(
        &self,
        profile: &UserProfile,
        wallet: &SecureWallet,
        trade: &PendingTrade,
        progress: &mut Progress,
    ) -> Result<(TxHash, u64)> {
        let gas_price = self.gas_price(&profile.settings).await?;
        let nonce = self.fresh_nonce(wallet.address()).await?;

        let request = ApproveRequest {
            token: trade.token,
            spender: self.executor,
            amount: U256::MAX,
            tx: TxParams {
                nonce,
                gas_limit: self.trading.gas_limits.approve,
                gas_price,
            },
        };
        let approval_tx = self
            .gateway
            .submit_approve(wallet, request)
            .await
            .map_err(|e| Error::Submission(format!("approval: {}", e)))?;
        progress.approval_tx = Some(approval_tx);

        let timeout = Duration::from_secs(self.trading.approval_timeout_secs);
        tracing::info!(user_id = profile.user_id, tx_hash = %approval_tx, "Waiting for approval");

        match self.gateway.wait_for_confirmation(approval_tx, timeout).await {
            Ok(TxStatus::Succeeded) => Ok((approval_tx, nonce)),
            Ok(TxStatus::Failed) => Err(Error::Submission(format!(
                "approval {} reverted",
                approval_tx
            ))),
            Err(GatewayError::Timeout(_)) => Err(Error::ApprovalTimeout {
                tx_hash: approval_tx.to_string(),
                timeout_secs: self.trading.approval_timeout_secs,
            }),
            Err(e) => Err(Error::Chain(format!("approval {}: {}", approval_tx, e))),
        }
    }

    async fn gas_price(&self, settings: &UserSettings) -> Result<u128> {
        let base = self
            .gateway
            .gas_price()
            .await
            .map_err(|e| Error::Chain(format!("gas price: {}", e)))?;
        Ok(settings.gas_mode.apply(base))
    }

    async fn fresh_nonce(&self, owner: Address) -> Result<u64> {
        self.gateway
            .next_nonce(owner)
            .await
            .map_err(|e| Error::Chain(format!("nonce: {}", e)))
    }

    fn deadline(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        now + self.trading.deadline_grace_secs
    }

    fn sync_ledger(&self, user_id: UserId, outcome: Result<()>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(user_id, error = %e, "Swap submitted but ledger update failed");
                false
            }
        }
    }
}

fn journal_entry(
    user_id: UserId,
    trade: &PendingTrade,
    progress: &Progress,
    result: &Result<ExecutionReport>,
) -> JournalEntry {
    JournalEntry {
        trade_id: trade.id,
        timestamp: Utc::now(),
        user_id,
        direction: trade.direction,
        token: trade.token,
        amount_in: trade.amount,
        expected_out: progress.quote.as_ref().map(|q| q.expected_out),
        min_out: progress.quote.as_ref().map(|q| q.min_out),
        approval_tx: progress.approval_tx,
        swap_tx: progress.swap_tx,
        status: if result.is_ok() { "submitted" } else { "failed" },
        error: result.as_ref().err().map(|e| e.to_string()),
    }
}
