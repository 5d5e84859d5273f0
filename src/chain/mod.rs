//! Chain gateway
//!
//! Uniform request/response surface over the node: contract reads, quotes and the two
//! write calls (approve, swap). Every call is bounded by a timeout and failures are
//! split into [`GatewayError::Reverted`] (the node answered, the call failed) and
//! [`GatewayError::Transport`] / [`GatewayError::Timeout`] (no usable answer).

pub mod abi;
mod rpc;

pub use rpc::RpcGateway;

use crate::wallet::SecureWallet;
use abi::{IERC20, ISwapExecutor};
use alloy::primitives::{Address, Bytes, TxHash, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The call executed and failed (revert, empty return data, bad ABI)
    #[error("call reverted: {0}")]
    Reverted(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no answer within {0}s")]
    Timeout(u64),
}

impl GatewayError {
    /// A revert is a definitive answer, everything else may change on retry
    pub fn is_revert(&self) -> bool {
        matches!(self, GatewayError::Reverted(_))
    }
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// ERC20 metadata needed for display and unit conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Transfer tax advertised by the token contract itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenFee {
    pub percent: Decimal,
    pub receiver: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapKind {
    /// Native in, token out (payable)
    NativeForTokens,
    /// Token in, native out
    TokensForNative,
}

/// Fields every submitted transaction carries explicitly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxParams {
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApproveRequest {
    pub token: Address,
    pub spender: Address,
    pub amount: U256,
    pub tx: TxParams,
}

impl ApproveRequest {
    pub fn calldata(&self) -> Bytes {
        IERC20::approveCall {
            spender: self.spender,
            value: self.amount,
        }
        .abi_encode()
        .into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub kind: SwapKind,
    /// Contract executing the swap (router or fee wrapper)
    pub executor: Address,
    pub amount_in: U256,
    pub min_out: U256,
    pub path: Vec<Address>,
    pub recipient: Address,
    /// Unix timestamp after which the swap must revert
    pub deadline: u64,
    pub tx: TxParams,
}

impl SwapRequest {
    pub fn calldata(&self) -> Bytes {
        let deadline = U256::from(self.deadline);
        match self.kind {
            SwapKind::NativeForTokens => {
                ISwapExecutor::swapExactETHForTokensSupportingFeeOnTransferTokensCall {
                    amountOutMin: self.min_out,
                    path: self.path.clone(),
                    to: self.recipient,
                    deadline,
                }
                .abi_encode()
                .into()
            }
            SwapKind::TokensForNative => {
                ISwapExecutor::swapExactTokensForETHSupportingFeeOnTransferTokensCall {
                    amountIn: self.amount_in,
                    amountOutMin: self.min_out,
                    path: self.path.clone(),
                    to: self.recipient,
                    deadline,
                }
                .abi_encode()
                .into()
            }
        }
    }

    /// Native value attached to the transaction
    pub fn value(&self) -> U256 {
        match self.kind {
            SwapKind::NativeForTokens => self.amount_in,
            SwapKind::TokensForNative => U256::ZERO,
        }
    }
}

/// Final status of a mined transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TxStatus {
    Succeeded,
    Failed,
}

/// Everything the trade session engine needs from the chain
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Output amounts of `getAmountsOut`, last hop only
    async fn quote(&self, amount_in: U256, path: &[Address]) -> GatewayResult<U256>;

    async fn token_meta(&self, token: Address) -> GatewayResult<TokenMeta>;

    /// Best-effort fee introspection, absent getters yield a zero fee
    async fn token_fee(&self, token: Address) -> TokenFee;

    async fn native_balance(&self, owner: Address) -> GatewayResult<U256>;

    async fn balance_of(&self, token: Address, owner: Address) -> GatewayResult<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address)
        -> GatewayResult<U256>;

    /// Current base gas price in wei
    async fn gas_price(&self) -> GatewayResult<u128>;

    /// Pending nonce for `owner`, fetched fresh on every call
    async fn next_nonce(&self, owner: Address) -> GatewayResult<u64>;

    async fn submit_approve(
        &self,
        wallet: &SecureWallet,
        request: ApproveRequest,
    ) -> GatewayResult<TxHash>;

    async fn submit_swap(&self, wallet: &SecureWallet, request: SwapRequest)
        -> GatewayResult<TxHash>;

    /// Block until the transaction is mined or `timeout` elapses
    async fn wait_for_confirmation(&self, tx: TxHash, timeout: Duration)
        -> GatewayResult<TxStatus>;
}
