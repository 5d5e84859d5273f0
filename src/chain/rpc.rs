//! alloy-backed chain gateway

use super::abi::{IRouterQuoter, IERC20};
use super::{
    ApproveRequest, ChainGateway, GatewayError, GatewayResult, SwapRequest, TokenFee, TokenMeta,
    TxStatus,
};
use crate::config::{ChainConfig, RpcConfig};
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::network::{ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Gateway over a single HTTP JSON-RPC endpoint picked at connect time
pub struct RpcGateway {
    provider: DynProvider,
    url: Url,
    chain_id: u64,
    router: Address,
    call_timeout: Duration,
    poll_interval: Duration,
}

impl RpcGateway {
    /// Connect to the first endpoint that answers with the expected chain id
    pub async fn connect(rpc: &RpcConfig, chain: &ChainConfig, poll_interval: Duration) -> Result<Self> {
        let call_timeout = Duration::from_secs(chain.call_timeout_secs);

        for raw in rpc.urls() {
            let url: Url = match raw.parse() {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(rpc = %raw, error = %e, "Skipping malformed RPC URL");
                    continue;
                }
            };
            let provider = ProviderBuilder::new().connect_http(url.clone()).erased();

            match tokio::time::timeout(call_timeout, provider.get_chain_id()).await {
                Ok(Ok(id)) if id == chain.chain_id => {
                    tracing::info!(rpc = %url.host_str().unwrap_or("?"), chain_id = id, "Connected to RPC");
                    return Ok(Self {
                        provider,
                        url,
                        chain_id: id,
                        router: chain.router,
                        call_timeout,
                        poll_interval,
                    });
                }
                Ok(Ok(id)) => {
                    tracing::warn!(rpc = %raw, expected = chain.chain_id, got = id, "RPC serves the wrong chain");
                }
                Ok(Err(e)) => {
                    tracing::warn!(rpc = %raw, error = %e, "RPC unreachable");
                }
                Err(_) => {
                    tracing::warn!(rpc = %raw, "RPC did not answer eth_chainId in time");
                }
            }
        }

        Err(Error::Chain(format!(
            "none of {} RPC endpoints is usable for chain {}",
            rpc.urls().len(),
            chain.chain_id
        )))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn bounded<T, F>(&self, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| GatewayError::Timeout(self.call_timeout.as_secs()))?
    }

    fn erc20(&self, token: Address) -> IERC20::IERC20Instance<DynProvider> {
        IERC20::new(token, self.provider.clone())
    }

    async fn send(&self, wallet: &SecureWallet, tx: TransactionRequest) -> GatewayResult<TxHash> {
        let signer = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(self.url.clone());

        let pending = self
            .bounded(async { signer.send_transaction(tx).await.map_err(classify_transport) })
            .await?;
        Ok(*pending.tx_hash())
    }

    fn base_request(&self, wallet: &SecureWallet, to: Address, params: super::TxParams) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(wallet.address())
            .with_to(to)
            .with_chain_id(self.chain_id)
            .with_nonce(params.nonce)
            .with_gas_limit(params.gas_limit)
            .with_gas_price(params.gas_price)
    }
}

/// JSON-RPC code geth-style nodes use for a reverted `eth_call`/`eth_estimateGas`
const EXECUTION_REVERTED_CODE: i64 = 3;

fn is_revert_payload(code: i64, message: &str) -> bool {
    code == EXECUTION_REVERTED_CODE || message.to_ascii_lowercase().contains("execution reverted")
}

/// Only an execution revert says something about the contract. Rate limits,
/// missing headers and unsupported methods are node trouble.
fn classify_transport(err: TransportError) -> GatewayError {
    match err {
        RpcError::ErrorResp(payload) if is_revert_payload(payload.code, &payload.message) => {
            GatewayError::Reverted(payload.message.to_string())
        }
        other => GatewayError::Transport(other.to_string()),
    }
}

fn classify_call(err: alloy::contract::Error) -> GatewayError {
    match err {
        alloy::contract::Error::TransportError(e) => classify_transport(e),
        // Decoding failures and empty return data come from the contract, not the link
        other => GatewayError::Reverted(other.to_string()),
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn quote(&self, amount_in: U256, path: &[Address]) -> GatewayResult<U256> {
        let quoter = IRouterQuoter::new(self.router, self.provider.clone());
        let amounts = self
            .bounded(async {
                quoter
                    .getAmountsOut(amount_in, path.to_vec())
                    .call()
                    .await
                    .map_err(classify_call)
            })
            .await?;
        amounts
            .last()
            .copied()
            .ok_or_else(|| GatewayError::Reverted("router returned no amounts".to_string()))
    }

    async fn token_meta(&self, token: Address) -> GatewayResult<TokenMeta> {
        let contract = self.erc20(token);
        let (symbol, decimals, total_supply) = self
            .bounded(async {
                let symbol = async { contract.symbol().call().await };
                let decimals = async { contract.decimals().call().await };
                let supply = async { contract.totalSupply().call().await };
                let (symbol, decimals, supply) = futures::join!(symbol, decimals, supply);
                Ok((
                    symbol.map_err(classify_call)?,
                    decimals.map_err(classify_call)?,
                    supply.map_err(classify_call)?,
                ))
            })
            .await?;
        Ok(TokenMeta {
            symbol,
            decimals,
            total_supply,
        })
    }

    async fn token_fee(&self, token: Address) -> TokenFee {
        let contract = self.erc20(token);

        let basis = match self
            .bounded(async { contract.feeBasisPoints().call().await.map_err(classify_call) })
            .await
        {
            Ok(value) => Some(value),
            Err(_) => self
                .bounded(async { contract.feePercentTimes100().call().await.map_err(classify_call) })
                .await
                .ok(),
        };
        let Some(basis) = basis else {
            return TokenFee::default();
        };

        let percent = u64::try_from(basis)
            .ok()
            .map(|b| Decimal::from(b) / Decimal::from(100))
            .unwrap_or_default();
        let receiver = self
            .bounded(async { contract.feeReceiver().call().await.map_err(classify_call) })
            .await
            .ok();

        tracing::debug!(token = %token, fee_percent = %percent, "Token advertises a transfer fee");
        TokenFee { percent, receiver }
    }

    async fn native_balance(&self, owner: Address) -> GatewayResult<U256> {
        self.bounded(async { self.provider.get_balance(owner).await.map_err(classify_transport) })
            .await
    }

    async fn balance_of(&self, token: Address, owner: Address) -> GatewayResult<U256> {
        let contract = self.erc20(token);
        self.bounded(async { contract.balanceOf(owner).call().await.map_err(classify_call) })
            .await
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> GatewayResult<U256> {
        let contract = self.erc20(token);
        self.bounded(async {
            contract
                .allowance(owner, spender)
                .call()
                .await
                .map_err(classify_call)
        })
        .await
    }

    async fn gas_price(&self) -> GatewayResult<u128> {
        self.bounded(async { self.provider.get_gas_price().await.map_err(classify_transport) })
            .await
    }

    async fn next_nonce(&self, owner: Address) -> GatewayResult<u64> {
        self.bounded(async {
            self.provider
                .get_transaction_count(owner)
                .pending()
                .await
                .map_err(classify_transport)
        })
        .await
    }

    async fn submit_approve(
        &self,
        wallet: &SecureWallet,
        request: ApproveRequest,
    ) -> GatewayResult<TxHash> {
        let tx = self
            .base_request(wallet, request.token, request.tx)
            .with_input(request.calldata());
        let hash = self.send(wallet, tx).await?;
        tracing::info!(tx_hash = %hash, token = %request.token, spender = %request.spender, "Approval submitted");
        Ok(hash)
    }

    async fn submit_swap(
        &self,
        wallet: &SecureWallet,
        request: SwapRequest,
    ) -> GatewayResult<TxHash> {
        let tx = self
            .base_request(wallet, request.executor, request.tx)
            .with_value(request.value())
            .with_input(request.calldata());
        let hash = self.send(wallet, tx).await?;
        tracing::info!(tx_hash = %hash, kind = ?request.kind, nonce = request.tx.nonce, "Swap submitted");
        Ok(hash)
    }

    async fn wait_for_confirmation(
        &self,
        tx: TxHash,
        timeout: Duration,
    ) -> GatewayResult<TxStatus> {
        let poll = async {
            loop {
                match self.provider.get_transaction_receipt(tx).await {
                    Ok(Some(receipt)) => {
                        return if receipt.status() {
                            TxStatus::Succeeded
                        } else {
                            TxStatus::Failed
                        };
                    }
                    Ok(None) => {}
                    // Reads are idempotent, keep polling until the deadline
                    Err(e) => tracing::debug!(tx_hash = %tx, error = %e, "Receipt poll failed"),
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| GatewayError::Timeout(timeout.as_secs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::rpc::json_rpc::ErrorPayload;
    use alloy::transports::TransportErrorKind;

    fn error_resp(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_execution_revert_is_a_revert() {
        let by_code = classify_transport(error_resp(3, "execution reverted: PancakeLibrary: INSUFFICIENT_LIQUIDITY"));
        assert!(by_code.is_revert());

        let by_message = classify_transport(error_resp(-32000, "Execution reverted"));
        assert!(by_message.is_revert());
    }

    #[test]
    fn test_node_errors_are_transport_failures() {
        for (code, message) in [
            (-32005, "limit exceeded"),
            (-32000, "header not found"),
            (-32601, "the method eth_call does not exist/is not available"),
        ] {
            let err = classify_transport(error_resp(code, message));
            assert!(matches!(err, GatewayError::Transport(_)), "{} classified as {:?}", message, err);
        }
        let reset = classify_transport(TransportErrorKind::custom_str("connection reset"));
        assert!(!reset.is_revert());
    }

    #[test]
    fn test_rate_limited_call_is_not_a_revert() {
        let err = classify_call(alloy::contract::Error::TransportError(error_resp(-32005, "limit exceeded")));
        assert!(!err.is_revert());
    }
}
