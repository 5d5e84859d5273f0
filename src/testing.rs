//! Scriptable chain gateway for unit tests

use crate::chain::{
    ApproveRequest, ChainGateway, GatewayError, GatewayResult, SwapRequest, TokenFee, TokenMeta,
    TxStatus,
};
use crate::wallet::SecureWallet;
use alloy::primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// How a scripted path answers `quote`
#[derive(Debug, Clone, Copy)]
pub enum QuoteRule {
    /// out = in * num / den
    Rate { num: u128, den: u128 },
    Revert,
    Transport,
}

/// Gateway calls with side effects, in the order they happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Approve(ApproveRequest),
    WaitForConfirmation(TxHash),
    Swap(SwapRequest),
}

#[derive(Default)]
pub struct MockGateway {
    quotes: Mutex<HashMap<Vec<Address>, QuoteRule>>,
    metas: Mutex<HashMap<Address, TokenMeta>>,
    fees: Mutex<HashMap<Address, TokenFee>>,
    native_balances: Mutex<HashMap<Address, U256>>,
    token_balances: Mutex<HashMap<(Address, Address), U256>>,
    allowances: Mutex<HashMap<(Address, Address), U256>>,
    base_nonce: Mutex<u64>,
    gas_price: Mutex<u128>,
    confirmation: Mutex<Option<GatewayResult<TxStatus>>>,
    reject_swaps: Mutex<Option<String>>,
    calls: Mutex<Vec<Call>>,
    submitted: Mutex<u64>,
}

impl MockGateway {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.gas_price.lock().unwrap() = 1_000_000_000;
        mock
    }

    pub fn set_quote(&self, path: &[Address], rule: QuoteRule) -> &Self {
        self.quotes.lock().unwrap().insert(path.to_vec(), rule);
        self
    }

    pub fn set_meta(&self, token: Address, symbol: &str, decimals: u8, total_supply: U256) -> &Self {
        self.metas.lock().unwrap().insert(
            token,
            TokenMeta {
                symbol: symbol.to_string(),
                decimals,
                total_supply,
            },
        );
        self
    }

    pub fn set_fee(&self, token: Address, fee: TokenFee) -> &Self {
        self.fees.lock().unwrap().insert(token, fee);
        self
    }

    pub fn set_native_balance(&self, owner: Address, amount: U256) -> &Self {
        self.native_balances.lock().unwrap().insert(owner, amount);
        self
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) -> &Self {
        self.token_balances.lock().unwrap().insert((token, owner), amount);
        self
    }

    /// Allowance keyed by token and owner; the spender is not checked
    pub fn set_allowance(&self, token: Address, owner: Address, amount: U256) -> &Self {
        self.allowances.lock().unwrap().insert((token, owner), amount);
        self
    }

    pub fn set_base_nonce(&self, nonce: u64) -> &Self {
        *self.base_nonce.lock().unwrap() = nonce;
        self
    }

    pub fn set_gas_price(&self, price: u128) -> &Self {
        *self.gas_price.lock().unwrap() = price;
        self
    }

    /// Outcome of every `wait_for_confirmation`, success when unset
    pub fn set_confirmation(&self, outcome: GatewayResult<TxStatus>) -> &Self {
        *self.confirmation.lock().unwrap() = Some(outcome);
        self
    }

    pub fn reject_swaps(&self, reason: &str) -> &Self {
        *self.reject_swaps.lock().unwrap() = Some(reason.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn swaps(&self) -> Vec<SwapRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Swap(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    fn next_hash(&self) -> TxHash {
        let mut submitted = self.submitted.lock().unwrap();
        *submitted += 1;
        B256::with_last_byte(*submitted as u8)
    }
}

#[async_trait]
impl ChainGateway for MockGateway {
    async fn quote(&self, amount_in: U256, path: &[Address]) -> GatewayResult<U256> {
        let rule = self.quotes.lock().unwrap().get(path).copied();
        match rule {
            Some(QuoteRule::Rate { num, den }) => Ok(amount_in * U256::from(num) / U256::from(den)),
            Some(QuoteRule::Transport) => Err(GatewayError::Transport("connection refused".into())),
            Some(QuoteRule::Revert) | None => {
                Err(GatewayError::Reverted("PancakeLibrary: INSUFFICIENT_LIQUIDITY".into()))
            }
        }
    }

    async fn token_meta(&self, token: Address) -> GatewayResult<TokenMeta> {
        self.metas
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| GatewayError::Reverted("execution reverted".into()))
    }

    async fn token_fee(&self, token: Address) -> TokenFee {
        self.fees.lock().unwrap().get(&token).cloned().unwrap_or_default()
    }

    async fn native_balance(&self, owner: Address) -> GatewayResult<U256> {
        Ok(self
            .native_balances
            .lock()
            .unwrap()
            .get(&owner)
            .copied()
            .unwrap_or_default())
    }

    async fn balance_of(&self, token: Address, owner: Address) -> GatewayResult<U256> {
        Ok(self
            .token_balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        _spender: Address,
    ) -> GatewayResult<U256> {
        Ok(self
            .allowances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn gas_price(&self) -> GatewayResult<u128> {
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn next_nonce(&self, _owner: Address) -> GatewayResult<u64> {
        // Mined count lags behind submissions, like a node that has not seen the approval yet
        Ok(*self.base_nonce.lock().unwrap())
    }

    async fn submit_approve(
        &self,
        _wallet: &SecureWallet,
        request: ApproveRequest,
    ) -> GatewayResult<TxHash> {
        self.calls.lock().unwrap().push(Call::Approve(request));
        Ok(self.next_hash())
    }

    async fn submit_swap(
        &self,
        _wallet: &SecureWallet,
        request: SwapRequest,
    ) -> GatewayResult<TxHash> {
        self.calls.lock().unwrap().push(Call::Swap(request));
        if let Some(reason) = self.reject_swaps.lock().unwrap().clone() {
            return Err(GatewayError::Reverted(reason));
        }
        Ok(self.next_hash())
    }

    async fn wait_for_confirmation(
        &self,
        tx: TxHash,
        _timeout: Duration,
    ) -> GatewayResult<TxStatus> {
        self.calls.lock().unwrap().push(Call::WaitForConfirmation(tx));
        self.confirmation
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(Ok(TxStatus::Succeeded))
    }
}
