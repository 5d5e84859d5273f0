//! Best-effort holder counts from the block explorer

use crate::config::HolderLookupConfig;
use crate::Result;
use alloy::primitives::Address;
use async_trait::async_trait;
use std::time::Duration;

/// Off-chain enrichment; `None` means unknown and never fails the caller
#[async_trait]
pub trait HolderLookup: Send + Sync {
    async fn holder_count(&self, token: Address) -> Option<u64>;
}

/// Lookup that always reports unknown
pub struct NoHolderLookup;

#[async_trait]
impl HolderLookup for NoHolderLookup {
    async fn holder_count(&self, _token: Address) -> Option<u64> {
        None
    }
}

/// Scrapes `Holders: N` from the explorer's token page
pub struct ExplorerHolderLookup {
    client: reqwest::Client,
    token_page_url: String,
}

impl ExplorerHolderLookup {
    pub fn new(config: &HolderLookupConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("swap-desk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            token_page_url: config.token_page_url.clone(),
        })
    }

    async fn fetch(&self, token: Address) -> Result<Option<u64>> {
        let url = format!("{}{}", self.token_page_url, token);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            tracing::debug!(token = %token, status = %response.status(), "Explorer refused holder lookup");
            return Ok(None);
        }
        let body = response.text().await?;
        Ok(parse_holder_count(&body))
    }
}

#[async_trait]
impl HolderLookup for ExplorerHolderLookup {
    async fn holder_count(&self, token: Address) -> Option<u64> {
        match self.fetch(token).await {
            Ok(count) => count,
            Err(e) => {
                tracing::debug!(token = %token, error = %e, "Holder lookup failed");
                None
            }
        }
    }
}

/// Extract the number following `Holders:`, thousands separators allowed
pub fn parse_holder_count(page: &str) -> Option<u64> {
    let (_, rest) = page.split_once("Holders:")?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| *c != ',')
        .collect();
    digits.parse().ok()
}
