//! Trade journal
//!
//! Appends one JSON line per execution attempt. Journal writes never fail a trade.

use super::Direction;
use crate::custody::UserId;
use alloy::primitives::{Address, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Entry in the trade journal
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub trade_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub direction: Direction,
    pub token: Address,
    pub amount_in: U256,
    pub expected_out: Option<U256>,
    pub min_out: Option<U256>,
    pub approval_tx: Option<TxHash>,
    pub swap_tx: Option<TxHash>,
    pub status: &'static str,
    pub error: Option<String>,
}

/// Writer for journal entries
struct JournalWriter {
    path: PathBuf,
}

impl JournalWriter {
    fn write(&self, entry: &JournalEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// Shared JSONL journal; entries from concurrent users never interleave mid-line
#[derive(Clone)]
pub struct TradeJournal {
    writer: Arc<Mutex<JournalWriter>>,
}

impl TradeJournal {
    /// # Arguments
    /// * `path` - Path to the journal file (JSONL format)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(JournalWriter { path: path.into() })),
        }
    }

    pub async fn record(&self, entry: &JournalEntry) {
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(entry) {
            tracing::warn!(error = %e, trade_id = %entry.trade_id, "Failed to write journal entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_appends_one_line_per_entry() {
        let temp_file = NamedTempFile::new().unwrap();
        let journal = TradeJournal::new(temp_file.path());

        let mut entry = JournalEntry {
            trade_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: 11,
            direction: Direction::Buy,
            token: Address::ZERO,
            amount_in: U256::from(5u8),
            expected_out: Some(U256::from(100u8)),
            min_out: Some(U256::from(97u8)),
            approval_tx: None,
            swap_tx: None,
            status: "submitted",
            error: None,
        };
        journal.record(&entry).await;
        entry.status = "failed";
        entry.error = Some("quote unavailable".into());
        journal.record(&entry).await;

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"submitted\""));
        assert!(lines[1].contains("quote unavailable"));
    }

    #[tokio::test]
    async fn test_unwritable_journal_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened for appending
        let journal = TradeJournal::new(dir.path());
        let entry = JournalEntry {
            trade_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_id: 1,
            direction: Direction::Sell,
            token: Address::ZERO,
            amount_in: U256::ZERO,
            expected_out: None,
            min_out: None,
            approval_tx: None,
            swap_tx: None,
            status: "failed",
            error: None,
        };
        journal.record(&entry).await;
    }
}
