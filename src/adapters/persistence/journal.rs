//! JSONL Journal - Append-only Ledger and Settlement Records
//!
//! Persists ledger transactions to `ledger/YYYY-MM-DD.jsonl` and ticket
//! settlements to `settlements/YYYY-MM-DD.jsonl`. Each line is a
//! self-contained JSON record.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::domain::WalletTransaction;
use crate::ports::journal::{Journal, SettlementRecord};

/// Append-only JSONL journal with daily file rotation.
pub struct JsonlJournal {
    /// Directory for ledger transaction files.
    ledger_dir: PathBuf,
    /// Directory for settlement files.
    settlements_dir: PathBuf,
}

impl JsonlJournal {
    /// Create a journal in the given data directory.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let ledger_dir = data_dir.as_ref().join("ledger");
        let settlements_dir = data_dir.as_ref().join("settlements");

        fs::create_dir_all(&ledger_dir)
            .await
            .context("Failed to create ledger directory")?;
        fs::create_dir_all(&settlements_dir)
            .await
            .context("Failed to create settlements directory")?;

        Ok(Self {
            ledger_dir,
            settlements_dir,
        })
    }

    fn today_file(dir: &Path) -> PathBuf {
        dir.join(format!("{}.jsonl", Utc::now().format("%Y-%m-%d")))
    }

    /// Append `records` to today's file in `dir` with a single write.
    async fn append<T: Serialize>(dir: &Path, records: &[T]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record).context("Failed to serialize journal record")?);
            buf.push('\n');
        }

        let path = Self::today_file(dir);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open journal file {}", path.display()))?;

        file.write_all(buf.as_bytes())
            .await
            .context("Failed to write journal records")?;
        file.flush().await.context("Failed to flush journal")?;

        debug!(path = %path.display(), count = records.len(), "Journal records appended");
        Ok(())
    }

    /// Read every record from every `.jsonl` file in `dir`, skipping bad lines.
    async fn load_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                files.push(path);
            }
        }
        // Daily file names sort chronologically.
        files.sort();

        let mut records = Vec::new();
        for path in files {
            let content = fs::read_to_string(&path).await?;
            for line in content.lines().filter(|l| !l.trim().is_empty()) {
                match serde_json::from_str::<T>(line) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!(
                        file = %path.display(),
                        error = %e,
                        "Skipping malformed journal record"
                    ),
                }
            }
        }
        Ok(records)
    }

    /// Load every journaled settlement, oldest first.
    pub async fn load_settlements(&self) -> Result<Vec<SettlementRecord>> {
        Self::load_dir(&self.settlements_dir).await
    }
}

#[async_trait]
impl Journal for JsonlJournal {
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn append_transactions(&self, entries: &[WalletTransaction]) -> Result<()> {
        Self::append(&self.ledger_dir, entries).await
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn append_settlements(&self, records: &[SettlementRecord]) -> Result<()> {
        Self::append(&self.settlements_dir, records).await
    }

    async fn load_transactions(&self) -> Result<Vec<WalletTransaction>> {
        let mut txns: Vec<WalletTransaction> = Self::load_dir(&self.ledger_dir).await?;
        txns.sort_by_key(|t| t.created_at);
        info!(count = txns.len(), "Loaded ledger transactions");
        Ok(txns)
    }

    async fn is_healthy(&self) -> bool {
        let probe = self.ledger_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}
