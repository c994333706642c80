//! Snapshot File - Atomic JSON Exchange State Persistence
//!
//! Saves store snapshots to `snapshot.json` using atomic writes
//! (write to tmp file, then rename). The file is always either the
//! old or the new version, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument};

use crate::domain::{GlobalConfiguration, Race, Ticket, WalletStatus};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1";

/// Everything needed to resume the exchange after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Version of the snapshot format.
    pub version: String,
    pub saved_at: DateTime<Utc>,
    pub configuration: GlobalConfiguration,
    pub races: Vec<Race>,
    pub tickets: Vec<Ticket>,
    /// Wallet state at save time, if a ledger was attached.
    pub wallet: Option<WalletStatus>,
}

/// Atomic JSON snapshot file.
pub struct SnapshotFile {
    /// Path to snapshot.json.
    path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl SnapshotFile {
    /// Create a snapshot file in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub async fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            path: dir.join("snapshot.json"),
            tmp_path: dir.join("snapshot.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;

        fs::rename(&self.tmp_path, &self.path)
            .await
            .context("Failed to rename snapshot file")?;

        info!(
            path = %self.path.display(),
            races = snapshot.races.len(),
            tickets = snapshot.tickets.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot, or `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("No snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read snapshot file")?;
        let snapshot: StoreSnapshot =
            serde_json::from_str(&json).context("Failed to parse snapshot JSON")?;

        anyhow::ensure!(
            snapshot.version == SNAPSHOT_VERSION,
            "Unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        );

        info!(
            races = snapshot.races.len(),
            tickets = snapshot.tickets.len(),
            saved_at = %snapshot.saved_at,
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OddsModel;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn snapshot() -> StoreSnapshot {
        let mut rng = StdRng::seed_from_u64(5);
        StoreSnapshot {
            version: SNAPSHOT_VERSION.to_string(),
            saved_at: Utc::now(),
            configuration: GlobalConfiguration::default(),
            races: vec![Race::schedule(Utc::now(), 10, OddsModel::Simulated, &mut rng).unwrap()],
            tickets: Vec::new(),
            wallet: None,
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path()).await.unwrap();
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path()).await.unwrap();
        let original = snapshot();
        file.save(&original).await.unwrap();

        let loaded = file.load().await.unwrap().unwrap();
        assert_eq!(loaded.races, original.races);
        assert!(!dir.path().join("snapshot.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let file = SnapshotFile::new(dir.path()).await.unwrap();
        let mut snap = snapshot();
        snap.version = "0".to_string();
        file.save(&snap).await.unwrap();
        assert!(file.load().await.is_err());
    }
}
