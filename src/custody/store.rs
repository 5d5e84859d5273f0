//! Key store backends

use super::{KeyStore, ProfileRecord, UserId, UserProfile};
use crate::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// One JSON file per user under a data directory.
///
/// Writes go to a temporary file that is synced and then renamed over the
/// record, so a crash never leaves a half-written profile behind.
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    /// Open (and create if needed) the data directory
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Storage(format!("{}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn record_path(&self, user_id: UserId) -> PathBuf {
        self.dir.join(format!("{}.json", user_id))
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        let path = self.record_path(user_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Storage(format!("{}: {}", path.display(), e))),
        };
        let record: ProfileRecord = serde_json::from_str(&content)
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e)))?;
        Ok(Some(UserProfile::from_record(record)))
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        let path = self.record_path(profile.user_id);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(&profile.to_record())?;

        let written = match write_private(&tmp, &content).await {
            Ok(()) => tokio::fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            // Never leave a stray copy of the secret behind
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %tmp.display(), error = %cleanup, "Temporary profile not removed");
                }
            }
            return Err(Error::Storage(format!("{}: {}", path.display(), e)));
        }
        tracing::debug!(user_id = profile.user_id, "Profile saved");
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> Result<()> {
        let path = self.record_path(user_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(user_id, "Profile erased");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Write `content` to a file only the owner can read, synced to disk
async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    #[cfg(unix)]
    {
        // `mode` only applies to newly created files
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600)).await?;
    }
    file.write_all(content).await?;
    file.sync_all().await
}

/// Process-local store, used by tests and dry runs
#[derive(Default)]
pub struct MemoryKeyStore {
    records: DashMap<UserId, ProfileRecord>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self, user_id: UserId) -> Result<Option<UserProfile>> {
        Ok(self
            .records
            .get(&user_id)
            .map(|record| UserProfile::from_record(record.value().clone())))
    }

    async fn save(&self, profile: &UserProfile) -> Result<()> {
        self.records.insert(profile.user_id, profile.to_record());
        Ok(())
    }

    async fn remove(&self, user_id: UserId) -> Result<()> {
        self.records.remove(&user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::{GasMode, UserSettings};
    use crate::tokens::addresses;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn profile(user_id: UserId) -> UserProfile {
        UserProfile::connect(
            user_id,
            SecretString::from(TEST_KEY.to_string()),
            UserSettings::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_file_store_round_trip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();

        let mut p = profile(7);
        p.settings.gas_mode = GasMode::Fast;
        p.positions
            .record_buy(addresses::BUSD, "BUSD", dec!(10), dec!(1))
            .unwrap();
        store.save(&p).await.unwrap();

        let reopened = FileKeyStore::open(dir.path()).await.unwrap();
        let loaded = reopened.load(7).await.unwrap().expect("profile present");
        assert_eq!(loaded.address, p.address);
        assert_eq!(loaded.settings.gas_mode, GasMode::Fast);
        assert_eq!(loaded.positions, p.positions);
        assert_eq!(loaded.wallet().unwrap().address(), p.address);

        assert!(!dir.path().join("7.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_user_has_no_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        assert!(store.load(99).await.unwrap().is_none());
        // Erasing an absent profile is fine
        store.remove(99).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_erases_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        store.save(&profile(1)).await.unwrap();
        store.remove(1).await.unwrap();
        assert!(store.load(1).await.unwrap().is_none());
        assert!(!dir.path().join("1.json").exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("5.json"), b"{not json").await.unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        assert!(matches!(store.load(5).await, Err(Error::Storage(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_record_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        // A stale temp file from an earlier crash must not keep its loose mode
        let tmp = dir.path().join("3.json.tmp");
        tokio::fs::write(&tmp, b"stale").await.unwrap();
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644))
            .await
            .unwrap();

        store.save(&profile(3)).await.unwrap();

        let meta = tokio::fs::metadata(dir.path().join("3.json")).await.unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn test_failed_save_leaves_no_secret_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).await.unwrap();
        // A directory where the record belongs makes the final rename fail
        tokio::fs::create_dir(dir.path().join("4.json")).await.unwrap();

        assert!(matches!(store.save(&profile(4)).await, Err(Error::Storage(_))));
        assert!(!dir.path().join("4.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_store_isolates_users() {
        let store = MemoryKeyStore::new();
        store.save(&profile(1)).await.unwrap();
        store.save(&profile(2)).await.unwrap();
        store.remove(1).await.unwrap();

        assert!(store.load(1).await.unwrap().is_none());
        assert!(store.load(2).await.unwrap().is_some());
        assert_eq!(store.len(), 1);
    }
}
