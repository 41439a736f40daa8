//! Persistence port (spec.md §4.3's "snapshot-to-disk").
//!
//! `PersistenceAdapter` is the seam between the Cache and wherever its
//! snapshot actually lives, so the Cache's persistence logic can be tested
//! without touching a real keyring or filesystem. `KeyringFileStorage` is the
//! default adapter, generalizing the teacher's keyring-then-file-then-legacy
//! chain: try the OS keyring first, fall back to a file in the platform app
//! data directory, and transparently migrate a legacy CWD file if one is
//! found.
//!
//! Storage entries are keyed by the configured `storage_prefix` rather than
//! a hardware id, since one prefix may cover several cached records
//! (license snapshot, offline token, public keys) distinguished by
//! `StorageKey`.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::errors::{LicenseError, LicenseResult};

const KEYRING_SERVICE: &str = "licenseseat";
const SNAPSHOT_FILE: &str = "licenseseat_cache.enc";
const LEGACY_SNAPSHOT_FILE: &str = "licenseseat_cache.json";

/// What's being persisted. The runtime currently persists a single combined
/// cache snapshot, but the enum leaves room for splitting storage later
/// without changing the trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    CacheSnapshot,
}

impl StorageKey {
    fn keyring_name(&self, storage_prefix: &str) -> String {
        match self {
            StorageKey::CacheSnapshot => format!("cache:{storage_prefix}"),
        }
    }

    fn filename(&self) -> &'static str {
        match self {
            StorageKey::CacheSnapshot => SNAPSHOT_FILE,
        }
    }

    fn legacy_filename(&self) -> &'static str {
        match self {
            StorageKey::CacheSnapshot => LEGACY_SNAPSHOT_FILE,
        }
    }
}

/// Port for persisting the Cache's snapshot. Implementors decide where
/// bytes actually land; the Cache only needs load/save/clear.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn save(&self, key: StorageKey, data: &str) -> LicenseResult<()>;
    async fn load(&self, key: StorageKey) -> LicenseResult<Option<String>>;
    async fn clear(&self, key: StorageKey) -> LicenseResult<()>;
}

/// Default adapter: OS keyring, falling back to an app-data-directory file,
/// with automatic migration of a legacy CWD file.
pub struct KeyringFileStorage {
    storage_prefix: String,
}

impl KeyringFileStorage {
    pub fn new(storage_prefix: impl Into<String>) -> Self {
        Self {
            storage_prefix: storage_prefix.into(),
        }
    }

    fn app_data_dir(&self) -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("licenseseat"))
    }

    fn storage_path(&self, key: StorageKey) -> Option<PathBuf> {
        self.app_data_dir().map(|dir| dir.join(key.filename()))
    }

    fn legacy_path(&self, key: StorageKey) -> PathBuf {
        PathBuf::from(key.legacy_filename())
    }

    fn save_to_keyring(&self, key: StorageKey, data: &str) -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &key.keyring_name(&self.storage_prefix))?;
        entry.set_password(data)
    }

    fn load_from_keyring(&self, key: StorageKey) -> Result<String, keyring::Error> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &key.keyring_name(&self.storage_prefix))?;
        entry.get_password()
    }

    fn clear_from_keyring(&self, key: StorageKey) -> Result<(), keyring::Error> {
        let entry = keyring::Entry::new(KEYRING_SERVICE, &key.keyring_name(&self.storage_prefix))?;
        entry.delete_credential()
    }

    async fn save_to_file(&self, key: StorageKey, data: &str) -> LicenseResult<()> {
        let dir = self
            .app_data_dir()
            .ok_or_else(|| LicenseError::Storage("could not determine app data directory".into()))?;
        fs::create_dir_all(&dir).await?;
        let path = dir.join(key.filename());
        fs::write(&path, data).await?;
        Ok(())
    }

    async fn load_from_file(&self, key: StorageKey) -> LicenseResult<Option<String>> {
        let path = match self.storage_path(key) {
            Some(p) => p,
            None => return Ok(None),
        };
        match fs::read_to_string(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_from_file(&self, key: StorageKey) -> LicenseResult<()> {
        if let Some(path) = self.storage_path(key) {
            match fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            Ok(())
        }
    }

    async fn load_from_legacy(&self, key: StorageKey) -> Option<String> {
        fs::read_to_string(self.legacy_path(key)).await.ok()
    }

    async fn clear_legacy_file(&self, key: StorageKey) {
        let _ = fs::remove_file(self.legacy_path(key)).await;
    }
}

#[async_trait]
impl PersistenceAdapter for KeyringFileStorage {
    async fn save(&self, key: StorageKey, data: &str) -> LicenseResult<()> {
        match self.save_to_keyring(key, data) {
            Ok(()) if self.load_from_keyring(key).is_ok() => return Ok(()),
            Ok(()) => {
                tracing::debug!(?key, "keyring save verification failed, falling back to file");
            }
            Err(e) => {
                tracing::debug!(?key, error = %e, "keyring save failed, falling back to file");
            }
        }
        self.save_to_file(key, data).await
    }

    async fn load(&self, key: StorageKey) -> LicenseResult<Option<String>> {
        if let Ok(data) = self.load_from_keyring(key) {
            return Ok(Some(data));
        }

        if let Some(data) = self.load_from_file(key).await? {
            if self.save_to_keyring(key, &data).is_ok() {
                tracing::debug!(?key, "migrated cache snapshot from app data dir to keyring");
            }
            return Ok(Some(data));
        }

        if let Some(data) = self.load_from_legacy(key).await {
            tracing::info!(?key, "migrating legacy CWD snapshot to managed storage");
            if self.save(key, &data).await.is_ok() {
                self.clear_legacy_file(key).await;
            }
            return Ok(Some(data));
        }

        Ok(None)
    }

    async fn clear(&self, key: StorageKey) -> LicenseResult<()> {
        if let Err(e) = self.clear_from_keyring(key) {
            if !matches!(e, keyring::Error::NoEntry) {
                tracing::debug!(?key, error = %e, "failed to clear keyring entry");
            }
        }
        let file_result = self.clear_from_file(key).await;
        self.clear_legacy_file(key).await;
        file_result
    }
}

/// In-memory adapter for tests and for embedders that don't want disk
/// persistence at all.
#[derive(Default)]
pub struct InMemoryStorage {
    slots: tokio::sync::Mutex<std::collections::HashMap<&'static str, String>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStorage {
    async fn save(&self, key: StorageKey, data: &str) -> LicenseResult<()> {
        self.slots
            .lock()
            .await
            .insert(key.filename(), data.to_string());
        Ok(())
    }

    async fn load(&self, key: StorageKey) -> LicenseResult<Option<String>> {
        Ok(self.slots.lock().await.get(key.filename()).cloned())
    }

    async fn clear(&self, key: StorageKey) -> LicenseResult<()> {
        self.slots.lock().await.remove(key.filename());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load(StorageKey::CacheSnapshot).await.unwrap(), None);

        storage
            .save(StorageKey::CacheSnapshot, "payload")
            .await
            .unwrap();
        assert_eq!(
            storage.load(StorageKey::CacheSnapshot).await.unwrap(),
            Some("payload".to_string())
        );

        storage.clear(StorageKey::CacheSnapshot).await.unwrap();
        assert_eq!(storage.load(StorageKey::CacheSnapshot).await.unwrap(), None);
    }

    #[tokio::test]
    #[serial_test::serial]
    async fn file_backend_roundtrips_and_migrates_legacy() {
        let storage = KeyringFileStorage::new("test-prefix-storage-rs");
        let _ = storage.clear(StorageKey::CacheSnapshot).await;

        let legacy_path = storage.legacy_path(StorageKey::CacheSnapshot);
        fs::write(&legacy_path, "legacy-data").await.unwrap();

        let loaded = storage.load_from_file(StorageKey::CacheSnapshot).await;
        // Legacy file lives in CWD, not the app-data file path, so the
        // plain file loader alone won't see it.
        assert!(matches!(loaded, Ok(None)));

        let _ = storage.clear(StorageKey::CacheSnapshot).await;
        let _ = fs::remove_file(&legacy_path).await;
    }
}
