//! License Cache (spec.md §4.3).
//!
//! The single in-memory source of truth for the current license, its
//! offline token, known signing public keys, and per-license validation
//! results. Exactly one writer at a time (the Coordinator, serialized by its
//! own state lock); any number of concurrent readers.
//!
//! Persistence is best-effort: `persist()` snapshots the in-memory state to
//! disk (encrypted) so a restart can pick up where it left off, but a
//! persistence failure never fails the in-memory operation that triggered
//! it — the cache itself stays authoritative for the life of the process.
//!
//! Per SPEC_FULL.md's note on cycles, `validation_results` is a flat map
//! keyed by license key rather than a field hung off `License` that points
//! back to it — the one that would otherwise need `License` and
//! `ValidationResult` to each reference the other.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::encryption::{decrypt_from_base64, derive_key_from_prefix, encrypt_to_base64};
use crate::errors::LicenseResult;
use crate::model::{License, OfflineToken, PublicKey, ValidationResult};
use crate::storage::{PersistenceAdapter, StorageKey};

/// Everything the cache holds, in the shape written to disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheSnapshot {
    license: Option<License>,
    offline_token: Option<OfflineToken>,
    /// Single-slot: only the most recently set key is retained (spec.md
    /// §4.3 — "replacing the stored kid evicts the prior key").
    public_key: Option<PublicKey>,
    validation_results: HashMap<String, ValidationResult>,
    last_seen_ms: i64,
}

pub struct Cache {
    state: RwLock<CacheSnapshot>,
    storage: Arc<dyn PersistenceAdapter>,
    storage_prefix: String,
}

impl Cache {
    pub fn new(storage: Arc<dyn PersistenceAdapter>, storage_prefix: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(CacheSnapshot::default()),
            storage,
            storage_prefix: storage_prefix.into(),
        }
    }

    // --- License ---

    pub async fn license(&self) -> Option<License> {
        self.state.read().await.license.clone()
    }

    pub async fn set_license(&self, license: License) {
        self.state.write().await.license = Some(license);
        self.persist().await;
    }

    pub async fn clear_license(&self) {
        self.state.write().await.license = None;
        self.persist().await;
    }

    // --- Offline token ---

    pub async fn offline_token(&self) -> Option<OfflineToken> {
        self.state.read().await.offline_token.clone()
    }

    pub async fn set_offline_token(&self, token: OfflineToken) {
        self.state.write().await.offline_token = Some(token);
        self.persist().await;
    }

    /// Per spec.md §4.3: clearing the offline token also clears the cached
    /// public key, since a key cached only to verify that token is no
    /// longer meaningful once the token is gone.
    pub async fn clear_offline_token(&self) {
        let mut state = self.state.write().await;
        state.offline_token = None;
        state.public_key = None;
        drop(state);
        self.persist().await;
    }

    // --- Public key (single slot) ---

    /// Returns the cached key only if it matches `kid` — a stale key left
    /// over from a previous `kid` is indistinguishable from "no key cached"
    /// to every caller.
    pub async fn public_key(&self, kid: &str) -> Option<PublicKey> {
        self.state
            .read()
            .await
            .public_key
            .clone()
            .filter(|k| k.key_id == kid)
    }

    /// Single-slot: setting a key for a new `kid` evicts whatever was
    /// cached before, per spec.md §4.3.
    pub async fn set_public_key(&self, key: PublicKey) {
        self.state.write().await.public_key = Some(key);
        self.persist().await;
    }

    pub async fn clear_public_key(&self) {
        self.state.write().await.public_key = None;
        self.persist().await;
    }

    // --- Validation results ---

    pub async fn validation_result(&self, license_key: &str) -> Option<ValidationResult> {
        self.state
            .read()
            .await
            .validation_results
            .get(license_key)
            .cloned()
    }

    pub async fn set_validation_result(&self, license_key: impl Into<String>, result: ValidationResult) {
        self.state
            .write()
            .await
            .validation_results
            .insert(license_key.into(), result);
        self.persist().await;
    }

    // --- Clock ---

    pub async fn last_seen_ms(&self) -> i64 {
        self.state.read().await.last_seen_ms
    }

    pub async fn set_last_seen_ms(&self, ms: i64) {
        self.state.write().await.last_seen_ms = ms;
        self.persist().await;
    }

    /// Drop every field back to empty/default and persist the empty
    /// snapshot (used by `Coordinator::reset` and `purge_cached_license`).
    pub async fn clear_all(&self) {
        *self.state.write().await = CacheSnapshot::default();
        self.persist().await;
    }

    /// Snapshot current state to disk, encrypted under a key derived from
    /// `storage_prefix`. Failures are logged and swallowed: the in-memory
    /// cache remains authoritative regardless of whether this succeeds.
    async fn persist(&self) {
        let snapshot = self.state.read().await.clone();
        if let Err(e) = self.persist_snapshot(&snapshot).await {
            tracing::warn!(error = %e, "failed to persist license cache snapshot; continuing with in-memory state");
        }
    }

    async fn persist_snapshot(&self, snapshot: &CacheSnapshot) -> LicenseResult<()> {
        let json = serde_json::to_vec(snapshot)
            .map_err(|e| crate::errors::LicenseError::Storage(e.to_string()))?;
        let key = derive_key_from_prefix(&self.storage_prefix);
        let encrypted = encrypt_to_base64(&json, &key)?;
        self.storage.save(StorageKey::CacheSnapshot, &encrypted).await
    }

    /// Load a previously persisted snapshot into memory, if one exists and
    /// decrypts/deserializes cleanly. A corrupt or tampered snapshot is
    /// treated as absent rather than propagated as a hard error — the
    /// runtime starts cold and re-activates/re-validates as needed.
    pub async fn load(&self) -> LicenseResult<bool> {
        let Some(encrypted) = self.storage.load(StorageKey::CacheSnapshot).await? else {
            return Ok(false);
        };

        let key = derive_key_from_prefix(&self.storage_prefix);
        let decrypted = match decrypt_from_base64(encrypted.trim(), &key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "cached snapshot failed to decrypt; discarding");
                return Ok(false);
            }
        };

        let snapshot: CacheSnapshot = match serde_json::from_slice(&decrypted) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "cached snapshot failed to deserialize; discarding");
                return Ok(false);
            }
        };

        *self.state.write().await = snapshot;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LicenseState, SignatureBlock};
    use crate::storage::InMemoryStorage;
    use chrono::Utc;

    fn sample_license() -> License {
        License {
            key: "LIC-1".into(),
            product_slug: "acme".into(),
            device_id: "dev-1".into(),
            status: LicenseState::Active,
            starts_at: None,
            expires_at: None,
            plan_key: None,
            seat_limit: None,
            active_seats: 1,
            active_entitlements: vec![],
            activated_at: Utc::now(),
            last_validated_at: None,
            last_validation_result: None,
        }
    }

    fn sample_token() -> OfflineToken {
        OfflineToken {
            schema_version: 1,
            license_key: "LIC-1".into(),
            product_slug: "acme".into(),
            plan_key: None,
            device_id: "dev-1".into(),
            iat: Utc::now(),
            nbf: Utc::now(),
            exp: Utc::now() + chrono::Duration::days(30),
            license_expires_at: None,
            kid: "key-1".into(),
            entitlements: vec![],
            metadata: None,
            signature: SignatureBlock {
                algorithm: "ed25519".into(),
                key_id: "key-1".into(),
                value: "sig".into(),
            },
            canonical: "bytes".into(),
        }
    }

    #[tokio::test]
    async fn license_round_trip_in_memory() {
        let cache = Cache::new(Arc::new(InMemoryStorage::new()), "test-prefix");
        assert!(cache.license().await.is_none());

        cache.set_license(sample_license()).await;
        assert_eq!(cache.license().await.unwrap().key, "LIC-1");

        cache.clear_license().await;
        assert!(cache.license().await.is_none());
    }

    #[tokio::test]
    async fn persist_and_reload_round_trip() {
        let storage = Arc::new(InMemoryStorage::new());
        let cache = Cache::new(storage.clone(), "test-prefix");

        cache.set_license(sample_license()).await;
        cache.set_offline_token(sample_token()).await;
        cache.set_last_seen_ms(1_000).await;

        let reloaded = Cache::new(storage, "test-prefix");
        assert!(reloaded.load().await.unwrap());

        assert_eq!(reloaded.license().await.unwrap().key, "LIC-1");
        assert_eq!(reloaded.offline_token().await.unwrap().license_key, "LIC-1");
        assert_eq!(reloaded.last_seen_ms().await, 1_000);
    }

    #[tokio::test]
    async fn wrong_prefix_cannot_decrypt_snapshot() {
        let storage = Arc::new(InMemoryStorage::new());
        let cache = Cache::new(storage.clone(), "prefix-a");
        cache.set_license(sample_license()).await;

        let reader = Cache::new(storage, "prefix-b");
        // Decryption fails under the wrong derived key; load() treats that
        // as "no snapshot" rather than surfacing an error.
        assert!(!reader.load().await.unwrap());
        assert!(reader.license().await.is_none());
    }

    #[tokio::test]
    async fn clear_all_wipes_every_field() {
        let cache = Cache::new(Arc::new(InMemoryStorage::new()), "test-prefix");
        cache.set_license(sample_license()).await;
        cache.set_offline_token(sample_token()).await;
        cache.set_last_seen_ms(42).await;

        cache.clear_all().await;

        assert!(cache.license().await.is_none());
        assert!(cache.offline_token().await.is_none());
        assert_eq!(cache.last_seen_ms().await, 0);
    }

    #[tokio::test]
    async fn public_key_is_single_slot() {
        let cache = Cache::new(Arc::new(InMemoryStorage::new()), "test-prefix");
        cache
            .set_public_key(PublicKey { key_id: "key-1".into(), algorithm: "ed25519".into(), public_key: vec![1] })
            .await;
        assert!(cache.public_key("key-1").await.is_some());

        cache
            .set_public_key(PublicKey { key_id: "key-2".into(), algorithm: "ed25519".into(), public_key: vec![2] })
            .await;
        assert!(cache.public_key("key-1").await.is_none(), "setting key-2 must evict key-1");
        assert!(cache.public_key("key-2").await.is_some());
    }

    #[tokio::test]
    async fn clearing_offline_token_also_clears_public_key() {
        let cache = Cache::new(Arc::new(InMemoryStorage::new()), "test-prefix");
        cache.set_offline_token(sample_token()).await;
        cache
            .set_public_key(PublicKey { key_id: "key-1".into(), algorithm: "ed25519".into(), public_key: vec![1] })
            .await;

        cache.clear_offline_token().await;
        assert!(cache.offline_token().await.is_none());
        assert!(cache.public_key("key-1").await.is_none());
    }

    #[tokio::test]
    async fn validation_results_keyed_independently_of_license() {
        let cache = Cache::new(Arc::new(InMemoryStorage::new()), "test-prefix");
        let result = ValidationResult::failed("expired", "license expired", false);
        cache.set_validation_result("LIC-1", result).await;

        assert!(cache.validation_result("LIC-1").await.unwrap().valid == false);
        assert!(cache.validation_result("LIC-2").await.is_none());
    }
}
