//! Secure Token Storage
//!
//! Persists one serialized [`TokenRecord`] per [`CredentialKey`] using the
//! platform secure store (Keychain, Keystore, Secret Service, ...).
//!
//! The store is passive: it never interprets expiry or refreshes anything.
//! A record that cannot be decoded is deleted and reported as absent, so a
//! bad blob can never lock a user out of re-authenticating.
//!
//! ## Example
//!
//! ```no_run
//! use core_auth::{CredentialKey, CredentialStore, ProviderKind, TokenRecord};
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//! # use bridge_traits::storage::SecureStore;
//! # async fn example(secure_store: Arc<dyn SecureStore>) -> core_auth::Result<()> {
//! let store = CredentialStore::new(secure_store);
//! let key = CredentialKey::default_for(ProviderKind::Dropbox);
//!
//! let record = TokenRecord::new("sl.abc", Some("refresh".to_string()), "bearer", Utc::now() + Duration::hours(4));
//! store.save(&key, &record).await?;
//!
//! assert_eq!(store.load(&key).await?, Some(record));
//! store.clear(&key).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{CredentialKey, TokenRecord};
use bridge_traits::storage::SecureStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key/value persistence for token records.
///
/// Writes are last-write-wins; clones share the same backing store.
#[derive(Clone)]
pub struct CredentialStore {
    secure_store: Arc<dyn SecureStore>,
}

impl CredentialStore {
    pub fn new(secure_store: Arc<dyn SecureStore>) -> Self {
        Self { secure_store }
    }

    /// Store `record` under `key`, replacing any previous record.
    pub async fn save(&self, key: &CredentialKey, record: &TokenRecord) -> Result<()> {
        let json = serde_json::to_vec(record).map_err(|e| {
            warn!(credential = %key, error = %e, "Failed to serialize tokens");
            AuthError::SerializationFailed(e.to_string())
        })?;

        self.secure_store
            .set_secret(&key.storage_key(), &json)
            .await
            .map_err(|e| {
                warn!(credential = %key, error = %e, "Failed to store tokens in secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(
            credential = %key,
            has_refresh_token = record.refresh_token.is_some(),
            "Tokens stored securely"
        );

        Ok(())
    }

    /// Load the record stored under `key`.
    ///
    /// Returns:
    /// - `Ok(Some(record))` if a decodable record exists
    /// - `Ok(None)` if nothing is stored, or the stored blob was corrupt
    ///   (it is deleted as a side effect)
    /// - `Err` if the secure store itself is unavailable
    pub async fn load(&self, key: &CredentialKey) -> Result<Option<TokenRecord>> {
        let storage_key = key.storage_key();

        let data = self
            .secure_store
            .get_secret(&storage_key)
            .await
            .map_err(|e| {
                warn!(credential = %key, error = %e, "Failed to read tokens from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        let Some(data) = data else {
            debug!(credential = %key, "No tokens found in storage");
            return Ok(None);
        };

        match serde_json::from_slice::<TokenRecord>(&data) {
            Ok(record) => {
                debug!(
                    credential = %key,
                    has_refresh_token = record.refresh_token.is_some(),
                    expires_at = %record.expires_at,
                    "Tokens loaded"
                );
                Ok(Some(record))
            }
            Err(e) => {
                warn!(
                    credential = %key,
                    error = %e,
                    "Stored tokens are corrupted, discarding them"
                );

                if let Err(delete_err) = self.secure_store.delete_secret(&storage_key).await {
                    warn!(
                        credential = %key,
                        error = %delete_err,
                        "Failed to delete corrupted token data"
                    );
                }

                Ok(None)
            }
        }
    }

    /// Remove the record under `key`. Succeeds when nothing is stored.
    pub async fn clear(&self, key: &CredentialKey) -> Result<()> {
        self.secure_store
            .delete_secret(&key.storage_key())
            .await
            .map_err(|e| {
                warn!(credential = %key, error = %e, "Failed to delete tokens from secure storage");
                AuthError::SecureStorageUnavailable(e.to_string())
            })?;

        info!(credential = %key, "Tokens deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySecureStore;
    use crate::types::ProviderKind;
    use chrono::{Duration, TimeZone, Utc};

    fn record() -> TokenRecord {
        TokenRecord::new(
            "access_token_123",
            Some("refresh_token_456".to_string()),
            "Bearer",
            Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let key = CredentialKey::default_for(ProviderKind::GoogleDrive);

        let original = record();
        store.save(&key, &original).await.unwrap();

        let loaded = store.load(&key).await.unwrap();
        assert_eq!(loaded, Some(original));
    }

    #[tokio::test]
    async fn test_round_trip_without_refresh_token() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let key = CredentialKey::default_for(ProviderKind::OneDrive);

        let original = TokenRecord::new("a", None, "bearer", Utc::now() + Duration::hours(1));
        store.save(&key, &original).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let key = CredentialKey::default_for(ProviderKind::Dropbox);

        assert_eq!(store.load(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_cleared_and_absent() {
        let secure = Arc::new(MemorySecureStore::new());
        let store = CredentialStore::new(secure.clone());
        let key = CredentialKey::default_for(ProviderKind::Dropbox);

        secure
            .set_secret(&key.storage_key(), b"{not json")
            .await
            .unwrap();

        assert_eq!(store.load(&key).await.unwrap(), None);
        assert!(!secure.has_secret(&key.storage_key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_slots_are_isolated() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let personal = CredentialKey::new(ProviderKind::OneDrive, "personal");
        let work = CredentialKey::new(ProviderKind::OneDrive, "work");

        store.save(&personal, &record()).await.unwrap();
        store.clear(&work).await.unwrap();

        assert!(store.load(&personal).await.unwrap().is_some());
        assert!(store.load(&work).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_last_write_wins() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let key = CredentialKey::default_for(ProviderKind::GoogleDrive);

        store.save(&key, &record()).await.unwrap();
        let mut newer = record();
        newer.access_token = "access_token_789".to_string();
        store.save(&key, &newer).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_clear_missing_succeeds() {
        let store = CredentialStore::new(Arc::new(MemorySecureStore::new()));
        let key = CredentialKey::default_for(ProviderKind::GoogleDrive);

        assert!(store.clear(&key).await.is_ok());
    }
}
