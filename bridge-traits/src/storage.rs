//! Secret persistence for serialized token records.

use async_trait::async_trait;

use crate::error::Result;

/// Application-private key/value store for secrets.
///
/// Backed by the platform keychain on desktop and mobile. Values are opaque
/// bytes: the store never parses them and must never log them. Concurrent
/// writers to the same key are last-write-wins.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Replace whatever is stored under `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Removing an absent key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }
}
