//! # Token Lifecycle Manager
//!
//! Owns the token record of one connection: loads it from the
//! [`CredentialStore`], judges expiry against the configured skew, refreshes
//! it through a [`TokenRefresher`], and persists every replacement.
//!
//! ## State machine
//!
//! ```text
//! SignedOut ──install──▶ SignedIn ──(clock)──▶ TokenExpired
//!                           ▲                        │
//!                           └──── TokenRefreshing ◀──┘
//!                                      │
//!                         revoked ─────┴───▶ SignedOut
//! ```
//!
//! ## Concurrency
//!
//! At most one refresh runs per manager. Callers that lose the race wait on
//! the refresh gate and then reuse the token the winner installed instead of
//! issuing a second token request.

use crate::error::{AuthError, Result};
use crate::oauth::TokenRefresher;
use crate::token_store::CredentialStore;
use crate::types::{AuthState, CredentialKey, TokenRecord};
use bridge_traits::time::Clock;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Token owner for one `(provider, slot)` connection.
pub struct TokenLifecycleManager {
    key: CredentialKey,
    store: CredentialStore,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    skew: chrono::Duration,
    event_bus: EventBus,
    current: RwLock<Option<TokenRecord>>,
    state: RwLock<AuthState>,
    /// Serializes refreshes.
    refresh_gate: Mutex<()>,
}

impl TokenLifecycleManager {
    pub fn new(
        key: CredentialKey,
        store: CredentialStore,
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<dyn Clock>,
        skew: Duration,
        event_bus: EventBus,
    ) -> Self {
        let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());

        Self {
            key,
            store,
            refresher,
            clock,
            skew,
            event_bus,
            current: RwLock::new(None),
            state: RwLock::new(AuthState::SignedOut),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &CredentialKey {
        &self.key
    }

    pub async fn state(&self) -> AuthState {
        *self.state.read().await
    }

    /// Snapshot of the record currently held in memory.
    pub async fn tokens(&self) -> Option<TokenRecord> {
        self.current.read().await.clone()
    }

    pub async fn is_expired(&self) -> bool {
        match self.current.read().await.as_ref() {
            Some(record) => record.is_expired_at(self.clock.now(), self.skew),
            None => true,
        }
    }

    /// Read the stored record into memory.
    ///
    /// The state becomes `SignedIn` for a valid record, `TokenExpired` for an
    /// expired one and `SignedOut` when nothing usable is stored.
    #[instrument(skip(self), fields(credential = %self.key))]
    pub async fn load_or_null(&self) -> Result<Option<TokenRecord>> {
        let loaded = self.store.load(&self.key).await?;

        let state = match &loaded {
            Some(record) if record.is_expired_at(self.clock.now(), self.skew) => {
                debug!(expires_at = %record.expires_at, "Stored access token has expired");
                AuthState::TokenExpired
            }
            Some(_) => AuthState::SignedIn,
            None => AuthState::SignedOut,
        };

        *self.current.write().await = loaded.clone();
        *self.state.write().await = state;

        Ok(loaded)
    }

    /// Persist a freshly issued record and make it current.
    #[instrument(skip(self, record), fields(credential = %self.key))]
    pub async fn install(&self, record: TokenRecord) -> Result<()> {
        self.store.save(&self.key, &record).await?;

        *self.current.write().await = Some(record);
        *self.state.write().await = AuthState::SignedIn;

        info!("Installed new tokens");
        Ok(())
    }

    /// A valid access token, refreshing first when the held one has expired.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NotAuthenticated`] when no record is held
    /// - [`AuthError::AuthRevoked`] when the refresh grant was rejected
    /// - [`AuthError::TokenRefreshFailed`] / [`AuthError::NoRefreshToken`]
    ///   when the token expired and could not be renewed
    pub async fn access_token(&self) -> Result<String> {
        let stale = {
            let current = self.current.read().await;
            let record = current.as_ref().ok_or(AuthError::NotAuthenticated)?;

            if !record.is_expired_at(self.clock.now(), self.skew) {
                return Ok(record.access_token.clone());
            }

            record.access_token.clone()
        };

        self.refresh_rejected(&stale).await
    }

    /// Unconditionally renew the held token.
    ///
    /// Concurrent callers still share one token request.
    pub async fn refresh(&self) -> Result<String> {
        let stale = self
            .current
            .read()
            .await
            .as_ref()
            .map(|record| record.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)?;

        self.refresh_rejected(&stale).await
    }

    /// Renew the token because `stale_token` was rejected or has expired.
    ///
    /// If another caller already replaced `stale_token` with a token that is
    /// still valid, that token is returned without contacting the server.
    #[instrument(skip(self, stale_token), fields(credential = %self.key))]
    pub async fn refresh_rejected(&self, stale_token: &str) -> Result<String> {
        let _gate = self.refresh_gate.lock().await;

        let record = {
            let current = self.current.read().await;
            let record = current.as_ref().ok_or(AuthError::NotAuthenticated)?;

            if record.access_token != stale_token
                && !record.is_expired_at(self.clock.now(), self.skew)
            {
                debug!("Token already refreshed by a concurrent caller");
                return Ok(record.access_token.clone());
            }

            record.clone()
        };

        let Some(refresh_token) = record.refresh_token.clone() else {
            warn!("Access token expired and no refresh token is held");
            *self.state.write().await = AuthState::TokenExpired;
            return Err(AuthError::NoRefreshToken);
        };

        *self.state.write().await = AuthState::TokenRefreshing;
        self.emit(AuthEvent::TokenRefreshing {
            connection: self.key.to_string(),
        });

        match self.refresher.refresh(&refresh_token).await {
            Ok(mut renewed) => {
                if renewed.refresh_token.is_none() {
                    renewed.refresh_token = Some(refresh_token);
                }

                if let Err(e) = self.store.save(&self.key, &renewed).await {
                    warn!(error = %e, "Refreshed tokens could not be persisted");
                }

                let access_token = renewed.access_token.clone();
                let expires_at = renewed.expires_at.timestamp();
                *self.current.write().await = Some(renewed);
                *self.state.write().await = AuthState::SignedIn;

                info!("Access token refreshed");
                self.emit(AuthEvent::TokenRefreshed {
                    connection: self.key.to_string(),
                    expires_at,
                });

                Ok(access_token)
            }
            Err(e) if e.is_revoked() => {
                warn!(error = %e, "Refresh grant revoked, clearing credentials");
                self.emit(AuthEvent::AuthError {
                    connection: Some(self.key.to_string()),
                    message: e.to_string(),
                    recoverable: false,
                });
                self.discard().await;
                Err(e)
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                *self.state.write().await = AuthState::TokenExpired;
                self.emit(AuthEvent::AuthError {
                    connection: Some(self.key.to_string()),
                    message: e.to_string(),
                    recoverable: true,
                });

                Err(match e {
                    AuthError::TokenRefreshFailed(_) => e,
                    other => AuthError::TokenRefreshFailed(other.to_string()),
                })
            }
        }
    }

    /// Delete stored credentials and forget the in-memory record.
    #[instrument(skip(self), fields(credential = %self.key))]
    pub async fn sign_out(&self) -> Result<()> {
        self.store.clear(&self.key).await?;

        *self.current.write().await = None;
        *self.state.write().await = AuthState::SignedOut;

        info!("Signed out");
        self.emit(AuthEvent::SignedOut {
            connection: self.key.to_string(),
        });
        Ok(())
    }

    pub(crate) async fn set_state(&self, state: AuthState) {
        *self.state.write().await = state;
    }

    /// Best-effort sign-out used on failure paths.
    pub(crate) async fn discard(&self) {
        if let Err(e) = self.sign_out().await {
            warn!(error = %e, "Failed to clear stored credentials");
            *self.current.write().await = None;
            *self.state.write().await = AuthState::SignedOut;
        }
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySecureStore;
    use crate::types::ProviderKind;
    use async_trait::async_trait;
    use bridge_traits::time::ManualClock;
    use chrono::{TimeZone, Utc};
    use mockall::mock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mock! {
        Refresher {}

        #[async_trait]
        impl TokenRefresher for Refresher {
            async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord>;
        }
    }

    /// Counts calls and yields so concurrent callers can pile up on the gate.
    struct SlowRefresher {
        calls: AtomicUsize,
        clock: Arc<ManualClock>,
    }

    #[async_trait]
    impl TokenRefresher for SlowRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenRecord> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(TokenRecord::issued_at(
                self.clock.now(),
                format!("access-{}", n),
                None,
                "Bearer",
                3600,
            ))
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn expired_record(clock: &ManualClock) -> TokenRecord {
        TokenRecord::new(
            "old-access",
            Some("refresh-1".to_string()),
            "Bearer",
            clock.now() - chrono::Duration::minutes(1),
        )
    }

    fn manager_with(
        refresher: Arc<dyn TokenRefresher>,
        clock: Arc<ManualClock>,
        secure: Arc<MemorySecureStore>,
    ) -> TokenLifecycleManager {
        TokenLifecycleManager::new(
            CredentialKey::default_for(ProviderKind::GoogleDrive),
            CredentialStore::new(secure),
            refresher,
            clock,
            Duration::from_secs(300),
            EventBus::new(16),
        )
    }

    #[tokio::test]
    async fn test_access_token_without_tokens_is_not_authenticated() {
        let clock = clock();
        let manager = manager_with(
            Arc::new(MockRefresher::new()),
            clock,
            Arc::new(MemorySecureStore::new()),
        );

        assert!(matches!(
            manager.access_token().await,
            Err(AuthError::NotAuthenticated)
        ));
        assert_eq!(manager.state().await, AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_load_or_null_classifies_expiry() {
        let clock = clock();
        let secure = Arc::new(MemorySecureStore::new());
        let manager = manager_with(Arc::new(MockRefresher::new()), clock.clone(), secure);

        assert_eq!(manager.load_or_null().await.unwrap(), None);
        assert_eq!(manager.state().await, AuthState::SignedOut);

        manager.install(expired_record(&clock)).await.unwrap();
        manager.load_or_null().await.unwrap();
        assert_eq!(manager.state().await, AuthState::TokenExpired);

        let valid = TokenRecord::issued_at(clock.now(), "fresh", None, "Bearer", 3600);
        manager.install(valid).await.unwrap();
        manager.load_or_null().await.unwrap();
        assert_eq!(manager.state().await, AuthState::SignedIn);
    }

    #[tokio::test]
    async fn test_valid_token_skips_refresh() {
        let clock = clock();
        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().never();
        let manager = manager_with(
            Arc::new(refresher),
            clock.clone(),
            Arc::new(MemorySecureStore::new()),
        );

        let record = TokenRecord::issued_at(clock.now(), "valid", None, "Bearer", 3600);
        manager.install(record).await.unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "valid");
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_and_preserves_refresh_token() {
        let clock = clock();
        let now = clock.now();
        let secure = Arc::new(MemorySecureStore::new());

        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh()
            .withf(|token| token.to_string() == "refresh-1")
            .times(1)
            .returning(move |_| Ok(TokenRecord::issued_at(now, "new-access", None, "Bearer", 3600)));

        let manager = manager_with(Arc::new(refresher), clock.clone(), secure.clone());
        manager.install(expired_record(&clock)).await.unwrap();

        assert_eq!(manager.access_token().await.unwrap(), "new-access");

        let held = manager.tokens().await.unwrap();
        assert_eq!(held.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(manager.state().await, AuthState::SignedIn);

        let persisted = CredentialStore::new(secure)
            .load(manager.key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted, held);
    }

    #[tokio::test]
    async fn test_revoked_grant_clears_credentials() {
        let clock = clock();
        let secure = Arc::new(MemorySecureStore::new());

        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(|_| Err(AuthError::AuthRevoked("invalid_grant".to_string())));

        let manager = manager_with(Arc::new(refresher), clock.clone(), secure.clone());
        let mut events = manager.event_bus.subscribe();
        manager.install(expired_record(&clock)).await.unwrap();

        let result = manager.access_token().await;

        assert!(matches!(result, Err(AuthError::AuthRevoked(_))));
        assert_eq!(manager.state().await, AuthState::SignedOut);
        assert!(manager.tokens().await.is_none());
        assert!(secure.is_empty());

        let mut saw_signed_out = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, CoreEvent::Auth(AuthEvent::SignedOut { .. })) {
                saw_signed_out = true;
            }
        }
        assert!(saw_signed_out);
    }

    #[tokio::test]
    async fn test_transient_failure_keeps_credentials() {
        let clock = clock();
        let secure = Arc::new(MemorySecureStore::new());

        let mut refresher = MockRefresher::new();
        refresher
            .expect_refresh()
            .times(1)
            .returning(|_| Err(AuthError::NetworkError("reset".to_string())));

        let manager = manager_with(Arc::new(refresher), clock.clone(), secure.clone());
        manager.install(expired_record(&clock)).await.unwrap();

        let result = manager.access_token().await;

        assert!(matches!(result, Err(AuthError::TokenRefreshFailed(_))));
        assert_eq!(manager.state().await, AuthState::TokenExpired);
        assert_eq!(secure.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_refresh_token() {
        let clock = clock();
        let manager = manager_with(
            Arc::new(MockRefresher::new()),
            clock.clone(),
            Arc::new(MemorySecureStore::new()),
        );
        let record = TokenRecord::new(
            "old",
            None,
            "Bearer",
            clock.now() - chrono::Duration::hours(1),
        );
        manager.install(record).await.unwrap();

        assert!(matches!(
            manager.access_token().await,
            Err(AuthError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejected_reuses_newer_token() {
        let clock = clock();
        let mut refresher = MockRefresher::new();
        refresher.expect_refresh().never();
        let manager = manager_with(
            Arc::new(refresher),
            clock.clone(),
            Arc::new(MemorySecureStore::new()),
        );

        let record = TokenRecord::issued_at(
            clock.now(),
            "already-new",
            Some("r".to_string()),
            "Bearer",
            3600,
        );
        manager.install(record).await.unwrap();

        assert_eq!(
            manager.refresh_rejected("older-token").await.unwrap(),
            "already-new"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_refresh() {
        let clock = clock();
        let refresher = Arc::new(SlowRefresher {
            calls: AtomicUsize::new(0),
            clock: clock.clone(),
        });
        let manager = Arc::new(manager_with(
            refresher.clone(),
            clock.clone(),
            Arc::new(MemorySecureStore::new()),
        ));
        manager.install(expired_record(&clock)).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.access_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "access-1");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sign_out_clears_store() {
        let clock = clock();
        let secure = Arc::new(MemorySecureStore::new());
        let manager = manager_with(Arc::new(MockRefresher::new()), clock.clone(), secure.clone());

        manager
            .install(TokenRecord::issued_at(clock.now(), "a", None, "Bearer", 60))
            .await
            .unwrap();
        manager.sign_out().await.unwrap();

        assert!(secure.is_empty());
        assert_eq!(manager.state().await, AuthState::SignedOut);
        assert!(matches!(
            manager.access_token().await,
            Err(AuthError::NotAuthenticated)
        ));
    }
}
