//! # Authentication Flow Controller
//!
//! Turns stored or freshly granted credentials into a live [`Connection`].
//!
//! `connect` runs these steps in order:
//!
//! 1. Offline devices get [`ConnectOutcome::Offline`] before any auth traffic.
//! 2. Unless interactive sign-in is forced, stored tokens are loaded (and
//!    refreshed when expired) and the account is fetched.
//! 3. A failed silent attempt clears the stored credentials.
//! 4. The interactive PKCE flow runs through the host's
//!    [`AuthorizationPrompt`] under the configured timeout.
//!
//! A dismissed prompt, a declined consent screen and an elapsed timeout all
//! yield [`ConnectOutcome::Cancelled`]; errors are reserved for attempts that
//! failed unexpectedly.

use crate::connection::Connection;
use crate::error::{AuthError, Result};
use crate::manager::TokenLifecycleManager;
use crate::oauth::{parse_redirect, OAuthConfig, OAuthFlowManager, RedirectOutcome};
use crate::token_store::CredentialStore;
use crate::types::{AccountSummary, AuthState, CredentialKey, ProviderKind, DEFAULT_SLOT};
use async_trait::async_trait;
use bridge_traits::auth::AuthorizationPrompt;
use bridge_traits::network::NetworkMonitor;
use bridge_traits::time::Clock;
use core_runtime::config::CoreConfig;
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

/// Looks up who owns an access token.
///
/// Implemented by each provider adapter against its "current account"
/// endpoint.
#[async_trait]
pub trait AccountFetcher: Send + Sync {
    async fn fetch_account(&self, access_token: &str) -> Result<AccountSummary>;
}

/// Result of a `connect` attempt.
#[derive(Debug, Clone)]
pub enum ConnectOutcome {
    Connected(Connection),
    /// No network; nothing was attempted.
    Offline,
    /// The user dismissed or declined authorization, or it timed out.
    Cancelled,
}

impl ConnectOutcome {
    pub fn into_connection(self) -> Option<Connection> {
        match self {
            ConnectOutcome::Connected(connection) => Some(connection),
            ConnectOutcome::Offline | ConnectOutcome::Cancelled => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

/// Orchestrates silent and interactive sign-in for one back end.
pub struct AuthFlowController {
    oauth: Arc<OAuthFlowManager>,
    store: CredentialStore,
    account_fetcher: Arc<dyn AccountFetcher>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    prompt: Option<Arc<dyn AuthorizationPrompt>>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    auth_timeout: Duration,
    token_expiry_skew: Duration,
    /// One token manager per credential key, shared by every connection to it.
    managers: Mutex<HashMap<CredentialKey, Arc<TokenLifecycleManager>>>,
}

impl AuthFlowController {
    pub fn new(
        config: &CoreConfig,
        oauth_config: OAuthConfig,
        account_fetcher: Arc<dyn AccountFetcher>,
    ) -> Self {
        let oauth = OAuthFlowManager::new(
            oauth_config,
            config.http_client.clone(),
            config.clock.clone(),
        );

        Self {
            oauth: Arc::new(oauth),
            store: CredentialStore::new(config.secure_store.clone()),
            account_fetcher,
            network_monitor: config.network_monitor.clone(),
            prompt: config.authorization_prompt.clone(),
            clock: config.clock.clone(),
            event_bus: config.event_bus.clone(),
            auth_timeout: config.auth_timeout,
            token_expiry_skew: config.token_expiry_skew,
            managers: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.oauth.config().provider
    }

    /// Connect the default account slot.
    pub async fn connect(&self, force_interactive: bool) -> Result<ConnectOutcome> {
        self.connect_slot(DEFAULT_SLOT, force_interactive).await
    }

    /// Connect the account stored under `slot`.
    #[instrument(skip(self), fields(provider = %self.provider()))]
    pub async fn connect_slot(&self, slot: &str, force_interactive: bool) -> Result<ConnectOutcome> {
        if !self.is_online().await {
            info!("Offline, skipping sign-in");
            return Ok(ConnectOutcome::Offline);
        }

        let key = CredentialKey::new(self.provider(), slot);
        let manager = self.manager_for(&key).await;

        if !force_interactive {
            match self.connect_silently(&manager).await {
                Ok(Some(connection)) => return Ok(ConnectOutcome::Connected(connection)),
                Ok(None) => debug!(credential = %key, "No stored credentials"),
                Err(e) => {
                    warn!(credential = %key, error = %e, "Silent sign-in failed, clearing credentials");
                    manager.discard().await;
                }
            }
        }

        let outcome = self.connect_interactively(&manager).await;

        match &outcome {
            Ok(ConnectOutcome::Connected(_)) => {}
            Ok(_) => manager.set_state(AuthState::SignedOut).await,
            Err(e) => {
                manager.set_state(AuthState::SignedOut).await;
                self.emit(AuthEvent::AuthError {
                    connection: Some(key.to_string()),
                    message: e.to_string(),
                    recoverable: !e.is_revoked(),
                });
            }
        }

        outcome
    }

    /// Sign the slot out without connecting first.
    pub async fn disconnect_slot(&self, slot: &str) -> Result<()> {
        let key = CredentialKey::new(self.provider(), slot);
        self.manager_for(&key).await.sign_out().await
    }

    async fn is_online(&self) -> bool {
        match &self.network_monitor {
            Some(monitor) => monitor.is_connected().await,
            None => true,
        }
    }

    async fn manager_for(&self, key: &CredentialKey) -> Arc<TokenLifecycleManager> {
        let mut managers = self.managers.lock().await;
        managers
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(TokenLifecycleManager::new(
                    key.clone(),
                    self.store.clone(),
                    self.oauth.clone(),
                    self.clock.clone(),
                    self.token_expiry_skew,
                    self.event_bus.clone(),
                ))
            })
            .clone()
    }

    async fn connect_silently(
        &self,
        manager: &Arc<TokenLifecycleManager>,
    ) -> Result<Option<Connection>> {
        if manager.load_or_null().await?.is_none() {
            return Ok(None);
        }

        let access_token = manager.access_token().await?;
        let account = self.account_fetcher.fetch_account(&access_token).await?;

        info!(credential = %manager.key(), "Restored stored credentials");
        self.emit(AuthEvent::SignedIn {
            connection: manager.key().to_string(),
            account_id: account.account_id.clone(),
        });

        Ok(Some(Connection::new(
            self.provider(),
            manager.clone(),
            account,
        )))
    }

    async fn connect_interactively(
        &self,
        manager: &Arc<TokenLifecycleManager>,
    ) -> Result<ConnectOutcome> {
        let prompt = self.prompt.as_ref().ok_or(AuthError::PromptUnavailable)?;

        let (auth_url, verifier) = self.oauth.build_auth_url()?;
        let redirect_uri = self.oauth.config().redirect_uri.clone();

        manager.set_state(AuthState::SigningIn).await;
        self.emit(AuthEvent::SigningIn {
            provider: self.provider().as_str().to_string(),
        });

        // Dropping the prompt future on timeout releases its redirect listener
        let callback = match timeout(self.auth_timeout, prompt.authorize(&auth_url, &redirect_uri)).await
        {
            Err(_) => {
                info!(
                    timeout_secs = self.auth_timeout.as_secs(),
                    "Authorization timed out"
                );
                return Ok(ConnectOutcome::Cancelled);
            }
            Ok(Err(e)) => return Err(AuthError::PromptFailed(e.to_string())),
            Ok(Ok(None)) => {
                info!("Authorization prompt dismissed");
                return Ok(ConnectOutcome::Cancelled);
            }
            Ok(Ok(Some(callback))) => callback,
        };

        let (code, state) = match parse_redirect(&callback)? {
            RedirectOutcome::Code { code, state } => (code, state),
            RedirectOutcome::Cancelled => {
                info!("User declined authorization");
                return Ok(ConnectOutcome::Cancelled);
            }
            RedirectOutcome::Denied { error, description } => {
                warn!(error = %error, "Authorization denied");
                return Err(AuthError::AuthorizationDenied { error, description });
            }
        };

        let record = self.oauth.exchange_code(&code, &state, &verifier).await?;
        let access_token = record.access_token.clone();
        manager.install(record).await?;

        let account = match self.account_fetcher.fetch_account(&access_token).await {
            Ok(account) => account,
            Err(e) => {
                manager.discard().await;
                return Err(e);
            }
        };

        info!(credential = %manager.key(), "Interactive sign-in completed");
        self.emit(AuthEvent::SignedIn {
            connection: manager.key().to_string(),
            account_id: account.account_id.clone(),
        });

        Ok(ConnectOutcome::Connected(Connection::new(
            self.provider(),
            manager.clone(),
            account,
        )))
    }

    fn emit(&self, event: AuthEvent) {
        let _ = self.event_bus.emit(CoreEvent::Auth(event));
    }
}
