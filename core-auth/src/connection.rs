use crate::error::Result;
use crate::manager::TokenLifecycleManager;
use crate::types::{AccountSummary, AuthState, CredentialKey, ProviderKind};
use std::fmt;
use std::sync::Arc;

/// A live, authenticated link to one back-end account.
///
/// Produced by [`AuthFlowController::connect`](crate::AuthFlowController::connect)
/// and passed explicitly to every storage operation. Clones share the same
/// token manager, so a refresh performed through one clone is seen by all.
#[derive(Clone)]
pub struct Connection {
    provider: ProviderKind,
    tokens: Arc<TokenLifecycleManager>,
    account: AccountSummary,
}

impl Connection {
    pub fn new(
        provider: ProviderKind,
        tokens: Arc<TokenLifecycleManager>,
        account: AccountSummary,
    ) -> Self {
        Self {
            provider,
            tokens,
            account,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn key(&self) -> &CredentialKey {
        self.tokens.key()
    }

    /// Account fetched when the connection was established.
    pub fn account(&self) -> &AccountSummary {
        &self.account
    }

    pub fn tokens(&self) -> &Arc<TokenLifecycleManager> {
        &self.tokens
    }

    pub async fn state(&self) -> AuthState {
        self.tokens.state().await
    }

    /// Current access token, refreshed first when it has expired.
    pub async fn access_token(&self) -> Result<String> {
        self.tokens.access_token().await
    }

    /// Replace `stale_token` after the back end rejected it.
    pub async fn refresh_rejected(&self, stale_token: &str) -> Result<String> {
        self.tokens.refresh_rejected(stale_token).await
    }

    /// Clear stored credentials. Further requests fail with `NotAuthenticated`.
    pub async fn logout(&self) -> Result<()> {
        self.tokens.sign_out().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("provider", &self.provider)
            .field("key", self.tokens.key())
            .field("account", &self.account)
            .finish()
    }
}
