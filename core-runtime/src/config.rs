//! # Core Configuration Module
//!
//! Provides configuration management for the cloud storage core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all bridges and settings the auth flow and provider
//! adapters need. It enforces fail-fast validation so a missing capability is
//! reported at startup, not halfway through a sign-in.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - All vendor calls (desktop default: reqwest)
//! - `SecureStore` - Credential persistence (desktop default: OS keychain)
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Reachability check before authenticating
//! - `AuthorizationPrompt` - Interactive OAuth; without it only stored
//!   credentials can be used
//! - `Clock` - Time source for token expiry (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected for every bridge that was not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{AccessLevel, CoreConfig};
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .access_level(AccessLevel::AppFolder)
//!     .auth_timeout(Duration::from_secs(180))
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{
    AuthorizationPrompt, Clock, HttpClient, NetworkMonitor, RetryPolicy, SecureStore, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default wait for the user to finish an interactive authorization.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(120);
/// Shortest accepted authorization timeout.
pub const MIN_AUTH_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest accepted authorization timeout.
pub const MAX_AUTH_TIMEOUT: Duration = Duration::from_secs(600);
/// Tokens are treated as expired this long before their real expiry.
pub const DEFAULT_TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(300);
/// Loopback redirect used when none is configured.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";

/// How much of the user's storage an app may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// App-private folder only.
    #[default]
    AppFolder,
    /// The whole account.
    FullAccess,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::AppFolder => "app_folder",
            AccessLevel::FullAccess => "full_access",
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "app_folder" | "appfolder" | "app" => Ok(AccessLevel::AppFolder),
            "full_access" | "fullaccess" | "full" => Ok(AccessLevel::FullAccess),
            other => Err(Error::Config(format!("Unknown access level: {}", other))),
        }
    }
}

/// OAuth client registration for one back end.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    /// Confidential clients only; PKCE public clients leave this empty.
    pub client_secret: Option<String>,
    pub redirect_uri: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Load `<PREFIX>_CLIENT_ID`, `<PREFIX>_CLIENT_SECRET` and
    /// `<PREFIX>_REDIRECT_URI` from the process environment.
    ///
    /// Only the client id is mandatory.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| {
            lookup(&format!("{}_{}", prefix, suffix)).filter(|value| !value.trim().is_empty())
        };

        let client_id = var("CLIENT_ID").ok_or_else(|| {
            Error::Config(format!(
                "{}_CLIENT_ID is not set. Register an OAuth client and export its id.",
                prefix
            ))
        })?;

        Ok(Self {
            client_id,
            client_secret: var("CLIENT_SECRET"),
            redirect_uri: var("REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
        })
    }
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Configuration shared by the auth flow and every provider adapter.
#[derive(Clone)]
pub struct CoreConfig {
    pub http_client: Arc<dyn HttpClient>,
    pub secure_store: Arc<dyn SecureStore>,
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    pub authorization_prompt: Option<Arc<dyn AuthorizationPrompt>>,
    pub clock: Arc<dyn Clock>,
    pub event_bus: EventBus,
    /// How long an interactive authorization may wait for the redirect.
    pub auth_timeout: Duration,
    /// Safety margin subtracted from token expiry.
    pub token_expiry_skew: Duration,
    pub access_level: AccessLevel,
    /// Transport retry policy for vendor calls.
    pub retry_policy: RetryPolicy,
}

impl fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreConfig")
            .field("http_client", &"<HttpClient>")
            .field("secure_store", &"<SecureStore>")
            .field(
                "network_monitor",
                &self.network_monitor.as_ref().map(|_| "<NetworkMonitor>"),
            )
            .field(
                "authorization_prompt",
                &self
                    .authorization_prompt
                    .as_ref()
                    .map(|_| "<AuthorizationPrompt>"),
            )
            .field("auth_timeout", &self.auth_timeout)
            .field("token_expiry_skew", &self.token_expiry_skew)
            .field("access_level", &self.access_level)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The authorization timeout lies within 30 s..=10 min
    /// - The expiry skew is shorter than one hour
    /// - The retry policy makes at least one attempt
    pub fn validate(&self) -> Result<()> {
        if self.auth_timeout < MIN_AUTH_TIMEOUT || self.auth_timeout > MAX_AUTH_TIMEOUT {
            return Err(Error::Config(format!(
                "Authorization timeout must be between {}s and {}s, got {}s",
                MIN_AUTH_TIMEOUT.as_secs(),
                MAX_AUTH_TIMEOUT.as_secs(),
                self.auth_timeout.as_secs()
            )));
        }

        if self.token_expiry_skew >= Duration::from_secs(3600) {
            return Err(Error::Config(
                "Token expiry skew must be shorter than one hour".to_string(),
            ));
        }

        if self.retry_policy.max_attempts == 0 {
            return Err(Error::Config(
                "Retry policy must allow at least one attempt".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, message: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: message.to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(policy: &RetryPolicy) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> =
        Arc::new(ReqwestHttpClient::new().with_retry_policy(policy.clone()));
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_policy: &RetryPolicy) -> Result<Arc<dyn HttpClient>> {
    Err(capability_missing(
        "HttpClient",
        "HttpClient implementation is required for vendor API calls. \
         Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
         Mobile: inject the platform HTTP stack.",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    use bridge_desktop::KeyringSecureStore;

    let store: Arc<dyn SecureStore> = Arc::new(KeyringSecureStore::new());
    Ok(store)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_secure_store() -> Result<Arc<dyn SecureStore>> {
    Err(capability_missing(
        "SecureStore",
        "SecureStore implementation is required for credential persistence. \
         Desktop: enable the 'desktop-shims' feature to use the default KeyringSecureStore. \
         Mobile: inject platform-native secure storage (Keychain/Keystore).",
    ))
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Option<Arc<dyn NetworkMonitor>> {
    None
}

#[cfg(feature = "desktop-shims")]
fn provide_default_prompt() -> Option<Arc<dyn AuthorizationPrompt>> {
    Some(Arc::new(bridge_desktop::LoopbackAuthorizationPrompt::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_prompt() -> Option<Arc<dyn AuthorizationPrompt>> {
    None
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    http_client: Option<Arc<dyn HttpClient>>,
    secure_store: Option<Arc<dyn SecureStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    authorization_prompt: Option<Arc<dyn AuthorizationPrompt>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
    auth_timeout: Option<Duration>,
    token_expiry_skew: Option<Duration>,
    access_level: AccessLevel,
    retry_policy: Option<RetryPolicy>,
}

impl CoreConfigBuilder {
    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the secure store implementation.
    pub fn secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Sets the network monitor implementation (optional).
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Sets the interactive authorization prompt (optional).
    pub fn authorization_prompt(mut self, prompt: Arc<dyn AuthorizationPrompt>) -> Self {
        self.authorization_prompt = Some(prompt);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share an existing event bus instead of creating a fresh one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = Some(timeout);
        self
    }

    pub fn token_expiry_skew(mut self, skew: Duration) -> Self {
        self.token_expiry_skew = Some(skew);
        self
    }

    pub fn access_level(mut self, level: AccessLevel) -> Self {
        self.access_level = level;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Builds the final configuration, filling platform defaults where the
    /// `desktop-shims` feature provides them.
    pub fn build(self) -> Result<CoreConfig> {
        let retry_policy = self.retry_policy.unwrap_or_default();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(&retry_policy)?,
        };

        let secure_store = match self.secure_store {
            Some(store) => store,
            None => provide_default_secure_store()?,
        };

        let config = CoreConfig {
            http_client,
            secure_store,
            network_monitor: self
                .network_monitor
                .or_else(provide_default_network_monitor),
            authorization_prompt: self.authorization_prompt.or_else(provide_default_prompt),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus: self.event_bus.unwrap_or_default(),
            auth_timeout: self.auth_timeout.unwrap_or(DEFAULT_AUTH_TIMEOUT),
            token_expiry_skew: self.token_expiry_skew.unwrap_or(DEFAULT_TOKEN_EXPIRY_SKEW),
            access_level: self.access_level,
            retry_policy,
        };

        config.validate()?;

        Ok(config)
    }
}
