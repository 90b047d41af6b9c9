use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AuthError;

/// Account slot used when the caller does not name one.
pub const DEFAULT_SLOT: &str = "default";

/// Supported cloud storage providers.
///
/// Each provider has its own OAuth 2.0 configuration and API endpoints.
///
/// # Examples
///
/// ```
/// use core_auth::ProviderKind;
///
/// let provider = ProviderKind::Dropbox;
/// assert_eq!(provider.display_name(), "Dropbox");
/// assert_eq!(provider.as_str(), "dropbox");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Drive cloud storage
    GoogleDrive,
    /// Microsoft OneDrive cloud storage
    OneDrive,
    /// Dropbox cloud storage
    Dropbox,
}

impl ProviderKind {
    /// Get the human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "Google Drive",
            ProviderKind::OneDrive => "OneDrive",
            ProviderKind::Dropbox => "Dropbox",
        }
    }

    /// Get the provider identifier string
    ///
    /// Used for logging, credential keys and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "google_drive",
            ProviderKind::OneDrive => "onedrive",
            ProviderKind::Dropbox => "dropbox",
        }
    }

    /// Prefix of the environment variables holding this provider's client
    /// registration (`<PREFIX>_CLIENT_ID`, ...).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::GoogleDrive => "GOOGLE",
            ProviderKind::OneDrive => "ONEDRIVE",
            ProviderKind::Dropbox => "DROPBOX",
        }
    }

    /// Parse a provider kind from a string identifier
    ///
    /// ```
    /// use core_auth::ProviderKind;
    ///
    /// assert_eq!(ProviderKind::parse("google_drive"), Some(ProviderKind::GoogleDrive));
    /// assert_eq!(ProviderKind::parse("icloud"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google_drive" | "googledrive" | "gdrive" => Some(ProviderKind::GoogleDrive),
            "onedrive" | "one_drive" => Some(ProviderKind::OneDrive),
            "dropbox" => Some(ProviderKind::Dropbox),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AuthError::InvalidProvider(s.to_string()))
    }
}

/// Identity of one stored credential: a provider plus an account slot.
///
/// Slots let two accounts on the same back end live side by side.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub provider: ProviderKind,
    pub slot: String,
}

impl CredentialKey {
    pub fn new(provider: ProviderKind, slot: impl Into<String>) -> Self {
        Self {
            provider,
            slot: slot.into(),
        }
    }

    pub fn default_for(provider: ProviderKind) -> Self {
        Self::new(provider, DEFAULT_SLOT)
    }

    /// Key under which the record lives in the secure store.
    pub fn storage_key(&self) -> String {
        format!("oauth_tokens:{}:{}", self.provider.as_str(), self.slot)
    }
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider.as_str(), self.slot)
    }
}

/// OAuth 2.0 token record for one connection.
///
/// Expiry is stored as an absolute timestamp so a record read back after an
/// arbitrary delay is still judged correctly.
///
/// # Security
///
/// Tokens should be stored securely and never logged. The `Debug` implementation
/// redacts both tokens.
///
/// # Examples
///
/// ```
/// use core_auth::TokenRecord;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let record = TokenRecord::new("ya29.a0...", Some("1//0g...".to_string()), "Bearer", now + Duration::hours(1));
///
/// assert!(!record.is_expired_at(now, Duration::minutes(5)));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: String,
    /// Absent for back ends that did not issue one.
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        token_type: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            token_type: token_type.into(),
            expires_at,
        }
    }

    /// Build a record from a relative `expires_in` reported by a token endpoint.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        token_type: impl Into<String>,
        expires_in_secs: i64,
    ) -> Self {
        Self::new(
            access_token,
            refresh_token,
            token_type,
            now + Duration::seconds(expires_in_secs),
        )
    }

    /// `now >= expires_at - skew`.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now >= self.expires_at - skew
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Who is signed in. Fetched once per connection and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl AccountSummary {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            display_name: None,
            email: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Credential state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthState {
    /// No usable credentials.
    SignedOut,
    /// Interactive authorization in progress.
    SigningIn,
    /// Access token present and valid.
    SignedIn,
    /// Access token present but past its (skewed) expiry.
    TokenExpired,
    /// A refresh is in flight.
    TokenRefreshing,
}

impl AuthState {
    /// Whether an access token is held, valid or not.
    pub fn has_tokens(&self) -> bool {
        matches!(
            self,
            AuthState::SignedIn | AuthState::TokenExpired | AuthState::TokenRefreshing
        )
    }
}
