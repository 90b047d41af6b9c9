use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No network connection")]
    NoConnection,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The user (or an administrator) withdrew consent. Only a fresh
    /// interactive authorization can recover.
    #[error("Authorization revoked: {0}")]
    AuthRevoked(String),

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("OAuth state mismatch: expected {expected}, got {actual}")]
    StateMismatch { expected: String, actual: String },

    #[error("Invalid authorization code: {0}")]
    InvalidAuthCode(String),

    #[error("Authorization denied: {error}{}", description.as_deref().map(|d| format!(" ({})", d)).unwrap_or_default())]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("No authorization prompt configured for interactive sign-in")]
    PromptUnavailable,

    #[error("Authorization prompt failed: {0}")]
    PromptFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to fetch account: {0}")]
    AccountFetchFailed(String),

    #[error("Secure storage unavailable: {0}")]
    SecureStorageUnavailable(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Whether this failure means consent is gone for good.
    pub fn is_revoked(&self) -> bool {
        matches!(self, AuthError::AuthRevoked(_))
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
