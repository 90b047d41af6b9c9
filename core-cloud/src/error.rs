use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

/// Caller-visible failure of a storage operation.
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("No network connection")]
    NoConnection,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// Refresh failed transiently; calling `connect` again may recover.
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Consent was withdrawn; a fresh interactive sign-in is required.
    #[error("Authorization revoked: {0}")]
    AuthRevoked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Remote error{}: {message}", status.map(|s| format!(" (status {})", s)).unwrap_or_default())]
    RemoteError {
        status: Option<u16>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        CloudError::RemoteError {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CloudError::Conflict(_))
    }

    /// Whether the caller has to sign in again before retrying.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            CloudError::NotAuthenticated | CloudError::AuthExpired(_) | CloudError::AuthRevoked(_)
        )
    }
}

impl From<AuthError> for CloudError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NoConnection => CloudError::NoConnection,
            AuthError::NotAuthenticated => CloudError::NotAuthenticated,
            AuthError::AuthRevoked(msg) => CloudError::AuthRevoked(msg),
            AuthError::TokenRefreshFailed(msg) => CloudError::AuthExpired(msg),
            AuthError::NoRefreshToken => {
                CloudError::AuthExpired("no refresh token available".to_string())
            }
            AuthError::NetworkError(msg) => CloudError::Transport(msg),
            other => CloudError::RemoteError {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<BridgeError> for CloudError {
    fn from(error: BridgeError) -> Self {
        match error {
            BridgeError::Io(e) => CloudError::Io(e),
            e if e.is_transport() => CloudError::Transport(e.to_string()),
            BridgeError::NotAvailable(msg) => CloudError::Unsupported(msg),
            other => CloudError::RemoteError {
                status: None,
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(error: serde_json::Error) -> Self {
        CloudError::RemoteError {
            status: None,
            message: format!("Malformed response: {}", error),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
