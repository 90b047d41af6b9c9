//! Interactive Authorization Abstraction
//!
//! The host owns the user-facing part of an OAuth authorization-code flow:
//! presenting the authorization URL in a browser or web view and capturing
//! the redirect that carries the code back to the process.

use async_trait::async_trait;

use crate::error::Result;

/// Presents an authorization URL and waits for the redirect.
///
/// # Platform Support
///
/// - **Desktop**: open the system browser, listen on a loopback redirect URI
/// - **Mobile**: custom URL scheme / deep link registered by the host app
///
/// Implementations must release any listener when the returned future is
/// dropped; callers enforce their own timeout by dropping it.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Show `authorization_url` and wait for a redirect to `redirect_uri`.
    ///
    /// Returns the full redirect URL (including its query string), or
    /// `Ok(None)` when the user dismissed the prompt without completing it.
    async fn authorize(&self, authorization_url: &str, redirect_uri: &str)
        -> Result<Option<String>>;
}
