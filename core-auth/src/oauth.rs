//! OAuth 2.0 Authorization Flow Manager with PKCE Support
//!
//! This module implements RFC 6749 (OAuth 2.0) and RFC 7636 (PKCE) for the
//! authorization-code flow used by every supported back end.
//!
//! # Overview
//!
//! The OAuth flow manager handles:
//! - Building authorization URLs with PKCE challenge
//! - Parsing the redirect that comes back from the browser
//! - Exchanging authorization codes for tokens
//! - Refreshing access tokens, and telling a revoked grant apart from a
//!   transient failure
//!
//! # Security
//!
//! - Generates cryptographically secure random state and code verifier
//! - Validates state parameter to prevent CSRF attacks
//! - Never logs sensitive values (tokens, codes, verifiers)
//!
//! # Example
//!
//! ```no_run
//! use core_auth::oauth::{OAuthConfig, OAuthFlowManager};
//! use core_auth::ProviderKind;
//! use core_runtime::config::{AccessLevel, ClientCredentials};
//! use bridge_traits::time::SystemClock;
//! use std::sync::Arc;
//!
//! # fn example(http_client: Arc<dyn bridge_traits::HttpClient>) -> core_auth::Result<()> {
//! let credentials = ClientCredentials::new("client-id", "http://127.0.0.1:8765/callback");
//! let config = OAuthConfig::for_provider(ProviderKind::Dropbox, AccessLevel::AppFolder, &credentials);
//!
//! let flow = OAuthFlowManager::new(config, http_client, Arc::new(SystemClock));
//! let (auth_url, pkce_verifier) = flow.build_auth_url()?;
//! // Send the user to auth_url...
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use crate::types::{ProviderKind, TokenRecord};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::Clock;
use core_runtime::config::{AccessLevel, ClientCredentials};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use url::Url;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_SCOPE_APPDATA: &str = "https://www.googleapis.com/auth/drive.appdata";
const GOOGLE_SCOPE_DRIVE: &str = "https://www.googleapis.com/auth/drive";

const MICROSOFT_AUTH_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/authorize";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

const DROPBOX_AUTH_URL: &str = "https://www.dropbox.com/oauth2/authorize";
const DROPBOX_TOKEN_URL: &str = "https://api.dropboxapi.com/oauth2/token";
const DROPBOX_SCOPES: &[&str] = &[
    "account_info.read",
    "files.metadata.read",
    "files.metadata.write",
    "files.content.read",
    "files.content.write",
    "sharing.read",
    "sharing.write",
];

/// Token endpoint errors that mean the grant itself is gone.
const REVOKED_GRANT_ERRORS: &[&str] = &["invalid_grant", "access_denied", "unauthorized_client"];

const REFRESH_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// OAuth 2.0 provider configuration.
#[derive(Clone)]
pub struct OAuthConfig {
    pub provider: ProviderKind,
    pub client_id: String,
    /// OAuth client secret (optional for public clients)
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub auth_url: String,
    pub token_url: String,
    /// Provider-specific authorization query parameters.
    pub extra_auth_params: Vec<(String, String)>,
}

impl OAuthConfig {
    /// Endpoints, scopes and authorization extras for a back end.
    pub fn for_provider(
        provider: ProviderKind,
        access_level: AccessLevel,
        credentials: &ClientCredentials,
    ) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let pairs = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>()
        };

        let (auth_url, token_url, scopes, extra_auth_params) = match provider {
            ProviderKind::GoogleDrive => (
                GOOGLE_AUTH_URL,
                GOOGLE_TOKEN_URL,
                owned(&[match access_level {
                    AccessLevel::AppFolder => GOOGLE_SCOPE_APPDATA,
                    AccessLevel::FullAccess => GOOGLE_SCOPE_DRIVE,
                }]),
                // Without consent Google omits the refresh token on re-authorization
                pairs(&[("access_type", "offline"), ("prompt", "consent")]),
            ),
            ProviderKind::OneDrive => (
                MICROSOFT_AUTH_URL,
                MICROSOFT_TOKEN_URL,
                owned(&[
                    match access_level {
                        AccessLevel::AppFolder => "Files.ReadWrite.AppFolder",
                        AccessLevel::FullAccess => "Files.ReadWrite.All",
                    },
                    "User.Read",
                    "offline_access",
                ]),
                Vec::new(),
            ),
            ProviderKind::Dropbox => (
                DROPBOX_AUTH_URL,
                DROPBOX_TOKEN_URL,
                owned(DROPBOX_SCOPES),
                pairs(&[("token_access_type", "offline")]),
            ),
        };

        Self {
            provider,
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            redirect_uri: credentials.redirect_uri.clone(),
            scopes,
            auth_url: auth_url.to_string(),
            token_url: token_url.to_string(),
            extra_auth_params,
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

/// PKCE (Proof Key for Code Exchange) verifier plus CSRF state.
///
/// The verifier never leaves the process until the code exchange; only the
/// challenge derived from it is sent during authorization.
#[derive(Clone)]
pub struct PkceVerifier {
    verifier: String,
    state: String,
}

impl PkceVerifier {
    /// Create a new PKCE verifier with cryptographically secure random values.
    ///
    /// 64 random bytes give an 86 character verifier, inside the 43..=128
    /// range RFC 7636 allows. Both values use URL-safe base64 without padding.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();

        let mut verifier_bytes = [0u8; 64];
        rng.fill(&mut verifier_bytes[..]);
        let verifier = URL_SAFE_NO_PAD.encode(verifier_bytes);

        let mut state_bytes = [0u8; 32];
        rng.fill(&mut state_bytes[..]);
        let state = URL_SAFE_NO_PAD.encode(state_bytes);

        Self { verifier, state }
    }

    pub fn verifier(&self) -> &str {
        &self.verifier
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    /// S256 challenge: BASE64URL(SHA256(code_verifier))
    pub fn challenge(&self) -> String {
        let hash = Sha256::digest(self.verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

impl Default for PkceVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PkceVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceVerifier")
            .field("verifier", &"[REDACTED]")
            .field("state", &self.state)
            .finish()
    }
}

/// What the authorization redirect carried back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectOutcome {
    /// The user approved; exchange `code` after checking `state`.
    Code { code: String, state: String },
    /// The user declined or closed the consent page.
    Cancelled,
    /// The server refused for another reason.
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// Classify a redirect URL's query parameters.
///
/// `error=access_denied`, or a redirect with neither `code` nor `error`, is
/// a cancellation.
pub fn parse_redirect(callback_url: &str) -> Result<RedirectOutcome> {
    let url = Url::parse(callback_url)
        .map_err(|e| AuthError::InvalidAuthCode(format!("Malformed redirect: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut description = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    Ok(match (code, error) {
        (_, Some(error)) if error == "access_denied" => RedirectOutcome::Cancelled,
        (_, Some(error)) => RedirectOutcome::Denied { error, description },
        (Some(code), None) => RedirectOutcome::Code {
            code,
            state: state.unwrap_or_default(),
        },
        (None, None) => RedirectOutcome::Cancelled,
    })
}

/// Exchanges a refresh token for a fresh token record.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// # Errors
    ///
    /// [`AuthError::AuthRevoked`] when the server rejects the grant itself;
    /// any other error is treated as transient.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord>;
}

/// OAuth 2.0 flow manager for one back end.
pub struct OAuthFlowManager {
    config: OAuthConfig,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
}

impl OAuthFlowManager {
    pub fn new(config: OAuthConfig, http_client: Arc<dyn HttpClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            http_client,
            clock,
        }
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Build the authorization URL with PKCE challenge.
    ///
    /// Returns the URL and the verifier, which must be kept until the
    /// redirect comes back.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorization endpoint is not a URL.
    #[instrument(skip(self), fields(provider = %self.config.provider))]
    pub fn build_auth_url(&self) -> Result<(String, PkceVerifier)> {
        let verifier = PkceVerifier::new();
        let challenge = verifier.challenge();

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AuthError::Other(format!("Invalid auth URL: {}", e)))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("client_id", &self.config.client_id);
            query.append_pair("redirect_uri", &self.config.redirect_uri);
            query.append_pair("response_type", "code");
            query.append_pair("scope", &self.config.scopes.join(" "));
            query.append_pair("state", verifier.state());
            query.append_pair("code_challenge", &challenge);
            query.append_pair("code_challenge_method", "S256");
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
        }

        debug!("Built authorization URL");

        Ok((url.to_string(), verifier))
    }

    /// Exchange an authorization code for a token record.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The state doesn't match (CSRF protection)
    /// - The token endpoint rejects the code
    /// - Network errors occur
    #[instrument(skip(self, code, state, verifier), fields(provider = %self.config.provider))]
    pub async fn exchange_code(
        &self,
        code: &str,
        state: &str,
        verifier: &PkceVerifier,
    ) -> Result<TokenRecord> {
        if state != verifier.state() {
            warn!("OAuth state mismatch on redirect");
            return Err(AuthError::StateMismatch {
                expected: verifier.state().to_string(),
                actual: state.to_string(),
            });
        }

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("code_verifier", verifier.verifier()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        debug!("Exchanging authorization code for tokens");

        let response = self
            .post_form(&params)
            .await
            .map_err(|e| AuthError::NetworkError(e.to_string()))?;

        if !response.is_success() {
            let status = response.status;
            let error = TokenErrorResponse::from_response(&response);
            warn!(status, error = %error.error, "Authorization code exchange failed");
            return Err(AuthError::InvalidAuthCode(format!(
                "Token endpoint returned {}: {}",
                status, error
            )));
        }

        let record = self.parse_token_response(&response, None)?;
        info!(
            has_refresh_token = record.refresh_token.is_some(),
            "Exchanged authorization code for tokens"
        );
        Ok(record)
    }

    /// Refresh an access token.
    ///
    /// 5xx responses are retried with exponential backoff; 4xx responses fail
    /// immediately. A response that omits `refresh_token` keeps the one that
    /// was sent.
    #[instrument(skip(self, refresh_token), fields(provider = %self.config.provider))]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenRecord> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        debug!("Refreshing access token");

        let mut attempts = 0;
        loop {
            attempts += 1;

            let response = self
                .post_form(&params)
                .await
                .map_err(|e| AuthError::TokenRefreshFailed(e.to_string()))?;

            if response.is_success() {
                let record = self.parse_token_response(&response, Some(refresh_token))?;
                info!(expires_at = %record.expires_at, "Refreshed access token");
                return Ok(record);
            }

            let status = response.status;
            let error = TokenErrorResponse::from_response(&response);

            if response.is_client_error() {
                if error.is_revoked_grant() {
                    warn!(status, error = %error.error, "Refresh grant rejected by provider");
                    return Err(AuthError::AuthRevoked(error.to_string()));
                }

                warn!(status, error = %error.error, "Token refresh failed without retry");
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token endpoint returned {}: {}",
                    status, error
                )));
            }

            if attempts >= REFRESH_MAX_ATTEMPTS {
                return Err(AuthError::TokenRefreshFailed(format!(
                    "Token refresh failed after {} attempts. Last error: {} - {}",
                    attempts, status, error
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                status,
                attempts,
                delay_ms = delay.as_millis() as u64,
                "Token refresh failed, retrying"
            );
            sleep(delay).await;
        }
    }

    async fn post_form(
        &self,
        params: &[(&str, &str)],
    ) -> bridge_traits::error::Result<HttpResponse> {
        let body = serde_urlencoded::to_string(params).map_err(|e| {
            bridge_traits::BridgeError::OperationFailed(format!(
                "Failed to encode token request: {}",
                e
            ))
        })?;

        let request = HttpRequest::post(self.config.token_url.clone())
            .header("Accept", "application/json")
            .form(body);

        self.http_client.execute(request).await
    }

    fn parse_token_response(
        &self,
        response: &HttpResponse,
        previous_refresh_token: Option<&str>,
    ) -> Result<TokenRecord> {
        let token: TokenResponse = response
            .json()
            .map_err(|e| AuthError::Other(format!("Failed to parse token response: {}", e)))?;

        Ok(TokenRecord::issued_at(
            self.clock.now(),
            token.access_token,
            token
                .refresh_token
                .or_else(|| previous_refresh_token.map(str::to_string)),
            token.token_type.unwrap_or_else(|| "Bearer".to_string()),
            token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
        ))
    }
}

#[async_trait]
impl TokenRefresher for OAuthFlowManager {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRecord> {
        self.refresh_access_token(refresh_token).await
    }
}

/// Token response from the OAuth provider.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
}

/// RFC 6749 §5.2 error body.
#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn from_response(response: &HttpResponse) -> Self {
        response.json().unwrap_or_else(|_| Self {
            error: response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string()),
            error_description: None,
        })
    }

    fn is_revoked_grant(&self) -> bool {
        REVOKED_GRANT_ERRORS.contains(&self.error.as_str())
    }
}

impl fmt::Display for TokenErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(description) => write!(f, "{}: {}", self.error, description),
            None => f.write_str(&self.error),
        }
    }
}
