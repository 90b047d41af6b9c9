//! # Authentication Module
//!
//! Credential lifecycle for every supported cloud storage back end.
//!
//! ## Overview
//!
//! This crate turns OAuth 2.0 grants into live [`Connection`]s. It persists
//! token records in the host's secure store, refreshes them on expiry (one
//! refresh in flight per connection), and falls back to an interactive
//! authorization-code + PKCE flow when stored credentials are missing or
//! revoked.
//!
//! ## Features
//!
//! - OAuth 2.0 authorization flows with PKCE support
//! - Single-flight token refresh with revoked-grant detection
//! - Secure token storage via platform-specific secure stores
//! - Multi-provider support (Google Drive, OneDrive, Dropbox)
//! - Several accounts per provider through credential slots
//! - Auth state event emission

pub mod connection;
pub mod error;
pub mod flow;
pub mod manager;
pub mod oauth;
pub mod token_store;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connection::Connection;
pub use error::{AuthError, Result};
pub use flow::{AccountFetcher, AuthFlowController, ConnectOutcome};
pub use manager::TokenLifecycleManager;
pub use oauth::{
    parse_redirect, OAuthConfig, OAuthFlowManager, PkceVerifier, RedirectOutcome, TokenRefresher,
};
pub use token_store::CredentialStore;
pub use types::{
    AccountSummary, AuthState, CredentialKey, ProviderKind, TokenRecord, DEFAULT_SLOT,
};
