//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! the cloud core needs, using desktop-appropriate libraries:
//! - `HttpClient` using `reqwest` (rustls, transport retry, streamed bodies)
//! - `SecureStore` using the `keyring` crate
//! - `NetworkMonitor` using TCP reachability probes
//! - `AuthorizationPrompt` using the system browser plus a loopback redirect listener
//!
//! ## Feature Flags
//!
//! - `secure-store`: Enable OS keychain integration (default)
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{KeyringSecureStore, LoopbackAuthorizationPrompt, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() {
//!     let http_client = ReqwestHttpClient::new();
//!     let secure_store = KeyringSecureStore::new();
//!     let prompt = LoopbackAuthorizationPrompt::new();
//!
//!     // Use in core configuration
//! }
//! ```

mod auth;
mod http;
mod network;

#[cfg(feature = "secure-store")]
mod secure_store;

pub use auth::LoopbackAuthorizationPrompt;
pub use http::ReqwestHttpClient;
pub use network::DesktopNetworkMonitor;

#[cfg(feature = "secure-store")]
pub use secure_store::KeyringSecureStore;
