//! # OneDrive Provider
//!
//! Implements `CloudStorage` for Microsoft Graph (OneDrive personal and
//! business drives).
//!
//! ## Overview
//!
//! This module provides:
//! - OAuth 2.0 wiring for the Microsoft identity platform
//! - Path-addressed item access under the drive root or the app folder
//! - Paginated listing via `@odata.nextLink`
//! - Simple uploads for small files and upload sessions for large ones
//! - Streaming downloads and anonymous view links

pub mod account;
pub mod connector;
pub mod error;
pub mod mapper;
pub mod types;

pub use account::GraphAccountFetcher;
pub use connector::{OneDriveConnector, GRAPH_BASE};
pub use error::GraphClassifier;
pub use mapper::DriveItemMapper;
