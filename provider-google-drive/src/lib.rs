//! # Google Drive Provider
//!
//! Implements `CloudStorage` for Google Drive API v3.
//!
//! ## Overview
//!
//! This module provides:
//! - OAuth 2.0 wiring for Google (offline access, forced consent)
//! - Path resolution over Drive's parent-chained file IDs
//! - Paginated listing via `nextPageToken`
//! - Two-step uploads (metadata, then media) with lazy parent creation
//! - Streaming downloads and anyone-with-link sharing

pub mod account;
pub mod connector;
pub mod error;
pub mod mapper;
pub mod types;

pub use account::DriveAccountFetcher;
pub use connector::GoogleDriveConnector;
pub use error::DriveClassifier;
pub use mapper::DriveFileMapper;
