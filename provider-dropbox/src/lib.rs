//! # Dropbox Provider
//!
//! Implements `CloudStorage` for the Dropbox v2 HTTP API.
//!
//! ## Overview
//!
//! This module provides:
//! - OAuth 2.0 wiring for Dropbox (offline tokens)
//! - Path-as-identity addressing; parents are created implicitly
//! - Paginated listing via `cursor` + `has_more`
//! - Single-request and session uploads
//! - Streaming downloads and public shared links

pub mod account;
pub mod connector;
pub mod error;
pub mod mapper;
pub mod types;

pub use account::DropboxAccountFetcher;
pub use connector::DropboxConnector;
pub use error::DropboxClassifier;
pub use mapper::DropboxMapper;
