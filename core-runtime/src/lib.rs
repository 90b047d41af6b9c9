//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the cloud storage core:
//! - Logging and tracing infrastructure
//! - Configuration management and OAuth client registration
//! - Event bus for credential lifecycle notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the auth and storage crates
//! depend on. It establishes the logging conventions, the fail-fast
//! configuration builder and the event broadcasting used throughout the
//! system.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{AccessLevel, ClientCredentials, CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus};
