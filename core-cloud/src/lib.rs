//! # Core Cloud
//!
//! Provider-neutral storage layer shared by every back-end adapter.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`CloudPath`] and [`CloudFile`], the caller-facing path and metadata model
//! - [`CloudStorage`], the operations every adapter implements
//! - [`RequestExecutor`], bearer injection with one refresh-and-retry on 401
//! - [`PathResolver`] for back ends addressed by native ids
//! - [`drain_pages`] for cursor-based listings
//! - Partial-download cleanup for local file transfers

pub mod error;
pub mod executor;
pub mod file;
pub mod mapper;
pub mod pagination;
pub mod path;
pub mod resolver;
pub mod storage;
pub mod transfer;

pub use error::{CloudError, Result};
pub use executor::{
    classify_status, error_excerpt, json_body, RequestExecutor, ResponseClassifier,
    StatusClassifier,
};
pub use file::{parse_timestamp, CloudFile, META_ID, META_MIME_TYPE, META_REVISION};
pub use mapper::{child_path, FileMapper};
pub use pagination::{drain_pages, Page};
pub use path::CloudPath;
pub use resolver::{escape_query_literal, ChildNode, NodeLookup, PathResolver, ResolvedNode};
pub use storage::{ignore_not_found, ByteReader, CloudStorage};
