//! Rowforge Common Library
//!
//! Shared error handling, checksums, logging, and text utilities for the
//! rowforge workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all rowforge
//! workspace members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Content-hash utilities for change detection
//! - **Logging**: Centralized tracing initialization
//! - **Text**: Slug generation, price/unit extraction, and related parsing
//!
//! # Example
//!
//! ```no_run
//! use rowforge_common::{Result, checksum};
//!
//! fn hash_artifact(path: &str) -> Result<()> {
//!     let digest = checksum::compute_file_checksum(path)?;
//!     tracing::info!(%digest, "artifact hashed");
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod text;

// Re-export commonly used types
pub use error::{Result, RowforgeError};
