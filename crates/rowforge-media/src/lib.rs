//! Rowforge Media Library
//!
//! Idempotent, resumable publication of catalog imagery.
//!
//! Given a source image URL and a deterministic target identity (external
//! code + slug + 1-based index), the publisher guarantees exactly one
//! canonical artifact at the publication location without redundant
//! download, transform, or upload work across repeated runs. State lives in
//! a persistent JSON ledger keyed by the target identity.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowforge_media::{MediaConfig, MediaPublisher, store::MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let publisher = MediaPublisher::new(MediaConfig::default(), store)?;
//!     let urls = vec!["https://example.com/a.jpg".to_string()];
//!     let outcome = publisher.publish_images("ns-1001", "hand-dryer", &urls).await;
//!     println!("published {} images", outcome.published.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod fetch;
pub mod ledger;
pub mod process;
pub mod publisher;
pub mod retry;
pub mod store;

pub use ledger::{Ledger, PublishRecord};
pub use process::{ImageTransform, OutputFormat};
pub use publisher::{ImageFailure, MediaConfig, MediaPublisher, PublishOutcome, PublishedImage};
pub use retry::RetryPolicy;
pub use store::{FtpConfig, FtpStore, MemoryStore, RemoteStore};
