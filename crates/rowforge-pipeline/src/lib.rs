//! Rowforge Pipeline Library
//!
//! Converts raw catalog rows into canonical, schema-complete output
//! records. Each concern (core identity, specifications, media, narrative
//! content) is handled by its own transformer producing a `Fragment`; the
//! `Aggregator` merges the fragments, applies configured defaults and the
//! forced-empty field list, then attaches ranked tags.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowforge_media::{MediaPublisher, store::MemoryStore};
//! use rowforge_pipeline::{Aggregator, ConverterConfig, SourceRecord};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Arc::new(ConverterConfig::default());
//!     let store = Arc::new(MemoryStore::new());
//!     let publisher = Arc::new(MediaPublisher::new(config.media.clone(), store)?);
//!     let mut aggregator = Aggregator::new(config, publisher);
//!     aggregator.start_run();
//!
//!     let record = SourceRecord {
//!         name: "Сушилка для рук".to_string(),
//!         code: "НС-1001".to_string(),
//!         ..SourceRecord::default()
//!     };
//!     let output = aggregator.process(&record).await?;
//!     println!("{} -> {}", record.code, output.slug);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod aggregator;
pub mod config;
pub mod context;
pub mod handlers;
pub mod model;

pub use aggregator::Aggregator;
pub use config::{ConverterConfig, ErrorPolicy, SeoTemplates, TagConfig};
pub use context::RunContext;
pub use model::{Fragment, Namespace, OutputRecord, RunStats, SourceRecord};
