//! Per-concern transform handlers
//!
//! Each handler turns one `SourceRecord` into a `Fragment` covering its
//! concern. The aggregator decides what a failed handler means (empty
//! fragment vs record abort), so handlers just return errors.

use crate::context::RunContext;
use crate::model::{Fragment, SourceRecord};
use async_trait::async_trait;
use rowforge_common::RowforgeError;

pub mod content;
pub mod core;
pub mod media;
pub mod specs;
pub mod tags;

pub use content::ContentHandler;
pub use core::CoreHandler;
pub use media::MediaHandler;
pub use specs::SpecsHandler;
pub use tags::TagsHandler;

/// One per-concern transform
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable name used in logs and diagnostics
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        record: &SourceRecord,
        ctx: &mut RunContext,
    ) -> Result<Fragment, RowforgeError>;
}
