//! Record assembly
//!
//! Runs the per-concern handlers in fixed order, merges their fragments,
//! routes the merged keys into an `OutputRecord`, then applies configured
//! defaults, the forced-empty field list, and finally the tag taxonomy.

use crate::config::{ConverterConfig, ErrorPolicy};
use crate::context::RunContext;
use crate::handlers::{
    ContentHandler, CoreHandler, Handler, MediaHandler, SpecsHandler, TagsHandler,
};
use crate::model::{Fragment, OutputRecord, RunStats, SourceRecord};
use rowforge_common::{Result, RowforgeError};
use rowforge_media::MediaPublisher;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Aggregator {
    config: Arc<ConverterConfig>,
    handlers: Vec<Box<dyn Handler>>,
    tags: TagsHandler,
    ctx: RunContext,
    stats: RunStats,
}

impl Aggregator {
    pub fn new(config: Arc<ConverterConfig>, publisher: Arc<MediaPublisher>) -> Self {
        let handlers: Vec<Box<dyn Handler>> = vec![
            Box::new(CoreHandler::new(Arc::clone(&config))),
            Box::new(SpecsHandler::new(Arc::clone(&config))),
            Box::new(MediaHandler::new(publisher)),
            Box::new(ContentHandler::new()),
        ];
        info!(handlers = handlers.len(), "Aggregator initialized");
        Self {
            tags: TagsHandler::new(Arc::clone(&config)),
            config,
            handlers,
            ctx: RunContext::new(),
            stats: RunStats::default(),
        }
    }

    /// Reset per-run state. Call before the first record of a run.
    pub fn start_run(&mut self) {
        self.ctx.reset();
        self.stats = RunStats::default();
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Convert one source record into the canonical output shape.
    pub async fn process(&mut self, record: &SourceRecord) -> Result<OutputRecord> {
        if record.code.trim().is_empty() {
            self.stats.skipped += 1;
            self.stats
                .add_diagnostic(format!("record '{}' has no external code", record.name));
            return Err(RowforgeError::handler("aggregator", "record has no external code"));
        }
        debug!(code = %record.code, "Processing record");

        let merged = match self.run_handlers(record).await {
            Ok(merged) => merged,
            Err(err) => {
                self.stats.failed += 1;
                self.ctx.finish_record();
                return Err(err);
            }
        };

        let (published, failed) = self.ctx.media_counts();
        self.stats.images_published += published;
        self.stats.images_failed += failed;
        self.ctx.finish_record();

        let mut output = OutputRecord::default();
        for (key, value) in merged.iter() {
            output.set_field(key, value);
        }

        self.apply_defaults(&mut output);
        for field in &self.config.forced_empty {
            output.set_field(field, "");
        }

        let specs = self
            .ctx
            .specs_for(&record.specifications, SpecsHandler::parse);
        let tag_line = self
            .tags
            .generate(record, &output.taxonomy_product_brand, &specs);
        if !tag_line.is_empty() {
            output.taxonomy_product_tag = tag_line;
        }

        self.stats.processed += 1;
        debug!(code = %record.code, fields = merged.len(), "Record aggregated");
        Ok(output)
    }

    /// Run every handler, merging fragments in handler order. A failed
    /// handler contributes nothing in tolerant mode and aborts the record
    /// in strict mode.
    async fn run_handlers(&mut self, record: &SourceRecord) -> Result<Fragment> {
        let mut merged = Fragment::new();
        for handler in &self.handlers {
            let fragment = match handler.handle(record, &mut self.ctx).await {
                Ok(fragment) => fragment,
                Err(err) => match self.config.error_policy {
                    ErrorPolicy::Tolerant => {
                        warn!(handler = handler.name(), %err, "Handler failed, continuing");
                        self.stats
                            .add_diagnostic(format!("{}: {} ({})", handler.name(), err, record.code));
                        continue;
                    }
                    ErrorPolicy::Strict => {
                        return Err(RowforgeError::handler(handler.name(), err.to_string()));
                    }
                },
            };
            for (key, value) in fragment.iter() {
                if let Some(existing) = merged.get(key) {
                    if existing != value {
                        warn!(
                            handler = handler.name(),
                            key,
                            "Field collision, later handler wins"
                        );
                    }
                }
                merged.insert(key, value);
            }
        }
        Ok(merged)
    }

    /// Configured defaults fill fixed attributes the handlers left empty.
    fn apply_defaults(&self, output: &mut OutputRecord) {
        for (name, value) in &self.config.defaults {
            if output.get_fixed(name) == Some("") {
                output.set_fixed(name, value);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rowforge_media::{MediaConfig, MemoryStore};
    use tempfile::TempDir;

    fn publisher(dir: &TempDir) -> Arc<MediaPublisher> {
        let config = MediaConfig {
            download_dir: dir.path().join("downloads"),
            processed_dir: dir.path().join("processed"),
            ledger_path: dir.path().join("image_status.json"),
            ..MediaConfig::default()
        };
        Arc::new(MediaPublisher::new(config, Arc::new(MemoryStore::new())).unwrap())
    }

    fn aggregator(dir: &TempDir, config: ConverterConfig) -> Aggregator {
        Aggregator::new(Arc::new(config), publisher(dir))
    }

    fn record() -> SourceRecord {
        SourceRecord {
            name: "Сушилка для рук Ballu".to_string(),
            code: "НС-1001".to_string(),
            brand: "Ballu".to_string(),
            category: "Все товары - Сушилки для рук".to_string(),
            price: "14 990 руб.".to_string(),
            specifications: "Цвет: белый / Мощность: 2000 Вт".to_string(),
            ..SourceRecord::default()
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(
            &self,
            _record: &SourceRecord,
            _ctx: &mut RunContext,
        ) -> std::result::Result<Fragment, RowforgeError> {
            Err(RowforgeError::handler("failing", "boom"))
        }
    }

    #[tokio::test]
    async fn test_fixed_attributes_always_present() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.start_run();

        let output = aggregator.process(&record()).await.unwrap();
        let flat = output.flatten();
        for name in OutputRecord::fixed_names() {
            assert!(flat.iter().any(|(k, _)| k == name), "missing column {name}");
        }
        assert_eq!(output.regular_price, "14990");
        assert_eq!(output.taxonomy_product_cat, "Все товары > Сушилки для рук");
    }

    #[tokio::test]
    async fn test_defaults_fill_empty_fields_only() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.start_run();

        let output = aggregator.process(&record()).await.unwrap();
        assert_eq!(output.status, "publish");
        assert_eq!(output.taxonomy_product_type, "simple");
        assert_eq!(output.virtual_product, "no");
        // The handler-provided brand is not overwritten
        assert_eq!(output.taxonomy_product_brand, "Ballu");
    }

    #[tokio::test]
    async fn test_forced_empty_fields_cleared() {
        let dir = TempDir::new().unwrap();
        let mut config = ConverterConfig::default();
        config.defaults.insert("sale_price".to_string(), "99".to_string());
        let mut aggregator = aggregator(&dir, config);
        aggregator.start_run();

        let output = aggregator.process(&record()).await.unwrap();
        assert_eq!(output.sale_price, "");
        assert_eq!(output.meta.get("total_sales").map(String::as_str), Some(""));
    }

    #[tokio::test]
    async fn test_tags_fill_tag_taxonomy_after_clearing() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.start_run();

        let output = aggregator.process(&record()).await.unwrap();
        assert!(output.taxonomy_product_tag.contains("Ballu"));
    }

    #[tokio::test]
    async fn test_tolerant_mode_isolates_failed_handler() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.handlers.insert(0, Box::new(FailingHandler));
        aggregator.start_run();

        let output = aggregator.process(&record()).await.unwrap();
        assert_eq!(output.title, "Сушилка для рук Ballu");
        assert_eq!(aggregator.stats().processed, 1);
        assert_eq!(aggregator.stats().diagnostics().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_mode_aborts_record() {
        let dir = TempDir::new().unwrap();
        let config = ConverterConfig {
            error_policy: ErrorPolicy::Strict,
            ..ConverterConfig::default()
        };
        let mut aggregator = aggregator(&dir, config);
        aggregator.handlers.insert(0, Box::new(FailingHandler));
        aggregator.start_run();

        let result = aggregator.process(&record()).await;
        assert!(matches!(result, Err(RowforgeError::Handler { .. })));
        assert_eq!(aggregator.stats().failed, 1);
        assert_eq!(aggregator.stats().processed, 0);
    }

    #[tokio::test]
    async fn test_record_without_code_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.start_run();

        let result = aggregator
            .process(&SourceRecord {
                name: "Без кода".to_string(),
                ..SourceRecord::default()
            })
            .await;
        assert!(result.is_err());
        assert_eq!(aggregator.stats().skipped, 1);
    }

    #[tokio::test]
    async fn test_slug_collisions_within_run() {
        let dir = TempDir::new().unwrap();
        let mut aggregator = aggregator(&dir, ConverterConfig::default());
        aggregator.start_run();

        let first = aggregator.process(&record()).await.unwrap();
        let mut second_record = record();
        second_record.code = "НС-1002".to_string();
        let second = aggregator.process(&second_record).await.unwrap();

        assert_eq!(first.slug, "sushilka-dlya-ruk-ballu");
        assert_eq!(second.slug, "sushilka-dlya-ruk-ballu-2");
    }
}
