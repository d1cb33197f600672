//! Media publishing pipeline
//!
//! For each source URL of an item the publisher fetches the original,
//! transforms it, uploads the artifact, and returns the public URL it will
//! be reachable at. Every step is guarded by the ledger so re-running a
//! completed item performs no remote work at all.

use crate::fetch::ImageFetcher;
use crate::ledger::Ledger;
use crate::process::ImageTransform;
use crate::retry::RetryPolicy;
use crate::store::RemoteStore;
use futures::stream::{self, StreamExt};
use rowforge_common::checksum::{compute_bytes_checksum, compute_file_checksum};
use rowforge_common::{Result, RowforgeError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Placeholder-based template for published URLs. Supported placeholders:
/// `{code}`, `{slug}`, `{index}` (1-based), `{ext}`.
pub const DEFAULT_URL_TEMPLATE: &str = "uploads/{code}-{slug}-{index}.{ext}";

/// Publisher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Template rendered into the public URL of each artifact
    pub url_template: String,
    /// Where fetched originals are kept
    pub download_dir: PathBuf,
    /// Where transformed artifacts are kept
    pub processed_dir: PathBuf,
    /// Ledger file location
    pub ledger_path: PathBuf,
    /// Fetch concurrency per item
    pub max_parallel_fetches: usize,
    /// Per-request HTTP timeout in seconds
    pub fetch_timeout_secs: u64,
    #[serde(skip, default)]
    pub retry: RetryPolicy,
    pub transform: ImageTransform,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            download_dir: PathBuf::from("media/downloads"),
            processed_dir: PathBuf::from("media/processed"),
            ledger_path: PathBuf::from("media/image_status.json"),
            max_parallel_fetches: 4,
            fetch_timeout_secs: 30,
            retry: RetryPolicy::default(),
            transform: ImageTransform::default(),
        }
    }
}

/// One successfully published image
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedImage {
    /// 1-based position in the item's image list
    pub index: usize,
    pub source_url: String,
    /// Basename of the stored artifact
    pub filename: String,
    /// Public URL rendered from the template
    pub url: String,
}

/// One image that could not be published this run
#[derive(Debug, Clone)]
pub struct ImageFailure {
    pub index: usize,
    pub source_url: String,
    pub reason: String,
}

/// Result of publishing one item's images. `published` keeps source
/// order; failed images are absent from it, never holes.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    pub published: Vec<PublishedImage>,
    pub failures: Vec<ImageFailure>,
}

struct FetchPlan {
    index: usize,
    url: String,
    key: String,
    original_path: PathBuf,
    skip_fetch: bool,
}

enum FetchResult {
    /// Original already on disk with the recorded hash
    Cached(FetchPlan),
    Fetched(FetchPlan, Vec<u8>),
    Failed(FetchPlan, RowforgeError),
}

impl FetchResult {
    fn index(&self) -> usize {
        match self {
            Self::Cached(plan) | Self::Fetched(plan, _) => plan.index,
            Self::Failed(plan, _) => plan.index,
        }
    }
}

/// Idempotent image publisher
pub struct MediaPublisher {
    config: MediaConfig,
    fetcher: ImageFetcher,
    store: Arc<dyn RemoteStore>,
    ledger: Mutex<Ledger>,
}

impl MediaPublisher {
    pub fn new(config: MediaConfig, store: Arc<dyn RemoteStore>) -> Result<Self> {
        let fetcher = ImageFetcher::new(Duration::from_secs(config.fetch_timeout_secs))?;
        let ledger = Mutex::new(Ledger::load_or_default(&config.ledger_path));

        std::fs::create_dir_all(&config.download_dir)?;
        std::fs::create_dir_all(&config.processed_dir)?;

        Ok(Self {
            config,
            fetcher,
            store,
            ledger,
        })
    }

    /// Render the public URL for one image of an item
    pub fn render_url(&self, code: &str, slug: &str, index: usize) -> String {
        self.config
            .url_template
            .replace("{code}", code)
            .replace("{slug}", slug)
            .replace("{index}", &index.to_string())
            .replace("{ext}", self.config.transform.format.extension())
    }

    /// Artifact basename derived from the rendered URL
    fn artifact_filename(&self, code: &str, slug: &str, index: usize) -> String {
        let url = self.render_url(code, slug, index);
        url.rsplit('/').next().unwrap_or(&url).to_string()
    }

    /// Publish all images of one item. Per-image failures are collected,
    /// not propagated: one broken URL must not sink the rest of the item.
    pub async fn publish_images(
        &self,
        code: &str,
        slug: &str,
        source_urls: &[String],
    ) -> PublishOutcome {
        let mut outcome = PublishOutcome::default();
        if source_urls.is_empty() {
            return outcome;
        }

        let plans = self.plan_fetches(code, slug, source_urls).await;

        // Fetch stage runs with bounded concurrency; everything after is
        // sequential per image so ledger writes stay ordered.
        let mut results: Vec<FetchResult> = stream::iter(plans)
            .map(|plan| self.run_fetch(plan))
            .buffer_unordered(self.config.max_parallel_fetches.max(1))
            .collect()
            .await;
        results.sort_by_key(FetchResult::index);

        for result in results {
            match result {
                FetchResult::Failed(plan, error) => {
                    warn!(url = %plan.url, index = plan.index, error = %error, "Image fetch failed");
                    outcome.failures.push(ImageFailure {
                        index: plan.index,
                        source_url: plan.url,
                        reason: error.to_string(),
                    });
                },
                FetchResult::Cached(plan) => {
                    self.finish_image(code, slug, plan, None, &mut outcome).await;
                },
                FetchResult::Fetched(plan, bytes) => {
                    self.finish_image(code, slug, plan, Some(bytes), &mut outcome).await;
                },
            }
        }

        info!(
            code,
            slug,
            published = outcome.published.len(),
            failed = outcome.failures.len(),
            "Item media published"
        );
        outcome
    }

    async fn plan_fetches(&self, code: &str, slug: &str, source_urls: &[String]) -> Vec<FetchPlan> {
        let ledger = self.ledger.lock().await;

        source_urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let index = i + 1;
                let key = Ledger::key(code, slug, index);
                let original_path = self
                    .config
                    .download_dir
                    .join(format!("{}-{}-{}.{}", code, slug, index, source_extension(url)));
                let skip_fetch = ledger
                    .get(&key)
                    .filter(|record| record.downloaded)
                    .map(|record| local_file_matches(&original_path, &record.original_hash))
                    .unwrap_or(false);

                FetchPlan {
                    index,
                    url: url.clone(),
                    key,
                    original_path,
                    skip_fetch,
                }
            })
            .collect()
    }

    async fn run_fetch(&self, plan: FetchPlan) -> FetchResult {
        if plan.skip_fetch {
            debug!(url = %plan.url, "Original cached, skipping fetch");
            return FetchResult::Cached(plan);
        }

        let url = plan.url.clone();
        match self
            .config
            .retry
            .run("image fetch", || self.fetcher.fetch(&url))
            .await
        {
            Ok(bytes) => FetchResult::Fetched(plan, bytes),
            Err(e) => FetchResult::Failed(plan, e),
        }
    }

    /// Process and upload stages for one image, appending to `outcome`
    async fn finish_image(
        &self,
        code: &str,
        slug: &str,
        plan: FetchPlan,
        fetched: Option<Vec<u8>>,
        outcome: &mut PublishOutcome,
    ) {
        match self.process_and_upload(code, slug, &plan, fetched).await {
            Ok(published) => outcome.published.push(published),
            Err(e) => {
                warn!(url = %plan.url, index = plan.index, error = %e, "Image publish failed");
                outcome.failures.push(ImageFailure {
                    index: plan.index,
                    source_url: plan.url,
                    reason: e.to_string(),
                });
            },
        }
    }

    async fn process_and_upload(
        &self,
        code: &str,
        slug: &str,
        plan: &FetchPlan,
        fetched: Option<Vec<u8>>,
    ) -> Result<PublishedImage> {
        let filename = self.artifact_filename(code, slug, plan.index);
        let artifact_path = self.config.processed_dir.join(&filename);
        let mut ledger = self.ledger.lock().await;

        if let Some(bytes) = fetched {
            std::fs::write(&plan.original_path, &bytes)?;
            let hash = compute_bytes_checksum(&bytes);
            ledger.mark_downloaded(&plan.key, &plan.original_path, hash)?;
        }

        if ledger.needs_processing(&plan.key) {
            let original = std::fs::read(&plan.original_path)?;
            let artifact = self.config.transform.apply(&original)?;
            std::fs::write(&artifact_path, &artifact)?;
            let hash = compute_bytes_checksum(&artifact);
            ledger.mark_processed(&plan.key, &artifact_path, hash)?;
        }

        if ledger.needs_upload(&plan.key) {
            let artifact = std::fs::read(&artifact_path)?;
            let hash = compute_bytes_checksum(&artifact);
            self.config
                .retry
                .run("image upload", || {
                    self.store.put(&filename, artifact.clone())
                })
                .await?;
            ledger.mark_uploaded(&plan.key, hash)?;
        } else {
            debug!(key = %plan.key, "Artifact already uploaded, skipping");
        }

        Ok(PublishedImage {
            index: plan.index,
            source_url: plan.url.clone(),
            filename,
            url: self.render_url(code, slug, plan.index),
        })
    }
}

/// True when the file exists with exactly the recorded contents
fn local_file_matches(path: &Path, expected_hash: &str) -> bool {
    if expected_hash.is_empty() {
        return false;
    }
    match compute_file_checksum(path) {
        Ok(hash) => hash == expected_hash,
        Err(_) => false,
    }
}

/// Extension of the source URL's path, defaulting to "img"
fn source_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next().and_then(|name| name.rsplit_once('.')) {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 5 => ext.to_ascii_lowercase(),
        _ => "img".to_string(),
    }
}
