//! Media resolution: images, video, documents

use crate::context::RunContext;
use crate::handlers::Handler;
use crate::model::{Fragment, SourceRecord};
use async_trait::async_trait;
use rowforge_common::text::{extract_video_id, is_valid_url, slugify};
use rowforge_common::RowforgeError;
use rowforge_media::{MediaPublisher, PublishOutcome};
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves the record's image URLs through the publisher and serializes
/// the surviving descriptors to the destination's delimited image syntax.
/// Video and document URLs pass through as meta fields.
pub struct MediaHandler {
    publisher: Arc<MediaPublisher>,
}

impl MediaHandler {
    pub fn new(publisher: Arc<MediaPublisher>) -> Self {
        Self { publisher }
    }

    fn image_entries(record: &SourceRecord, outcome: &PublishOutcome) -> String {
        let display_name = record.name.split_whitespace().collect::<Vec<_>>().join(" ");
        outcome
            .published
            .iter()
            .map(|image| {
                format!(
                    "{} ! alt : {} ! title : {} ! desc : ! caption :",
                    image.url, display_name, display_name
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    fn source_urls(record: &SourceRecord) -> Vec<String> {
        record
            .images
            .split([',', '\n'])
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .filter(|u| {
                if is_valid_url(u) {
                    true
                } else {
                    warn!(url = u, "Skipping malformed image URL");
                    false
                }
            })
            .map(str::to_string)
            .collect()
    }

    fn video_fields(record: &SourceRecord, fragment: &mut Fragment) {
        let video_url = record.video.trim();
        if video_url.is_empty() {
            return;
        }
        fragment.insert("meta:видео_url", video_url);
        if let Some(id) = extract_video_id(video_url) {
            fragment.insert(
                "meta:видео_превью",
                format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id),
            );
        }
    }

    fn document_fields(record: &SourceRecord, fragment: &mut Fragment) {
        let documents = [
            ("meta:чертеж_url", record.drawings_url.trim()),
            ("meta:сертификат_url", record.certificates_url.trim()),
            ("meta:промо_url", record.promo_url.trim()),
            ("meta:инструкция_url", record.manuals_url.trim()),
        ];
        for (field, url) in documents {
            if !url.is_empty() && is_valid_url(url) {
                fragment.insert(field, url);
            }
        }
    }
}

#[async_trait]
impl Handler for MediaHandler {
    fn name(&self) -> &'static str {
        "media"
    }

    async fn handle(
        &self,
        record: &SourceRecord,
        ctx: &mut RunContext,
    ) -> Result<Fragment, RowforgeError> {
        let mut fragment = Fragment::new();

        let urls = Self::source_urls(record);
        if !urls.is_empty() {
            // Artifact names reuse the slug claimed upstream so two
            // records with the same title get distinct ledger keys.
            let slug = match ctx.record_slug() {
                Some(slug) => slug.to_string(),
                None => {
                    let base = slugify(record.name.trim());
                    if base.is_empty() {
                        slugify(&record.code)
                    } else {
                        base
                    }
                }
            };

            let outcome = self
                .publisher
                .publish_images(record.code.trim(), &slug, &urls)
                .await;

            ctx.note_media_outcome(outcome.published.len(), outcome.failures.len());
            if !outcome.failures.is_empty() {
                warn!(
                    code = %record.code,
                    failed = outcome.failures.len(),
                    "Some images were not published"
                );
            }
            if !outcome.published.is_empty() {
                fragment.insert("images", Self::image_entries(record, &outcome));
            }
            debug!(
                code = %record.code,
                published = outcome.published.len(),
                failed = outcome.failures.len(),
                "Images resolved"
            );
        }

        Self::video_fields(record, &mut fragment);
        Self::document_fields(record, &mut fragment);

        Ok(fragment)
    }
}
