//! Identity, pricing, and categorization

use crate::config::ConverterConfig;
use crate::context::RunContext;
use crate::handlers::Handler;
use crate::model::{Fragment, SourceRecord};
use async_trait::async_trait;
use regex::Regex;
use rowforge_common::text::{extract_price, normalize_yes_no, slugify, NO};
use rowforge_common::RowforgeError;
use std::sync::Arc;
use std::sync::LazyLock;
use tracing::debug;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap_or_else(|_| unreachable!()));

/// Handles the record's core: title, slug, identifiers, price, category,
/// barcode, excerpt, search-engine meta, default statuses.
pub struct CoreHandler {
    config: Arc<ConverterConfig>,
}

impl CoreHandler {
    pub fn new(config: Arc<ConverterConfig>) -> Self {
        Self { config }
    }

    fn title_of(record: &SourceRecord) -> String {
        let title = record.name.trim();
        if title.is_empty() {
            format!("Товар {}", record.code.trim())
        } else {
            title.to_string()
        }
    }

    fn slug_of(&self, title: &str, code: &str, ctx: &mut RunContext) -> String {
        let mut base = slugify(title);
        if base.is_empty() {
            base = slugify(code);
        }
        ctx.claim_slug(&base)
    }

    fn price_of(&self, raw: &str) -> String {
        let Some(price) = extract_price(raw) else {
            return String::new();
        };
        // The destination may want comma decimals
        if self.config.decimal_separator == "," {
            price.replace('.', ",")
        } else {
            price
        }
    }

    fn category_of(raw: &str) -> String {
        raw.trim().replace(" - ", " > ")
    }

    fn first_barcode(raw: &str) -> String {
        raw.split('/')
            .map(str::trim)
            .find(|b| !b.is_empty())
            .unwrap_or("")
            .to_string()
    }

    fn exclusive_of(raw: &str) -> String {
        let raw = raw.trim();
        if raw.is_empty() {
            return NO.to_string();
        }
        // Source phrasing is "Эксклюзив - <value>"
        let value = raw.split_once(" - ").map(|(_, v)| v).unwrap_or(raw);
        normalize_yes_no(value)
    }

    fn excerpt_of(&self, html: &str) -> String {
        let html = html.trim();
        if html.is_empty() {
            return String::new();
        }
        let text = TAG_RE.replace_all(html, " ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

        let max = self.config.excerpt_max_chars;
        if text.chars().count() > max {
            let cut: String = text.chars().take(max.saturating_sub(3)).collect();
            format!("{}...", cut.trim_end())
        } else {
            text
        }
    }

    /// Substitute `{placeholder}` templates for the search-engine meta
    /// fields. A missing upstream value substitutes as empty, never errors.
    fn seo_fields(&self, record: &SourceRecord, fragment: &mut Fragment) {
        let substitutions = [
            ("{title}", fragment.get("title").unwrap_or("").to_string()),
            ("{slug}", fragment.get("slug").unwrap_or("").to_string()),
            ("{excerpt}", fragment.get("excerpt").unwrap_or("").to_string()),
            ("{brand}", record.brand.trim().to_string()),
            ("{sku}", record.code.trim().to_string()),
        ];

        let render = |template: &str| {
            let mut value = template.to_string();
            for (placeholder, replacement) in &substitutions {
                value = value.replace(placeholder, replacement);
            }
            value
        };

        let seo = &self.config.seo;
        let fields = [
            ("meta:_seo_title", &seo.title),
            ("meta:_seo_metadesc", &seo.description),
            ("meta:_seo_focuskw", &seo.focus_keyword),
            ("meta:_seo_og_title", &seo.og_title),
            ("meta:_seo_og_description", &seo.og_description),
        ];
        for (field, template) in fields {
            if !template.is_empty() {
                fragment.insert(field, render(template));
            }
        }
    }
}

#[async_trait]
impl Handler for CoreHandler {
    fn name(&self) -> &'static str {
        "core"
    }

    async fn handle(
        &self,
        record: &SourceRecord,
        ctx: &mut RunContext,
    ) -> Result<Fragment, RowforgeError> {
        let mut fragment = Fragment::new();

        let title = Self::title_of(record);
        let slug = self.slug_of(&title, &record.code, ctx);
        ctx.set_record_slug(&slug);
        fragment.insert("title", title);
        fragment.insert("slug", slug);

        if !record.code.trim().is_empty() {
            fragment.insert("sku", record.code.trim());
        }
        if !record.article.trim().is_empty() {
            fragment.insert("meta:артикул", record.article.trim());
        }
        if !record.brand.trim().is_empty() {
            fragment.insert("taxonomy:product_brand", record.brand.trim());
        }

        fragment.insert("regular_price", self.price_of(&record.price));
        fragment.insert("taxonomy:product_cat", Self::category_of(&record.category));
        fragment.insert("meta:_global_unique_id", Self::first_barcode(&record.barcode));
        fragment.insert("meta:эксклюзив", Self::exclusive_of(&record.exclusive));
        fragment.insert("excerpt", self.excerpt_of(&record.article_html));

        self.seo_fields(record, &mut fragment);

        debug!(code = %record.code, fields = fragment.len(), "Core fields built");
        Ok(fragment)
    }
}
