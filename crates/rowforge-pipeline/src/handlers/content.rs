//! Narrative content assembly
//!
//! Builds the one rich-text `content` field from four blocks in fixed
//! order: the repaired source article, a generated specification listing,
//! a documentation/video block, and an additional-info block. This is the
//! only handler that emits markup.

use crate::context::RunContext;
use crate::handlers::specs::SpecsHandler;
use crate::handlers::Handler;
use crate::model::{Fragment, SourceRecord};
use async_trait::async_trait;
use regex::Regex;
use rowforge_common::text::{extract_video_id, is_valid_url, normalize_yes_no};
use rowforge_common::RowforgeError;
use std::sync::LazyLock;
use tracing::debug;

static HAS_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap_or_else(|_| unreachable!()));

// "&ndash;" and friends arrive mangled with exotic spaces between the
// ampersand and the entity name.
static ENTITY_NDASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&[\s\u{202F}\u{2007}\u{2060}]*ndash[\s\u{202F}\u{2007}\u{2060}]*;?")
        .unwrap_or_else(|_| unreachable!())
});
static ENTITY_BULL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&[\s\u{202F}\u{2007}\u{2060}]*bull[\s\u{202F}\u{2007}\u{2060}]*;?")
        .unwrap_or_else(|_| unreachable!())
});
static ENTITY_DEG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&[\s\u{202F}\u{2007}\u{2060}]*deg[\s\u{202F}\u{2007}\u{2060}]*;?")
        .unwrap_or_else(|_| unreachable!())
});
static LIST_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(ul|ol)[^>]*>").unwrap_or_else(|_| unreachable!()));
static INTER_TAG_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s{2,}<").unwrap_or_else(|_| unreachable!()));

/// Rewrite a list closer that does not match its opener, the known
/// `<ul>…</ol>` defect in the source feeds. Well-formed nesting passes
/// through untouched.
fn fix_list_mismatch(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut stack: Vec<String> = Vec::new();
    let mut last = 0;

    for caps in LIST_TAG_RE.captures_iter(html) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&html[last..whole.start()]);
        last = whole.end();

        let tag = name.as_str().to_lowercase();
        if whole.as_str().starts_with("</") {
            match stack.pop() {
                Some(open) if open != tag => {
                    out.push_str(&format!("</{}>", open));
                },
                _ => out.push_str(whole.as_str()),
            }
        } else {
            stack.push(tag);
            out.push_str(whole.as_str());
        }
    }
    out.push_str(&html[last..]);
    out
}

/// Repair source HTML without touching well-formed markup: unescape the
/// known entity set, collapse non-breaking-space variants, fix mismatched
/// list closers, collapse whitespace runs between tags.
pub fn repair_html(html: &str) -> String {
    let mut text = html.to_string();

    // Entities first, then the raw characters they would otherwise hide in
    text = ENTITY_NDASH_RE.replace_all(&text, "-").into_owned();
    text = ENTITY_BULL_RE.replace_all(&text, "•").into_owned();
    text = ENTITY_DEG_RE.replace_all(&text, "°").into_owned();

    text = text
        .replace('\u{202F}', " ")
        .replace('\u{2007}', " ")
        .replace('\u{2060}', " ")
        .replace("&nbsp;", " ")
        .replace('\u{00A0}', " ");

    text = fix_list_mismatch(&text);

    text = INTER_TAG_SPACE_RE.replace_all(&text, "> <").into_owned();

    text
}

/// Assembles the narrative `content` field
#[derive(Debug, Default)]
pub struct ContentHandler;

impl ContentHandler {
    pub fn new() -> Self {
        Self
    }

    fn article_block(html: &str) -> String {
        let html = html.trim();
        if html.is_empty() {
            return String::new();
        }
        let repaired = repair_html(html);
        let repaired = repaired.trim();
        if HAS_TAG_RE.is_match(repaired) {
            repaired.to_string()
        } else {
            format!("<p>{}</p>", repaired)
        }
    }

    fn specs_block(specs: &[(String, String)]) -> String {
        if specs.is_empty() {
            return String::new();
        }
        let mut sorted: Vec<&(String, String)> = specs.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut parts = vec![
            "<h2>Технические характеристики</h2>".to_string(),
            "<ul>".to_string(),
        ];
        for (key, value) in sorted {
            parts.push(format!("<li><strong>{}:</strong> {}</li>", key, value));
        }
        parts.push("</ul>".to_string());
        parts.join("\n")
    }

    fn document_links(record: &SourceRecord) -> Vec<(&'static str, &str)> {
        [
            ("Чертеж", record.drawings_url.trim()),
            ("Сертификат", record.certificates_url.trim()),
            ("Промо-материал", record.promo_url.trim()),
            ("Инструкция", record.manuals_url.trim()),
        ]
        .into_iter()
        .filter(|(_, url)| !url.is_empty() && is_valid_url(url))
        .collect()
    }

    fn docs_video_block(record: &SourceRecord) -> String {
        let title = if record.name.trim().is_empty() {
            "Товар"
        } else {
            record.name.trim()
        };

        let mut parts = Vec::new();

        let docs = Self::document_links(record);
        if !docs.is_empty() {
            parts.push("<h3>Документация</h3>".to_string());
            for (doc_type, url) in &docs {
                parts.push(format!(
                    "<p><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{} {} (PDF)</a></p>",
                    url, doc_type, title
                ));
            }
        }

        let video_url = record.video.trim();
        if !video_url.is_empty() {
            parts.push("<h3>Видеообзор</h3>".to_string());
            let video_html = match extract_video_id(video_url) {
                Some(id) => {
                    let thumbnail = format!("https://img.youtube.com/vi/{}/hqdefault.jpg", id);
                    format!(
                        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\"><img src=\"{}\" alt=\"Видеообзор: {}\" style=\"max-width: 300px;\" /></a>",
                        video_url, thumbnail, title
                    )
                },
                None => format!(
                    "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Видеообзор: {}</a>",
                    video_url, title
                ),
            };
            parts.push(format!("<p>{}</p>", video_html));
        }

        parts.join("\n")
    }

    fn additional_info_block(record: &SourceRecord) -> String {
        let mut items = Vec::new();

        if !record.brand.trim().is_empty() {
            items.push(format!("<li><strong>Бренд:</strong> {}</li>", record.brand.trim()));
        }
        if !record.article.trim().is_empty() {
            items.push(format!(
                "<li><strong>Артикул производителя:</strong> {}</li>",
                record.article.trim()
            ));
        }
        if !record.code.trim().is_empty() {
            items.push(format!("<li><strong>Код:</strong> {}</li>", record.code.trim()));
        }
        let barcodes: Vec<&str> = record
            .barcode
            .split('/')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .collect();
        if !barcodes.is_empty() {
            items.push(format!(
                "<li><strong>Штрих-коды:</strong> {}</li>",
                barcodes.join(", ")
            ));
        }
        if !record.exclusive.trim().is_empty() {
            let value = record
                .exclusive
                .split_once(" - ")
                .map(|(_, v)| v)
                .unwrap_or(&record.exclusive);
            items.push(format!(
                "<li><strong>Эксклюзив:</strong> {}</li>",
                normalize_yes_no(value)
            ));
        }

        if items.is_empty() {
            return String::new();
        }

        let mut parts = vec![
            "<h3>Дополнительная информация</h3>".to_string(),
            "<ul>".to_string(),
        ];
        parts.extend(items);
        parts.push("</ul>".to_string());
        parts.join("\n")
    }
}

#[async_trait]
impl Handler for ContentHandler {
    fn name(&self) -> &'static str {
        "content"
    }

    async fn handle(
        &self,
        record: &SourceRecord,
        ctx: &mut RunContext,
    ) -> Result<Fragment, RowforgeError> {
        let specs = ctx.specs_for(&record.specifications, SpecsHandler::parse);

        let blocks = [
            Self::article_block(&record.article_html),
            Self::specs_block(&specs),
            Self::docs_video_block(record),
            Self::additional_info_block(record),
        ];
        let content = blocks
            .iter()
            .filter(|b| !b.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("\n\n");

        debug!(code = %record.code, chars = content.len(), "Content assembled");

        let mut fragment = Fragment::new();
        fragment.insert("content", content);
        Ok(fragment)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn handler() -> ContentHandler {
        ContentHandler::new()
    }

    #[test]
    fn test_repair_entities_and_spaces() {
        let input = "Диапазон 10& ndash ;20&deg;C\u{00a0}и&nbsp;выше";
        assert_eq!(repair_html(input), "Диапазон 10-20°C и выше");
    }

    #[test]
    fn test_repair_list_close_mismatch() {
        let input = "<ul><li>a</li><li>b</li></ol>";
        assert_eq!(repair_html(input), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn test_repair_leaves_wellformed_markup() {
        let input = "<p>Текст</p>\n<ol><li>x</li></ol>";
        assert_eq!(repair_html(input), input);
    }

    #[test]
    fn test_repair_nested_lists_untouched() {
        let input = "<ul><li><ol><li>x</li></ol></li></ul>";
        assert_eq!(repair_html(input), input);
    }

    #[tokio::test]
    async fn test_plain_text_wrapped_in_paragraph() {
        let mut ctx = RunContext::new();
        let record = SourceRecord {
            article_html: "Просто текст без разметки".to_string(),
            ..SourceRecord::default()
        };
        let fragment = handler().handle(&record, &mut ctx).await.unwrap();
        assert!(fragment
            .get("content")
            .unwrap()
            .starts_with("<p>Просто текст"));
    }

    #[tokio::test]
    async fn test_block_order_fixed() {
        let mut ctx = RunContext::new();
        let record = SourceRecord {
            name: "Сушилка".to_string(),
            brand: "Breeze".to_string(),
            article_html: "<p>Описание</p>".to_string(),
            specifications: "Цвет: белый".to_string(),
            manuals_url: "https://docs.example.com/manual.pdf".to_string(),
            ..SourceRecord::default()
        };
        let fragment = handler().handle(&record, &mut ctx).await.unwrap();
        let content = fragment.get("content").unwrap();

        let article = content.find("<p>Описание</p>").unwrap();
        let specs = content.find("Технические характеристики").unwrap();
        let docs = content.find("Документация").unwrap();
        let info = content.find("Дополнительная информация").unwrap();
        assert!(article < specs && specs < docs && docs < info);
    }

    #[tokio::test]
    async fn test_video_embed_for_known_host() {
        let mut ctx = RunContext::new();
        let record = SourceRecord {
            name: "Сушилка".to_string(),
            video: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
            ..SourceRecord::default()
        };
        let fragment = handler().handle(&record, &mut ctx).await.unwrap();
        assert!(fragment
            .get("content")
            .unwrap()
            .contains("img.youtube.com/vi/dQw4w9WgXcQ/hqdefault.jpg"));
    }

    #[tokio::test]
    async fn test_unknown_video_host_plain_link() {
        let mut ctx = RunContext::new();
        let record = SourceRecord {
            name: "Сушилка".to_string(),
            video: "https://video.example.com/v/123".to_string(),
            ..SourceRecord::default()
        };
        let fragment = handler().handle(&record, &mut ctx).await.unwrap();
        let content = fragment.get("content").unwrap();
        assert!(content.contains("href=\"https://video.example.com/v/123\""));
        assert!(!content.contains("img.youtube.com"));
    }

    #[tokio::test]
    async fn test_invalid_doc_url_skipped() {
        let mut ctx = RunContext::new();
        let record = SourceRecord {
            drawings_url: "not a url".to_string(),
            ..SourceRecord::default()
        };
        let fragment = handler().handle(&record, &mut ctx).await.unwrap();
        assert!(!fragment.get("content").unwrap().contains("Документация"));
    }
}
