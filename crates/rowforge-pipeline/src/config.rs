//! Converter configuration
//!
//! One JSON document deserialized into `ConverterConfig`; every section has
//! defaults mirroring a stock catalog import, so tests and small runs work
//! config-free.

use rowforge_common::{Result, RowforgeError};
use rowforge_media::MediaConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Handler failure policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// A failed handler contributes an empty fragment (default)
    #[default]
    Tolerant,
    /// A failed handler aborts the current record
    Strict,
}

/// `{placeholder}` templates for search-engine meta fields. Supported
/// placeholders: `{title}`, `{slug}`, `{excerpt}`, `{brand}`, `{sku}`.
/// An empty template skips the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeoTemplates {
    pub title: String,
    pub description: String,
    pub focus_keyword: String,
    pub og_title: String,
    pub og_description: String,
}

impl Default for SeoTemplates {
    fn default() -> Self {
        Self {
            title: "{title} купить | {brand}".to_string(),
            description: "{excerpt}".to_string(),
            focus_keyword: "{title}".to_string(),
            og_title: "{title}".to_string(),
            og_description: "{excerpt}".to_string(),
        }
    }
}

/// Tag selection vocabulary and weights
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    pub max_tags: usize,
    pub min_length: usize,
    pub max_length: usize,
    pub max_words: usize,
    /// Values that are never tags
    pub stop_phrases: Vec<String>,
    /// Words a phrase may not start or end with
    pub connecting_words: Vec<String>,
    /// Unit tokens marking technical values
    pub unit_tokens: Vec<String>,
    /// Descriptive words that raise a candidate's score
    pub quality_words: Vec<String>,
    /// Spec keys whose values make strong tags
    pub key_spec_markers: Vec<String>,
    pub title_weight: f32,
    pub brand_weight: f32,
    pub category_weight: f32,
    pub spec_weight: f32,
}

impl Default for TagConfig {
    fn default() -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            max_tags: 15,
            min_length: 2,
            max_length: 30,
            max_words: 3,
            stop_phrases: owned(&[
                "нет",
                "да",
                "не указано",
                "не указана",
                "отсутствует",
                "стандартный",
                "обычный",
                "базовый",
                "типовой",
                "общий",
                "в комплекте",
                "комплект поставки",
                "упаковка",
                "инструкция",
                "гарантийный талон",
            ]),
            connecting_words: owned(&[
                "для", "и", "или", "с", "в", "на", "по", "от", "до", "из", "без",
            ]),
            unit_tokens: owned(&[
                "мм", "см", "м", "кг", "г", "л", "мл", "вт", "квт", "гц", "дб", "бар", "атм",
                "об/мин", "м/с", "л/с", "м³/ч",
            ]),
            quality_words: owned(&[
                "профессиональный",
                "промышленный",
                "бытовой",
                "коммерческий",
                "антивандальный",
                "энергоэффективный",
                "эргономичный",
                "дизайнерский",
                "премиум",
                "современный",
            ]),
            key_spec_markers: owned(&[
                "цвет",
                "материал",
                "тип",
                "назначение",
                "управление",
                "установка",
                "монтаж",
                "защита",
                "страна",
                "технология",
            ]),
            title_weight: 4.0,
            brand_weight: 8.0,
            category_weight: 2.0,
            spec_weight: 5.0,
        }
    }
}

/// Full converter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub error_policy: ErrorPolicy,

    /// Decimal separator for emitted prices: "." or ","
    pub decimal_separator: String,

    /// Spec key → dimensional fixed field (weight/length/width/height)
    pub dimension_fields: BTreeMap<String, String>,

    /// Spec key → open attribute name
    pub spec_attributes: BTreeMap<String, String>,

    /// Unit token (lowercase, as found in values) → canonical unit
    pub units: BTreeMap<String, String>,

    pub seo: SeoTemplates,

    /// Output field name → value, overlaid on still-empty fixed attributes
    pub defaults: BTreeMap<String, String>,

    /// Output fields forced empty after merge and defaults
    pub forced_empty: Vec<String>,

    pub tags: TagConfig,

    pub media: MediaConfig,

    /// Maximum excerpt length in characters
    pub excerpt_max_chars: usize,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        let pair = |items: &[(&str, &str)]| {
            items
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<String, String>>()
        };

        Self {
            error_policy: ErrorPolicy::Tolerant,
            decimal_separator: ".".to_string(),
            dimension_fields: pair(&[
                ("Вес", "weight"),
                ("Глубина", "length"),
                ("Длина", "length"),
                ("Ширина", "width"),
                ("Высота", "height"),
            ]),
            spec_attributes: pair(&[
                ("Цвет", "attribute:Цвет"),
                ("Материал", "attribute:Материал"),
                ("Материал корпуса", "attribute:Материал корпуса"),
                ("Мощность", "attribute:Мощность"),
                ("Напряжение", "attribute:Напряжение"),
                ("Страна производства", "attribute:Страна производства"),
                ("Гарантия", "attribute:Гарантия"),
            ]),
            units: pair(&[
                ("кг", "кг"),
                ("г", "г"),
                ("мм", "мм"),
                ("см", "см"),
                ("м", "м"),
                ("л", "л"),
                ("вт", "Вт"),
                ("квт", "кВт"),
            ]),
            seo: SeoTemplates::default(),
            defaults: pair(&[
                ("status", "publish"),
                ("comment_status", "closed"),
                ("author", "1"),
                ("taxonomy:product_type", "simple"),
                ("stock_status", "instock"),
                ("manage_stock", "no"),
                ("sold_individually", "no"),
                ("backorders", "no"),
                ("downloadable", "no"),
                ("virtual", "no"),
                ("tax_status", "taxable"),
                ("menu_order", "0"),
                ("featured", "no"),
            ]),
            forced_empty: [
                "id",
                "parent_sku",
                "children",
                "sale_price",
                "stock",
                "low_stock_amount",
                "tax_class",
                "visibility",
                "taxonomy:product_visibility",
                "taxonomy:product_tag",
                "taxonomy:product_shipping_class",
                "upsell_ids",
                "crosssell_ids",
                "purchase_note",
                "sale_price_dates_from",
                "sale_price_dates_to",
                "product_url",
                "button_text",
                "meta:total_sales",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            tags: TagConfig::default(),
            media: MediaConfig::default(),
            excerpt_max_chars: 160,
        }
    }
}

impl ConverterConfig {
    /// Load from a JSON file; absent sections fall back to defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RowforgeError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RowforgeError::Config(format!("Invalid {}: {}", path.display(), e)))?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_status_fields() {
        let config = ConverterConfig::default();
        assert_eq!(config.defaults.get("status").map(String::as_str), Some("publish"));
        assert_eq!(config.error_policy, ErrorPolicy::Tolerant);
        assert!(config.forced_empty.contains(&"sale_price".to_string()));
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: ConverterConfig =
            serde_json::from_str(r#"{"decimal_separator": ",", "error_policy": "strict"}"#)
                .unwrap();
        assert_eq!(config.decimal_separator, ",");
        assert_eq!(config.error_policy, ErrorPolicy::Strict);
        assert_eq!(config.excerpt_max_chars, 160);
        assert!(!config.dimension_fields.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let result = ConverterConfig::load("/nonexistent/config.json");
        assert!(matches!(result, Err(RowforgeError::Config(_))));
    }
}
