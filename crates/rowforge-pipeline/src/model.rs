//! Core data model: source rows, handler fragments, output records
//!
//! A `SourceRecord` is one canonicalized input row. Each handler turns it
//! into a `Fragment` (partial field map); the aggregator merges fragments
//! into one `OutputRecord`, the schema-complete exportable shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// One canonicalized input row. All fields are strings; absent means `""`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceRecord {
    pub name: String,
    /// External catalog code, the primary identifier
    pub code: String,
    /// Manufacturer article number
    pub article: String,
    pub brand: String,
    /// Category path, levels joined by " - "
    pub category: String,
    /// Free-text "key: value / key: value" specification string
    pub specifications: String,
    /// Comma-separated image URLs
    pub images: String,
    pub video: String,
    /// Narrative HTML article
    pub article_html: String,
    pub drawings_url: String,
    pub certificates_url: String,
    pub promo_url: String,
    pub manuals_url: String,
    /// Possibly several barcodes joined by "/"
    pub barcode: String,
    /// Raw price string, e.g. "14 990 руб."
    pub price: String,
    pub exclusive: String,
}

/// Namespace of one fragment key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// 1:1 to a fixed output attribute
    Plain,
    /// Fixed taxonomy attribute, key carries the taxonomy name
    Taxonomy,
    /// Open attribute map
    Attribute,
    /// Open meta map
    Meta,
}

impl Namespace {
    /// Split a fragment key into its namespace and bare name
    pub fn parse(key: &str) -> (Self, &str) {
        if let Some(rest) = key.strip_prefix("taxonomy:") {
            (Self::Taxonomy, rest)
        } else if let Some(rest) = key.strip_prefix("attribute:") {
            (Self::Attribute, rest)
        } else if let Some(rest) = key.strip_prefix("meta:") {
            (Self::Meta, rest)
        } else {
            (Self::Plain, key)
        }
    }
}

/// Partial output of one handler invocation
///
/// Keys keep insertion order so merge results are deterministic. Inserting
/// an already-present key replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    entries: Vec<(String, String)>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key/value pair. Empty keys are dropped with a warning;
    /// everything else is accepted, namespace validity is a routing
    /// concern.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if key.is_empty() {
            warn!("Dropping fragment entry with empty key");
            return;
        }
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

macro_rules! output_record_fields {
    ($($rust_field:ident => $wire_name:literal),+ $(,)?) => {
        /// Canonical, schema-complete output record
        ///
        /// Fixed attributes always exist and default to `""`; open-ended
        /// fields live in the `attributes` and `meta` maps, which never
        /// collide with fixed-attribute names.
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct OutputRecord {
            $(pub $rust_field: String,)+
            pub attributes: BTreeMap<String, String>,
            pub meta: BTreeMap<String, String>,
        }

        impl OutputRecord {
            /// Set a fixed attribute by wire name. Returns false when the
            /// name is not a fixed attribute.
            pub fn set_fixed(&mut self, name: &str, value: &str) -> bool {
                match name {
                    $($wire_name => { self.$rust_field = value.to_string(); true })+
                    _ => false,
                }
            }

            /// Read a fixed attribute by wire name
            pub fn get_fixed(&self, name: &str) -> Option<&str> {
                match name {
                    $($wire_name => Some(self.$rust_field.as_str()),)+
                    _ => None,
                }
            }

            /// Wire names of all fixed attributes, in schema order
            pub fn fixed_names() -> &'static [&'static str] {
                &[$($wire_name),+]
            }

            /// Flatten to ordered column/value pairs for the exporter:
            /// fixed attributes in schema order, then open attributes,
            /// then meta fields.
            pub fn flatten(&self) -> Vec<(String, String)> {
                let mut out = Vec::new();
                $(out.push(($wire_name.to_string(), self.$rust_field.clone()));)+
                for (k, v) in &self.attributes {
                    out.push((format!("attribute:{}", k), v.clone()));
                }
                for (k, v) in &self.meta {
                    out.push((format!("meta:{}", k), v.clone()));
                }
                out
            }
        }
    };
}

output_record_fields! {
    id => "id",
    title => "title",
    slug => "slug",
    content => "content",
    excerpt => "excerpt",
    status => "status",
    comment_status => "comment_status",
    author => "author",
    regular_price => "regular_price",
    sale_price => "sale_price",
    stock => "stock",
    stock_status => "stock_status",
    low_stock_amount => "low_stock_amount",
    manage_stock => "manage_stock",
    sku => "sku",
    parent_sku => "parent_sku",
    children => "children",
    weight => "weight",
    length => "length",
    width => "width",
    height => "height",
    tax_status => "tax_status",
    tax_class => "tax_class",
    sold_individually => "sold_individually",
    backorders => "backorders",
    downloadable => "downloadable",
    virtual_product => "virtual",
    visibility => "visibility",
    upsell_ids => "upsell_ids",
    crosssell_ids => "crosssell_ids",
    purchase_note => "purchase_note",
    sale_price_dates_from => "sale_price_dates_from",
    sale_price_dates_to => "sale_price_dates_to",
    featured => "featured",
    menu_order => "menu_order",
    download_limit => "download_limit",
    download_expiry => "download_expiry",
    product_url => "product_url",
    button_text => "button_text",
    images => "images",
    taxonomy_product_type => "taxonomy:product_type",
    taxonomy_product_cat => "taxonomy:product_cat",
    taxonomy_product_brand => "taxonomy:product_brand",
    taxonomy_product_tag => "taxonomy:product_tag",
    taxonomy_product_shipping_class => "taxonomy:product_shipping_class",
    taxonomy_product_visibility => "taxonomy:product_visibility",
}

impl OutputRecord {
    /// Route one merged key/value into the record by namespace. Open-map
    /// names shadowing a fixed attribute are diverted to meta so the two
    /// layers can never collide.
    pub fn set_field(&mut self, key: &str, value: &str) {
        let (namespace, name) = Namespace::parse(key);
        match namespace {
            Namespace::Plain => {
                if !self.set_fixed(name, value) {
                    // Unknown plain keys are preserved rather than dropped
                    self.meta.insert(name.to_string(), value.to_string());
                }
            },
            Namespace::Taxonomy => {
                if !self.set_fixed(&format!("taxonomy:{}", name), value) {
                    self.meta.insert(format!("taxonomy_{}", name), value.to_string());
                }
            },
            Namespace::Attribute => {
                if Self::fixed_names().contains(&name) {
                    warn!(name, "Attribute name shadows a fixed field, storing as meta");
                    self.meta.insert(name.to_string(), value.to_string());
                } else {
                    self.attributes.insert(name.to_string(), value.to_string());
                }
            },
            Namespace::Meta => {
                self.meta.insert(name.to_string(), value.to_string());
            },
        }
    }
}

/// Per-run outcome counters with a bounded diagnostic sample
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub images_published: usize,
    pub images_failed: usize,
    diagnostics: Vec<String>,
}

impl RunStats {
    const MAX_DIAGNOSTICS: usize = 50;

    pub fn add_diagnostic(&mut self, message: impl Into<String>) {
        if self.diagnostics.len() < Self::MAX_DIAGNOSTICS {
            self.diagnostics.push(message.into());
        }
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}
