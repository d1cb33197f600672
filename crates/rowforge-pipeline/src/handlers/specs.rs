//! Structured specification parsing

use crate::config::ConverterConfig;
use crate::context::RunContext;
use crate::handlers::Handler;
use crate::model::{Fragment, SourceRecord};
use async_trait::async_trait;
use rowforge_common::text::{extract_magnitude_unit, normalize_yes_no, parse_specifications};
use rowforge_common::RowforgeError;
use std::sync::Arc;
use tracing::debug;

/// Parses the free-text specification string into dimensional fixed
/// fields, mapped open attributes, and a catch-all meta field.
pub struct SpecsHandler {
    config: Arc<ConverterConfig>,
}

impl SpecsHandler {
    pub fn new(config: Arc<ConverterConfig>) -> Self {
        Self { config }
    }

    /// Parse and normalize one raw spec string. Values that read as
    /// yes/no collapse to the canonical pair.
    pub fn parse(raw: &str) -> Vec<(String, String)> {
        parse_specifications(raw)
            .into_iter()
            .map(|(key, value)| {
                let normalized = normalize_yes_no(&value);
                (key, normalized)
            })
            .collect()
    }

    /// Resolve a parsed key against a config table, case-insensitively
    fn lookup<'a>(
        table: &'a std::collections::BTreeMap<String, String>,
        key: &str,
    ) -> Option<&'a String> {
        if let Some(v) = table.get(key) {
            return Some(v);
        }
        let key_lower = key.to_lowercase();
        table
            .iter()
            .find(|(k, _)| k.to_lowercase() == key_lower)
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl Handler for SpecsHandler {
    fn name(&self) -> &'static str {
        "specs"
    }

    async fn handle(
        &self,
        record: &SourceRecord,
        ctx: &mut RunContext,
    ) -> Result<Fragment, RowforgeError> {
        let mut fragment = Fragment::new();

        let specs = ctx.specs_for(&record.specifications, Self::parse);
        if specs.is_empty() {
            return Ok(fragment);
        }

        for (key, value) in &specs {
            if let Some(field) = Self::lookup(&self.config.dimension_fields, key) {
                let units = self.config.units.keys().map(String::as_str);
                let (magnitude, unit_token) = extract_magnitude_unit(value, units);
                if let Some(magnitude) = magnitude {
                    fragment.insert(field.clone(), magnitude);
                    if let Some(canonical) = unit_token.and_then(|t| self.config.units.get(&t)) {
                        fragment.insert(format!("meta:{}_unit", field), canonical.clone());
                    }
                }
            } else if let Some(attribute) = Self::lookup(&self.config.spec_attributes, key) {
                fragment.insert(attribute.clone(), value.clone());
            }
        }

        // Nothing is dropped: the full parse goes to one reference field
        let all = specs
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join(" | ");
        fragment.insert("meta:все_характеристики", all);

        debug!(
            code = %record.code,
            specs = specs.len(),
            fields = fragment.len(),
            "Specifications parsed"
        );
        Ok(fragment)
    }
}
