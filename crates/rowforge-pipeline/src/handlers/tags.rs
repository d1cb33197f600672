//! Tag phrase selection
//!
//! Ranks short phrases mined from the title, category path, parsed specs
//! and brand, then keeps the top scorers with substring dedup. Runs after
//! the primary merge because it needs the resolved brand and the memoized
//! spec map, so it does not implement the `Handler` trait.

use crate::config::{ConverterConfig, TagConfig};
use crate::model::SourceRecord;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

static TRAILING_CODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*[(\[][^)\]]*[A-Z0-9\-_]+[^)\]]*[)\]]$").unwrap_or_else(|_| unreachable!())
});
static TRAILING_ARTICLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(арт|код|art|code|model|модель)\.?\s*[A-Z0-9\-_]+\s*$")
        .unwrap_or_else(|_| unreachable!())
});
static NON_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s\-]").unwrap_or_else(|_| unreachable!()));
static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*[-–—]\s*\d+").unwrap_or_else(|_| unreachable!()));
static FRACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+[.,]\d+").unwrap_or_else(|_| unreachable!()));
static DIMENSIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*[xх×]\s*\d+").unwrap_or_else(|_| unreachable!()));

/// Spec keys whose values carry measurements, not descriptions
const TECHNICAL_KEYS: &[&str] = &[
    "напряжение",
    "мощность",
    "ток",
    "частота",
    "размер",
    "вес",
    "габариты",
    "объем",
    "скорость",
    "давление",
    "расход",
    "температура",
    "шум",
    "влажность",
];

/// Category levels too broad to be a useful tag
const GENERIC_CATEGORIES: &[&str] = &[
    "товары",
    "продукция",
    "оборудование",
    "техника",
    "каталог",
    "магазин",
    "главная",
    "все товары",
];

const NAME_PHRASE_BONUS: f32 = 1.5;
const BRAND_SOURCE_BONUS: f32 = 3.0;
const MIN_SPEC_SCORE: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Name,
    NamePhrase,
    Category,
    Specs,
    Brand,
}

#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    source: Source,
    score: f32,
    words: usize,
    has_digits: bool,
    technical: bool,
}

impl Candidate {
    fn new(text: String, source: Source) -> Self {
        let words = text.split_whitespace().count();
        let has_digits = text.chars().any(|c| c.is_ascii_digit());
        Self {
            text,
            source,
            score: 0.0,
            words,
            has_digits,
            technical: false,
        }
    }
}

pub struct TagsHandler {
    config: Arc<ConverterConfig>,
}

impl TagsHandler {
    pub fn new(config: Arc<ConverterConfig>) -> Self {
        Self { config }
    }

    fn tags(&self) -> &TagConfig {
        &self.config.tags
    }

    /// Produce the `|`-joined tag list for one record.
    pub fn generate(
        &self,
        record: &SourceRecord,
        brand: &str,
        specs: &[(String, String)],
    ) -> String {
        let mut candidates = Vec::new();

        self.collect_from_name(record.name.trim(), brand, &mut candidates);
        self.collect_from_category(record.category.trim(), &mut candidates);
        self.collect_from_specs(specs, &mut candidates);

        let brand = brand.trim();
        if !brand.is_empty() {
            let mut candidate = Candidate::new(brand.to_string(), Source::Brand);
            candidate.score = self.tags().brand_weight;
            candidates.push(candidate);
        }

        self.score(&mut candidates);
        let selected = self.select(&candidates);
        debug!(code = %record.code, count = selected.len(), "Tags selected");
        selected.join("|")
    }

    fn collect_from_name(&self, name: &str, brand: &str, out: &mut Vec<Candidate>) {
        if name.is_empty() {
            return;
        }

        let clean = clean_product_name(name, brand);
        if clean.chars().count() >= 4 {
            out.push(Candidate::new(clean, Source::Name));
        }

        for phrase in self.key_phrases(name) {
            out.push(Candidate::new(phrase, Source::NamePhrase));
        }
    }

    /// Multi-word phrases from the title, longest-first so nested
    /// fragments of an accepted phrase never surface on their own.
    fn key_phrases(&self, text: &str) -> Vec<String> {
        let cleaned = NON_WORD_RE.replace_all(text, " ");
        let words: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .collect();
        if words.len() < 2 {
            return Vec::new();
        }

        let connecting = &self.tags().connecting_words;
        let mut phrases = Vec::new();
        for start in 0..words.len() {
            let first = words[start].to_lowercase();
            if connecting.contains(&first) {
                continue;
            }
            for len in 2..=self.tags().max_words.min(words.len() - start) {
                let phrase = words[start..start + len].join(" ");
                if self.is_good_phrase(&phrase) {
                    phrases.push(phrase);
                }
            }
        }
        remove_nested(phrases)
    }

    fn is_good_phrase(&self, phrase: &str) -> bool {
        let chars = phrase.chars().count();
        if chars < 4 || chars > self.tags().max_length {
            return false;
        }
        let lower = phrase.to_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        if words.len() < 2 {
            return false;
        }
        let connecting = &self.tags().connecting_words;
        let first = words[0].to_string();
        let last = words[words.len() - 1].to_string();
        if connecting.contains(&first) || connecting.contains(&last) {
            return false;
        }
        let connective_count = words
            .iter()
            .filter(|w| connecting.contains(&w.to_string()))
            .count();
        if connective_count > 1 {
            return false;
        }
        let unit_count = words
            .iter()
            .filter(|w| self.tags().unit_tokens.contains(&w.to_string()))
            .count();
        unit_count < words.len()
    }

    fn collect_from_category(&self, category: &str, out: &mut Vec<Candidate>) {
        if category.is_empty() {
            return;
        }
        let separators = [" > ", " / ", " | ", " » ", " › ", " - "];
        let Some(sep) = separators.iter().find(|s| category.contains(*s)) else {
            return;
        };
        let parts: Vec<&str> = category.split(sep).map(str::trim).collect();
        // Deepest levels are the most specific
        for part in parts.iter().rev().take(3).rev() {
            if part.chars().count() > 2 && !GENERIC_CATEGORIES.contains(&part.to_lowercase().as_str())
            {
                out.push(Candidate::new(part.to_string(), Source::Category));
            }
        }
    }

    fn collect_from_specs(&self, specs: &[(String, String)], out: &mut Vec<Candidate>) {
        for (key, value) in specs {
            if let Some(candidate) = self.evaluate_spec_pair(key, value) {
                out.push(candidate);
            }
        }
    }

    fn evaluate_spec_pair(&self, key: &str, value: &str) -> Option<Candidate> {
        let value = value.trim();
        let value_lower = value.to_lowercase();
        if self.is_bad_value(&value_lower) {
            return None;
        }

        let config = self.tags();
        let chars = value.chars().count();
        if chars < config.min_length || chars > config.max_length {
            return None;
        }
        let words = value.split_whitespace().count();
        if words == 0 || words > config.max_words {
            return None;
        }

        let key_lower = key.to_lowercase();
        let technical = is_technical_spec(&key_lower, value);
        let has_digits = value.chars().any(|c| c.is_ascii_digit());

        let mut score = self.tags().spec_weight;
        if has_digits {
            score -= 2.0;
        }
        if technical {
            score -= 3.0;
        }
        if config
            .key_spec_markers
            .iter()
            .any(|marker| key_lower.contains(marker))
        {
            score += 3.0;
        }
        if config
            .quality_words
            .iter()
            .any(|word| value_lower.contains(word))
        {
            score += 2.0;
        }
        if score < MIN_SPEC_SCORE {
            return None;
        }

        let mut candidate = Candidate::new(value.to_string(), Source::Specs);
        candidate.score = score;
        candidate.technical = technical;
        candidate.has_digits = has_digits;
        Some(candidate)
    }

    fn is_bad_value(&self, value_lower: &str) -> bool {
        if self.tags().stop_phrases.contains(&value_lower.to_string()) {
            return true;
        }
        if value_lower.chars().count() < 2 {
            return true;
        }
        if value_lower.chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
        value_lower
            .split_whitespace()
            .any(|word| self.tags().unit_tokens.iter().any(|unit| unit == word))
    }

    fn score(&self, candidates: &mut [Candidate]) {
        let config = self.tags();
        for candidate in candidates.iter_mut() {
            let mut score = candidate.score;
            score += match candidate.source {
                Source::Name => config.title_weight,
                Source::Brand => BRAND_SOURCE_BONUS,
                Source::Category => config.category_weight,
                Source::NamePhrase => NAME_PHRASE_BONUS,
                Source::Specs => 0.0,
            };
            score += match candidate.words {
                2 => 1.0,
                3 => 0.5,
                _ => 0.0,
            };
            if candidate.has_digits {
                score -= 1.5;
            }
            if candidate.technical {
                score -= 2.0;
            }
            candidate.score = score.max(0.0);
        }
    }

    /// Highest score first; a candidate equal to, containing, or contained
    /// in an already-accepted tag (case-insensitive) is dropped.
    fn select(&self, candidates: &[Candidate]) -> Vec<String> {
        let mut ranked: Vec<&Candidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        let mut selected: Vec<String> = Vec::new();
        let mut selected_lower: Vec<String> = Vec::new();
        for candidate in ranked {
            if selected.len() >= self.tags().max_tags {
                break;
            }
            let lower = candidate.text.to_lowercase();
            let duplicate = selected_lower
                .iter()
                .any(|seen| seen.contains(&lower) || lower.contains(seen.as_str()));
            if duplicate {
                continue;
            }
            selected.push(candidate.text.clone());
            selected_lower.push(lower);
        }
        selected
    }
}

/// Strip the brand prefix and trailing article codes from the title.
fn clean_product_name(name: &str, brand: &str) -> String {
    let mut name = name.to_string();
    if !brand.is_empty() {
        let brand_lower = brand.to_lowercase();
        if name.to_lowercase().starts_with(&brand_lower) {
            name = name.chars().skip(brand.chars().count()).collect();
            name = name.trim().to_string();
        }
    }
    name = TRAILING_CODE_RE.replace(&name, "").to_string();
    name = TRAILING_ARTICLE_RE.replace(&name, "").to_string();
    let name = name.trim_start_matches([' ', '-', '–', '—', ',', ';', '.']);
    name.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_technical_spec(key_lower: &str, value: &str) -> bool {
    if TECHNICAL_KEYS.iter().any(|k| key_lower.contains(k)) {
        return true;
    }
    RANGE_RE.is_match(value)
        || FRACTION_RE.is_match(value)
        || DIMENSIONS_RE.is_match(value)
        || value.contains(['<', '>', '≤', '≥', '≈', '±', '~'])
}

/// Drop phrases whose word set is a subset of a longer phrase's words.
fn remove_nested(phrases: Vec<String>) -> Vec<String> {
    let mut by_length: Vec<&String> = phrases.iter().collect();
    by_length.sort_by_key(|p| std::cmp::Reverse(p.split_whitespace().count()));

    let mut kept_word_sets: Vec<Vec<String>> = Vec::new();
    let mut kept: Vec<String> = Vec::new();
    for phrase in by_length {
        let words: Vec<String> = phrase
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        let nested = kept_word_sets
            .iter()
            .any(|set| words.iter().all(|w| set.contains(w)));
        if !nested {
            kept_word_sets.push(words);
            kept.push(phrase.clone());
        }
    }
    // Back to source order
    phrases.into_iter().filter(|p| kept.contains(p)).collect()
}
