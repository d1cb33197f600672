//! Text utilities shared by the conversion handlers
//!
//! Slug generation, price extraction, yes/no normalization, and the
//! specification-string parser. All of these take arbitrary catalog text
//! (frequently Cyrillic) and never fail: malformed input degrades to an
//! empty or pass-through value.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Canonical "yes" value emitted by [`normalize_yes_no`]
pub const YES: &str = "Да";
/// Canonical "no" value emitted by [`normalize_yes_no`]
pub const NO: &str = "Нет";

const DEFAULT_YES: &[&str] = &["да", "yes", "1", "true", "есть", "y"];
const DEFAULT_NO: &[&str] = &["нет", "no", "0", "false", "отсутствует", "n"];

/// Cyrillic-to-latin transliteration pairs used by [`slugify`]
const CYR_TO_LAT: &[(char, &str)] = &[
    ('а', "a"),
    ('б', "b"),
    ('в', "v"),
    ('г', "g"),
    ('д', "d"),
    ('е', "e"),
    ('ё', "yo"),
    ('ж', "zh"),
    ('з', "z"),
    ('и', "i"),
    ('й', "y"),
    ('к', "k"),
    ('л', "l"),
    ('м', "m"),
    ('н', "n"),
    ('о', "o"),
    ('п', "p"),
    ('р', "r"),
    ('с', "s"),
    ('т', "t"),
    ('у', "u"),
    ('ф', "f"),
    ('х', "h"),
    ('ц', "ts"),
    ('ч', "ch"),
    ('ш', "sh"),
    ('щ', "sch"),
    ('ъ', ""),
    ('ы', "y"),
    ('ь', ""),
    ('э', "e"),
    ('ю', "yu"),
    ('я', "ya"),
];

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9][0-9.,]*").unwrap_or_else(|_| unreachable!()));

static MAGNITUDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").unwrap_or_else(|_| unreachable!()));

static VIDEO_ID_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([a-zA-Z0-9_-]{11})",
        r"youtube\.com/v/([a-zA-Z0-9_-]{11})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Generate a URL slug from arbitrary (possibly Cyrillic) text.
///
/// Lowercases, transliterates, folds separators to single dashes, and caps
/// the length. Returns an empty string when nothing slug-worthy remains.
pub fn slugify(text: &str) -> String {
    slugify_with_limit(text, 200)
}

/// [`slugify`] with an explicit length cap
pub fn slugify_with_limit(text: &str, max_length: usize) -> String {
    let translit: HashMap<char, &str> = CYR_TO_LAT.iter().copied().collect();

    let mut slug = String::with_capacity(text.len());
    for ch in text.to_lowercase().chars() {
        if let Some(lat) = translit.get(&ch) {
            slug.push_str(lat);
        } else if ch.is_ascii_alphanumeric() {
            slug.push(ch);
        } else if matches!(ch, ' ' | '-' | '_') {
            slug.push('-');
        }
        // anything else (punctuation, emoji, non-Cyrillic scripts) is dropped
    }

    let mut folded = String::with_capacity(slug.len());
    let mut prev_dash = false;
    for ch in slug.chars() {
        if ch == '-' {
            if !prev_dash && !folded.is_empty() {
                folded.push('-');
            }
            prev_dash = true;
        } else {
            folded.push(ch);
            prev_dash = false;
        }
    }

    let mut result: String = folded.chars().take(max_length).collect();
    while result.ends_with('-') {
        result.pop();
    }
    result
}

/// Extract a numeric price from free-form catalog text.
///
/// Accepts space-separated thousands and either comma or dot decimals;
/// currency tokens and surrounding words are ignored. The result uses `.`
/// as the decimal separator. Input without digits yields `None`.
pub fn extract_price(price_str: &str) -> Option<String> {
    // Spaces (including NBSP) act as thousands separators in the source feeds.
    let compact: String = price_str
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00a0}')
        .collect();

    let m = NUMBER_RE.find(&compact)?;
    let raw = m.as_str().trim_end_matches(['.', ',']);

    let has_comma = raw.contains(',');
    let has_dot = raw.contains('.');

    let normalized = if has_comma && has_dot {
        // The later separator is the decimal one; the other groups thousands.
        let comma_pos = raw.rfind(',').unwrap_or(0);
        let dot_pos = raw.rfind('.').unwrap_or(0);
        if dot_pos > comma_pos {
            raw.replace(',', "")
        } else {
            raw.replace('.', "").replace(',', ".")
        }
    } else if has_comma || has_dot {
        let sep = if has_comma { ',' } else { '.' };
        let tail_len = raw.rsplit(sep).next().map(str::len).unwrap_or(0);
        if tail_len == 3 && raw.matches(sep).count() >= 1 && raw.len() > 4 {
            // "1,499" / "12.500" style grouping
            raw.replace(sep, "")
        } else {
            raw.replace(',', ".")
        }
    } else {
        raw.to_string()
    };

    if normalized.is_empty() || !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(normalized)
}

/// Normalize free-form yes/no text to the canonical bilingual pair.
///
/// Both Russian and English affirmatives collapse to [`YES`]/[`NO`];
/// unrecognized values pass through untouched. Empty input reads as [`NO`].
pub fn normalize_yes_no(value: &str) -> String {
    if value.trim().is_empty() {
        return NO.to_string();
    }

    let lower = value.trim().to_lowercase();
    if DEFAULT_YES.contains(&lower.as_str()) {
        YES.to_string()
    } else if DEFAULT_NO.contains(&lower.as_str()) {
        NO.to_string()
    } else {
        value.trim().to_string()
    }
}

/// Parse a `"key: value / key: value"` specification string.
///
/// `;` is accepted as an alternate entry delimiter and internal line breaks
/// are treated as spaces. Entries without a `:` or with an empty side are
/// skipped. Order is preserved; a repeated key keeps the last value.
pub fn parse_specifications(specs: &str) -> Vec<(String, String)> {
    if specs.trim().is_empty() {
        return Vec::new();
    }

    let flattened = specs.replace(['\r', '\n'], " ").replace(';', "/");

    let mut entries: Vec<(String, String)> = Vec::new();
    for part in flattened.split('/') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        if let Some(existing) = entries.iter_mut().find(|(k, _)| k == key) {
            existing.1 = value.to_string();
        } else {
            entries.push((key.to_string(), value.to_string()));
        }
    }
    entries
}

/// Split a dimensional value like `"10,5 кг"` into magnitude and unit token.
///
/// The magnitude keeps a dot decimal; the unit is the first token from
/// `unit_tokens` found in the lowercased remainder. A value without a
/// leading magnitude yields `(None, None)`.
pub fn extract_magnitude_unit<'a>(
    value: &str,
    unit_tokens: impl IntoIterator<Item = &'a str>,
) -> (Option<String>, Option<String>) {
    let normalized = value.replace(',', ".");
    let Some(m) = MAGNITUDE_RE.find(&normalized) else {
        return (None, None);
    };
    let magnitude = m.as_str().to_string();

    // Longest token wins so "кг" is never shadowed by "г"
    let lower = value.to_lowercase();
    let unit = unit_tokens
        .into_iter()
        .filter(|token| lower.contains(&token.to_lowercase()))
        .max_by_key(|token| token.chars().count())
        .map(str::to_string);

    (Some(magnitude), unit)
}

/// Extract a video id from the URL shapes of the one known host
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RES
        .iter()
        .find_map(|re| re.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Check that a string parses as an absolute URL with a host
pub fn is_valid_url(candidate: &str) -> bool {
    url::Url::parse(candidate)
        .map(|u| u.has_host())
        .unwrap_or(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_transliterates() {
        assert_eq!(slugify("Тара пластиковая"), "tara-plastikovaya");
        assert_eq!(slugify("Hand Dryer X-200"), "hand-dryer-x-200");
    }

    #[test]
    fn test_slugify_folds_separators() {
        assert_eq!(slugify("a  --  b"), "a-b");
        assert_eq!(slugify("  --  "), "");
    }

    #[test]
    fn test_slugify_length_cap() {
        let slug = slugify_with_limit("word ".repeat(100).as_str(), 12);
        assert_eq!(slug, "word-word-wo");
    }

    #[test]
    fn test_extract_price_space_thousands() {
        assert_eq!(extract_price("14 990 руб.").as_deref(), Some("14990"));
    }

    #[test]
    fn test_extract_price_mixed_separators() {
        assert_eq!(extract_price("1,499.50 USD").as_deref(), Some("1499.50"));
        assert_eq!(extract_price("1.499,50 EUR").as_deref(), Some("1499.50"));
    }

    #[test]
    fn test_extract_price_comma_decimal() {
        assert_eq!(extract_price("990,50 руб.").as_deref(), Some("990.50"));
    }

    #[test]
    fn test_extract_price_no_digits() {
        assert_eq!(extract_price("Цена по запросу"), None);
        assert_eq!(extract_price(""), None);
    }

    #[test]
    fn test_normalize_yes_no() {
        assert_eq!(normalize_yes_no("yes"), YES);
        assert_eq!(normalize_yes_no("ДА"), YES);
        assert_eq!(normalize_yes_no("false"), NO);
        assert_eq!(normalize_yes_no(""), NO);
        assert_eq!(normalize_yes_no("иногда"), "иногда");
    }

    #[test]
    fn test_parse_specifications_round_trip() {
        let specs = parse_specifications("A: 1 кг / B: 2 см");
        assert_eq!(
            specs,
            vec![
                ("A".to_string(), "1 кг".to_string()),
                ("B".to_string(), "2 см".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_specifications_semicolons_and_newlines() {
        let specs = parse_specifications("Цвет: белый;\nМатериал: сталь");
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1], ("Материал".to_string(), "сталь".to_string()));
    }

    #[test]
    fn test_parse_specifications_keeps_last_duplicate() {
        let specs = parse_specifications("A: 1 / A: 2");
        assert_eq!(specs, vec![("A".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_extract_magnitude_unit() {
        let units = ["кг", "см"];
        let (mag, unit) = extract_magnitude_unit("10,5 кг", units);
        assert_eq!(mag.as_deref(), Some("10.5"));
        assert_eq!(unit.as_deref(), Some("кг"));

        let (mag, unit) = extract_magnitude_unit("н/д", units);
        assert_eq!(mag, None);
        assert_eq!(unit, None);
    }

    #[test]
    fn test_extract_magnitude_unit_prefers_longest_token() {
        let units = ["г", "кг", "м", "мм"];
        let (_, unit) = extract_magnitude_unit("10 кг", units);
        assert_eq!(unit.as_deref(), Some("кг"));
        let (_, unit) = extract_magnitude_unit("250 мм", units);
        assert_eq!(unit.as_deref(), Some("мм"));
    }

    #[test]
    fn test_extract_video_id() {
        assert_eq!(
            extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            extract_video_id("https://youtu.be/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
    }

    #[test]
    fn test_is_valid_url() {
        assert!(is_valid_url("https://example.com/doc.pdf"));
        assert!(!is_valid_url("not a url"));
        assert!(!is_valid_url(""));
    }
}
