//! Named text modifiers and field post-processing
//!
//! Modifiers are pure string transforms applied in the order a mapping lists
//! them. An unknown name is logged and skipped so mappings can reference
//! modifiers this build does not know yet.

use std::sync::LazyLock;

use regex::Regex;

use crate::mapping::PostProcess;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r\n|\r|\n").expect("newline regex"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,31});")
        .expect("entity regex")
});
static LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+").expect("int regex"));
static LEADING_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("float regex")
});
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$£€₹¥]|\b(?:USD|EUR|GBP|INR)\b").expect("currency regex")
});

/// Names accepted by [`apply_modifier`].
pub const KNOWN_MODIFIERS: &[&str] = &[
    "trim",
    "int",
    "float",
    "removeNewline",
    "stripPunct",
    "stripFirstChar",
    "lowercase",
    "uppercase",
    "collapseWhitespace",
    "stripHtmlEntities",
    "stripCurrency",
    "digitsOnly",
];

/// Apply one named modifier. Returns `None` for an unknown name.
pub fn apply_modifier(text: &str, name: &str) -> Option<String> {
    let out = match name {
        "trim" => text.trim().to_string(),
        "int" => parse_int_or_zero(text).to_string(),
        "float" => parse_float_or_zero(text).to_string(),
        "removeNewline" => NEWLINES.replace_all(text, " ").trim().to_string(),
        "stripPunct" => text.chars().filter(|c| !c.is_ascii_punctuation()).collect(),
        "stripFirstChar" => drop_first_char(text),
        "lowercase" => text.to_lowercase(),
        "uppercase" => text.to_uppercase(),
        "collapseWhitespace" => WHITESPACE.replace_all(text.trim(), " ").to_string(),
        "stripHtmlEntities" => decode_entities(text),
        "stripCurrency" => CURRENCY.replace_all(text, "").trim().to_string(),
        "digitsOnly" => text.chars().filter(char::is_ascii_digit).collect(),
        _ => return None,
    };
    Some(out)
}

/// Apply modifiers left to right.
pub fn apply_modifiers<S: AsRef<str>>(text: &str, names: &[S]) -> String {
    let mut value = text.to_string();
    for name in names {
        let name = name.as_ref();
        match apply_modifier(&value, name) {
            Some(next) => value = next,
            None => tracing::warn!(modifier = name, "unknown modifier skipped"),
        }
    }
    value
}

/// Post-process a raw resolved value: split, then strip, then modifiers.
pub fn clean_up_string<S: AsRef<str>>(text: &str, post: &PostProcess, modifiers: &[S]) -> String {
    let mut value = text.trim().to_string();

    if let Some(separator) = &post.split_char {
        let parts: Vec<&str> = value.split(separator.as_str()).collect();
        let index = if post.split_index < 0 {
            parts.len() as i64 + post.split_index
        } else {
            post.split_index
        };
        value = usize::try_from(index)
            .ok()
            .and_then(|i| parts.get(i))
            .map(|part| part.trim().to_string())
            .unwrap_or_default();
    }

    if let Some(strip) = &post.strip_string {
        value = value.replace(strip.as_str(), "").trim().to_string();
    }
    if post.strip_first_char {
        value = drop_first_char(&value).trim().to_string();
    }

    apply_modifiers(&value, modifiers)
}

/// Leading integer of `text`, `0` when there is none.
pub fn parse_int_or_zero(text: &str) -> i64 {
    LEADING_INT
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<i64>().ok())
        .unwrap_or(0)
}

/// Leading decimal number of `text`, `0` when there is none.
pub fn parse_float_or_zero(text: &str) -> f64 {
    LEADING_FLOAT
        .find(text.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|f| f.is_finite())
        .unwrap_or(0.0)
}

fn drop_first_char(text: &str) -> String {
    let mut chars = text.chars();
    chars.next();
    chars.as_str().to_string()
}

fn decode_entities(text: &str) -> String {
    ENTITY
        .replace_all(text, |caps: &regex::Captures| {
            let body = &caps[1];
            let hex = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X"));
            let decoded = if let Some(hex) = hex {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = body.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match body {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some(' '),
                    "euro" => Some('€'),
                    "pound" => Some('£'),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_order_golden_cases() {
        assert_eq!(apply_modifiers("$1,234", &["stripCurrency", "digitsOnly"]), "1234");
        assert_eq!(apply_modifiers("$1,234", &["digitsOnly", "stripCurrency"]), "1234");
        // Order is observable when an earlier step changes what a later one sees.
        assert_eq!(apply_modifiers("$1,234", &["stripFirstChar", "digitsOnly"]), "1234");
        assert_eq!(apply_modifiers("$1,234", &["digitsOnly", "stripFirstChar"]), "234");
    }

    #[test]
    fn test_numeric_modifiers_never_fail() {
        assert_eq!(apply_modifiers("3 beds", &["int"]), "3");
        assert_eq!(apply_modifiers("beds: 3", &["int"]), "0");
        assert_eq!(apply_modifiers(" 84.5 m2", &["float"]), "84.5");
        assert_eq!(apply_modifiers("120", &["float"]), "120");
        assert_eq!(apply_modifiers("n/a", &["float"]), "0");
    }

    #[test]
    fn test_text_modifiers() {
        assert_eq!(
            apply_modifiers("  Hello\n  World \r\n", &["removeNewline", "collapseWhitespace"]),
            "Hello World"
        );
        assert_eq!(apply_modifiers("Villa, (Marbella)!", &["stripPunct"]), "Villa Marbella");
        assert_eq!(apply_modifiers("Flat", &["uppercase"]), "FLAT");
        assert_eq!(apply_modifiers("Flat", &["lowercase"]), "flat");
        assert_eq!(apply_modifiers("€ 250.000", &["stripCurrency"]), "250.000");
        assert_eq!(apply_modifiers("1.200 EUR", &["stripCurrency"]), "1.200");
    }

    #[test]
    fn test_strip_html_entities() {
        assert_eq!(
            apply_modifiers(
                "Fish &amp; Chips&nbsp;&#8364;5 &#x41; &bogus;",
                &["stripHtmlEntities"]
            ),
            "Fish & Chips €5 A "
        );
    }

    #[test]
    fn test_unknown_modifier_is_skipped() {
        assert_eq!(apply_modifiers(" abc ", &["sparkle", "trim"]), "abc");
    }

    #[test]
    fn test_clean_up_split_before_strip_before_modifiers() {
        let post = PostProcess {
            split_char: Some("|".to_string()),
            split_index: 1,
            strip_string: Some("m²".to_string()),
            strip_first_char: false,
        };
        let modifiers = vec!["int".to_string()];
        assert_eq!(clean_up_string("3 beds | 120 m² | garden", &post, &modifiers), "120");
    }

    #[test]
    fn test_clean_up_negative_split_index() {
        let post = PostProcess {
            split_char: Some(",".to_string()),
            split_index: -1,
            ..PostProcess::default()
        };
        assert_eq!(clean_up_string("Calle Mayor 5, Madrid", &post, &[] as &[&str]), "Madrid");

        let out_of_range = PostProcess { split_index: 7, ..post };
        assert_eq!(clean_up_string("a,b", &out_of_range, &[] as &[&str]), "");
    }

    #[test]
    fn test_clean_up_strip_first_char() {
        let post = PostProcess {
            strip_first_char: true,
            ..PostProcess::default()
        };
        assert_eq!(clean_up_string(" #REF-12 ", &post, &[] as &[&str]), "REF-12");
    }
}
