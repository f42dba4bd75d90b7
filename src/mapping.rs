//! Declarative portal mappings
//!
//! A mapping document describes, per portal, where every listing field lives
//! in a page. Documents are JSON (comments and trailing commas tolerated) in
//! camelCase. They are converted once into [`ScraperMapping`], where each
//! field's extraction strategy is already decided.

use std::collections::BTreeMap;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::MappingError;

/// Deepest `fallbacks` nesting accepted at load time and followed at
/// resolution time.
pub const MAX_FALLBACK_DEPTH: usize = 10;


/// Portal metadata carried alongside the field rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortalInfo {
    pub hosts: Vec<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub locale: Option<String>,
    pub area_unit: Option<String>,
    /// Hint for where the data usually lives (html, script-json, flight, ...).
    pub content_source: Option<String>,
}

/// Thumbnail to full-size rewrite, applied as a plain substring replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailPattern {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

/// The single extraction strategy of one mapping node.
#[derive(Debug, Clone)]
pub enum Locator {
    /// CSS selector with an optional attribute and match index.
    Css {
        selector: String,
        attr: Option<String>,
        nth: Option<usize>,
    },
    /// Regex run against the raw page source.
    ScriptRegex(Regex),
    /// Variable assigned in an inline script, then a dot path into it.
    ScriptJson { var: String, path: String },
    /// Dot path searched in the streamed component payload.
    FlightData { path: String },
    /// JSON-LD object of a given `@type`, then a dot path into it.
    JsonLd {
        type_name: Option<String>,
        path: String,
    },
    /// Segment of the source URL path; `None` selects the whole path.
    UrlSegment { part: Option<usize> },
    /// No locator; only fallbacks (if any) can produce a value.
    Unset,
}

/// Discriminant of a [`Locator`], used in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Css,
    ScriptRegex,
    ScriptJson,
    FlightData,
    JsonLd,
    UrlSegment,
    Unset,
}

impl Locator {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Locator::Css { .. } => StrategyKind::Css,
            Locator::ScriptRegex(_) => StrategyKind::ScriptRegex,
            Locator::ScriptJson { .. } => StrategyKind::ScriptJson,
            Locator::FlightData { .. } => StrategyKind::FlightData,
            Locator::JsonLd { .. } => StrategyKind::JsonLd,
            Locator::UrlSegment { .. } => StrategyKind::UrlSegment,
            Locator::Unset => StrategyKind::Unset,
        }
    }
}

/// Text post-processing directives applied before modifiers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcess {
    pub split_char: Option<String>,
    /// Index into the split parts; negative values count from the end.
    pub split_index: i64,
    pub strip_string: Option<String>,
    pub strip_first_char: bool,
}

/// How a boolean field turns its resolved text into `true`/`false`.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluator {
    /// True when the text contains the parameter (case-insensitive).
    Include(String),
    /// True when the text equals the parameter (case-insensitive).
    Equals(String),
    /// True whenever a non-empty value was found.
    Present,
}

/// A single extraction rule, possibly with a tree of fallbacks.
#[derive(Debug, Clone)]
pub struct FieldMapping {
    pub locator: Locator,
    pub post: PostProcess,
    pub modifiers: Vec<String>,
    pub fallbacks: Vec<FieldMapping>,
    pub thumbnail_patterns: Vec<ThumbnailPattern>,
    pub image_path_prefix: Option<String>,
    /// Path read from each object when a JSON strategy yields a list of objects.
    pub item_path: Option<String>,
    pub evaluator: Option<Evaluator>,
}

/// Value type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Int,
    Float,
    Boolean,
}

/// One portal's extraction rules.
#[derive(Debug, Clone)]
pub struct ScraperMapping {
    pub name: String,
    pub text_fields: BTreeMap<String, FieldMapping>,
    pub int_fields: BTreeMap<String, FieldMapping>,
    pub float_fields: BTreeMap<String, FieldMapping>,
    pub boolean_fields: BTreeMap<String, FieldMapping>,
    pub images: Vec<FieldMapping>,
    pub features: Vec<FieldMapping>,
    pub default_values: Map<String, Value>,
    /// Baseline coverage this portal normally reaches, in `[0, 1]`.
    pub expected_extraction_rate: Option<f64>,
    pub portal: PortalInfo,
}

impl ScraperMapping {
    /// Parse a strict JSON mapping document.
    pub fn from_json(name: &str, text: &str) -> Result<Self, MappingError> {
        let raw: RawScraperMapping = serde_json::from_str(text)?;
        Self::from_raw(name, raw)
    }

    /// Parse a mapping document that may contain comments and trailing commas.
    pub fn from_json_lenient(name: &str, text: &str) -> Result<Self, MappingError> {
        let cleaned = drop_trailing_commas(&strip_json_comments(text));
        Self::from_json(name, &cleaned)
    }

    /// Build a mapping from an already-parsed JSON value.
    pub fn from_value(name: &str, value: Value) -> Result<Self, MappingError> {
        let raw: RawScraperMapping = serde_json::from_value(value)?;
        Self::from_raw(name, raw)
    }

    fn from_raw(name: &str, raw: RawScraperMapping) -> Result<Self, MappingError> {
        if let Some(rate) = raw.expected_extraction_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(MappingError::Invalid(format!(
                    "expectedExtractionRate {rate} is outside [0, 1]"
                )));
            }
        }

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| name.to_string());

        Ok(Self {
            name,
            text_fields: convert_group(raw.text_fields)?,
            int_fields: convert_group(raw.int_fields)?,
            float_fields: convert_group(raw.float_fields)?,
            boolean_fields: convert_group(raw.boolean_fields)?,
            images: convert_list("images", raw.images)?,
            features: convert_list("features", raw.features)?,
            default_values: raw.default_values,
            expected_extraction_rate: raw.expected_extraction_rate,
            portal: raw.portal,
        })
    }

    /// Every declared scalar field with its kind, grouped text, int, float, boolean.
    pub fn declared_fields(&self) -> impl Iterator<Item = (&str, FieldKind, &FieldMapping)> + '_ {
        tag_group(&self.text_fields, FieldKind::Text)
            .chain(tag_group(&self.int_fields, FieldKind::Int))
            .chain(tag_group(&self.float_fields, FieldKind::Float))
            .chain(tag_group(&self.boolean_fields, FieldKind::Boolean))
    }

    /// Number of fields this mapping can populate. Image and feature lists
    /// count as one field each when declared.
    pub fn total_fields(&self) -> usize {
        self.text_fields.len()
            + self.int_fields.len()
            + self.float_fields.len()
            + self.boolean_fields.len()
            + usize::from(!self.images.is_empty())
            + usize::from(!self.features.is_empty())
    }
}

impl FieldMapping {
    /// Shortcut for a bare CSS text rule.
    pub fn css(selector: &str) -> Self {
        Self::with_locator(Locator::Css {
            selector: selector.to_string(),
            attr: None,
            nth: None,
        })
    }

    pub fn with_locator(locator: Locator) -> Self {
        Self {
            locator,
            post: PostProcess::default(),
            modifiers: Vec::new(),
            fallbacks: Vec::new(),
            thumbnail_patterns: Vec::new(),
            image_path_prefix: None,
            item_path: None,
            evaluator: None,
        }
    }

    /// Parse one field rule from JSON.
    pub fn from_json(field: &str, text: &str) -> Result<Self, MappingError> {
        let raw: RawFieldMapping = serde_json::from_str(text)?;
        Self::from_raw(field, raw, 0)
    }

    fn from_raw(field: &str, raw: RawFieldMapping, depth: usize) -> Result<Self, MappingError> {
        if depth > MAX_FALLBACK_DEPTH {
            return Err(MappingError::Invalid(format!(
                "field '{field}' nests fallbacks deeper than {MAX_FALLBACK_DEPTH}"
            )));
        }

        let locator = locator_from_raw(field, &raw)?;
        let item_path = match locator {
            Locator::Css { .. } => None,
            _ => non_empty(&raw.css_attr).or_else(|| non_empty(&raw.xml_attr)),
        };
        let evaluator = non_empty(&raw.evaluator)
            .and_then(|name| parse_evaluator(field, &name, raw.evaluator_param.clone()));
        let split_index = raw
            .split_text_array_id
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0);

        let fallbacks = raw
            .fallbacks
            .into_iter()
            .map(|fallback| Self::from_raw(field, fallback, depth + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            locator,
            post: PostProcess {
                split_char: raw.split_text_character.filter(|s| !s.is_empty()),
                split_index,
                strip_string: raw.strip_string.filter(|s| !s.is_empty()),
                strip_first_char: raw.strip_first_char,
            },
            modifiers: raw.modifiers,
            fallbacks,
            thumbnail_patterns: raw.thumbnail_patterns,
            image_path_prefix: raw.image_path_prefix.filter(|s| !s.is_empty()),
            item_path,
            evaluator,
        })
    }
}

fn tag_group(
    fields: &BTreeMap<String, FieldMapping>,
    kind: FieldKind,
) -> impl Iterator<Item = (&str, FieldKind, &FieldMapping)> {
    fields.iter().map(move |(name, field)| (name.as_str(), kind, field))
}

fn convert_group(
    raw: BTreeMap<String, RawFieldMapping>,
) -> Result<BTreeMap<String, FieldMapping>, MappingError> {
    raw.into_iter()
        .map(|(name, field)| {
            let mapping = FieldMapping::from_raw(&name, field, 0)?;
            Ok((name, mapping))
        })
        .collect()
}

fn convert_list(label: &str, raw: Vec<RawFieldMapping>) -> Result<Vec<FieldMapping>, MappingError> {
    raw.into_iter()
        .enumerate()
        .map(|(i, field)| FieldMapping::from_raw(&format!("{label}[{i}]"), field, 0))
        .collect()
}

/// Pick exactly one strategy, in resolver priority order.
fn locator_from_raw(field: &str, raw: &RawFieldMapping) -> Result<Locator, MappingError> {
    if let Some(selector) = non_empty(&raw.css_locator) {
        let nth = raw
            .css_count_id
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok());
        let attr = non_empty(&raw.css_attr).or_else(|| non_empty(&raw.xml_attr));
        return Ok(Locator::Css { selector, attr, nth });
    }

    if let Some(pattern) = non_empty(&raw.script_regex) {
        let regex = RegexBuilder::new(&pattern)
            .case_insensitive(raw.case_insensitive)
            .build()
            .map_err(|source| MappingError::InvalidRegex {
                field: field.to_string(),
                source,
            })?;
        return Ok(Locator::ScriptRegex(regex));
    }

    if let Some(var) = non_empty(&raw.script_json_var) {
        return Ok(Locator::ScriptJson {
            var,
            path: raw.script_json_path.clone().unwrap_or_default(),
        });
    }

    if let Some(path) = non_empty(&raw.flight_data_path) {
        return Ok(Locator::FlightData { path });
    }

    if raw.json_ld_path.is_some() || raw.json_ld_type.is_some() {
        return Ok(Locator::JsonLd {
            type_name: non_empty(&raw.json_ld_type),
            path: raw.json_ld_path.clone().unwrap_or_default(),
        });
    }

    if let Some(part) = &raw.url_path_part {
        let part = part.trim().parse::<usize>().ok().filter(|p| *p > 0);
        return Ok(Locator::UrlSegment { part });
    }

    Ok(Locator::Unset)
}

/// Unknown evaluators are skipped like unknown modifiers; the field then
/// falls back to plain truthiness.
fn parse_evaluator(field: &str, name: &str, param: Option<String>) -> Option<Evaluator> {
    let param = param.unwrap_or_default();
    match name.trim_end_matches('?') {
        "include" | "includes" | "contains" => Some(Evaluator::Include(param)),
        "equals" | "eq" => Some(Evaluator::Equals(param)),
        "present" => Some(Evaluator::Present),
        other => {
            tracing::warn!(field, evaluator = other, "unknown evaluator skipped");
            None
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Remove `//` and `/* */` comments that sit outside string literals.
fn strip_json_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('"', _) => {
                in_string = true;
                out.push(c);
            }
            ('/', Some('/')) => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Remove commas that directly precede `}` or `]`, outside string literals.
fn drop_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }

        match c {
            '"' => in_string = true,
            ',' => {
                let next = text[i + 1..].trim_start().chars().next();
                if matches!(next, Some('}' | ']')) {
                    continue;
                }
            }
            _ => {}
        }
        out.push(c);
    }

    out
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawScraperMapping {
    name: Option<String>,
    text_fields: BTreeMap<String, RawFieldMapping>,
    int_fields: BTreeMap<String, RawFieldMapping>,
    float_fields: BTreeMap<String, RawFieldMapping>,
    boolean_fields: BTreeMap<String, RawFieldMapping>,
    images: Vec<RawFieldMapping>,
    features: Vec<RawFieldMapping>,
    default_values: Map<String, Value>,
    expected_extraction_rate: Option<f64>,
    portal: PortalInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawFieldMapping {
    css_locator: Option<String>,
    css_attr: Option<String>,
    xml_attr: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    css_count_id: Option<String>,
    #[serde(rename = "scriptRegEx", alias = "scriptRegex")]
    script_regex: Option<String>,
    script_json_var: Option<String>,
    script_json_path: Option<String>,
    flight_data_path: Option<String>,
    json_ld_type: Option<String>,
    json_ld_path: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    url_path_part: Option<String>,
    split_text_character: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    split_text_array_id: Option<String>,
    strip_string: Option<String>,
    #[serde(deserialize_with = "flexible_bool")]
    strip_first_char: bool,
    #[serde(deserialize_with = "flexible_bool")]
    case_insensitive: bool,
    modifiers: Vec<String>,
    fallbacks: Vec<RawFieldMapping>,
    thumbnail_patterns: Vec<ThumbnailPattern>,
    image_path_prefix: Option<String>,
    evaluator: Option<String>,
    evaluator_param: Option<String>,
}

/// Mapping authors write indices both as `2` and `"2"`.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_priority_prefers_css() {
        let field = FieldMapping::from_json(
            "title",
            r#"{"cssLocator": "h1", "scriptRegEx": "title: (.*)", "urlPathPart": 2}"#,
        )
        .unwrap();
        assert_eq!(field.locator.kind(), StrategyKind::Css);
    }

    #[test]
    fn test_locator_kinds() {
        let cases = [
            (r#"{"scriptRegEx": "x=(\\d+)"}"#, StrategyKind::ScriptRegex),
            (r#"{"scriptJsonVar": "__DATA__", "scriptJsonPath": "a.b"}"#, StrategyKind::ScriptJson),
            (r#"{"flightDataPath": "listing.price"}"#, StrategyKind::FlightData),
            (r#"{"jsonLdType": "Residence", "jsonLdPath": "name"}"#, StrategyKind::JsonLd),
            (r#"{"urlPathPart": "3"}"#, StrategyKind::UrlSegment),
            (r#"{"modifiers": ["trim"]}"#, StrategyKind::Unset),
        ];
        for (json, kind) in cases {
            assert_eq!(FieldMapping::from_json("f", json).unwrap().locator.kind(), kind, "{json}");
        }
    }

    #[test]
    fn test_url_path_part_zero_means_whole_path() {
        let field = FieldMapping::from_json("ref", r#"{"urlPathPart": "0"}"#).unwrap();
        assert!(matches!(field.locator, Locator::UrlSegment { part: None }));
        let field = FieldMapping::from_json("ref", r#"{"urlPathPart": "last"}"#).unwrap();
        assert!(matches!(field.locator, Locator::UrlSegment { part: None }));
        let field = FieldMapping::from_json("ref", r#"{"urlPathPart": 2}"#).unwrap();
        assert!(matches!(field.locator, Locator::UrlSegment { part: Some(2) }));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err =
            FieldMapping::from_json("price", r#"{"scriptRegEx": "price=(\\d+"}"#).unwrap_err();
        assert!(matches!(err, MappingError::InvalidRegex { .. }));
    }

    #[test]
    fn test_case_insensitive_regex() {
        let field = FieldMapping::from_json(
            "p",
            r#"{"scriptRegEx": "price=(\\d+)", "caseInsensitive": "true"}"#,
        )
        .unwrap();
        match field.locator {
            Locator::ScriptRegex(re) => assert!(re.is_match("PRICE=12")),
            other => panic!("unexpected locator {other:?}"),
        }
    }

    #[test]
    fn test_nested_fallbacks_depth_limit() {
        let mut json = String::from(r#"{"cssLocator": "h1"}"#);
        for _ in 0..=MAX_FALLBACK_DEPTH {
            json = format!(r#"{{"cssLocator": "h1", "fallbacks": [{json}]}}"#);
        }
        assert!(matches!(
            FieldMapping::from_json("deep", &json),
            Err(MappingError::Invalid(_))
        ));
    }

    #[test]
    fn test_lenient_mapping_document() {
        let text = r#"
        {
            // portal metadata
            "name": "idealista",
            "portal": { "hosts": ["www.idealista.com"], "currency": "EUR", "areaUnit": "sqm", },
            "textFields": {
                "title": { "cssLocator": "h1.main-info__title", }, /* main heading */
                "description": {
                    "cssLocator": "div.comment p",
                    "modifiers": ["collapseWhitespace"]
                },
            },
            "intFields": {
                "count_bedrooms": { "cssLocator": ".info-features span", "cssCountId": 1 }
            },
            "images": [ {
                "scriptJsonVar": "adMultimediasInfo",
                "scriptJsonPath": "fullScreenGalleryPics",
                "cssAttr": "imageDataService"
            } ],
            "defaultValues": { "country": "Spain" },
            "expectedExtractionRate": 0.75,
        }
        "#;
        let mapping = ScraperMapping::from_json_lenient("fallback-name", text).unwrap();
        assert_eq!(mapping.name, "idealista");
        assert_eq!(mapping.portal.currency.as_deref(), Some("EUR"));
        assert_eq!(mapping.text_fields.len(), 2);
        assert_eq!(mapping.total_fields(), 4);
        match &mapping.int_fields["count_bedrooms"].locator {
            Locator::Css { nth, .. } => assert_eq!(*nth, Some(1)),
            other => panic!("unexpected locator {other:?}"),
        }
    }

    #[test]
    fn test_comment_markers_inside_strings_survive() {
        let text = r#"{"textFields": {"url": {"cssLocator": "a[href='http://x.com/*']"}}}"#;
        let mapping = ScraperMapping::from_json_lenient("m", text).unwrap();
        match &mapping.text_fields["url"].locator {
            Locator::Css { selector, .. } => assert_eq!(selector, "a[href='http://x.com/*']"),
            other => panic!("unexpected locator {other:?}"),
        }
    }

    #[test]
    fn test_expected_rate_out_of_range() {
        let err = ScraperMapping::from_json("m", r#"{"expectedExtractionRate": 1.5}"#).unwrap_err();
        assert!(matches!(err, MappingError::Invalid(_)));
    }

    #[test]
    fn test_evaluator_parsing() {
        let field = FieldMapping::from_json(
            "for_rent",
            r#"{"cssLocator": ".op", "evaluator": "include?", "evaluatorParam": "Rent"}"#,
        )
        .unwrap();
        assert_eq!(field.evaluator, Some(Evaluator::Include("Rent".to_string())));

        let unknown =
            FieldMapping::from_json("x", r#"{"cssLocator": ".x", "evaluator": "sum"}"#).unwrap();
        assert_eq!(unknown.evaluator, None);
    }

    #[test]
    fn test_lenient_keeps_commas_inside_strings() {
        let text = r#"{
            "textFields": {
                "reference": {"scriptRegEx": "\"ref\":\"([^,}]+)\"", "splitTextCharacter": ", ]",},
            },
        }"#;
        let lenient = ScraperMapping::from_json_lenient("m", text).unwrap();
        let field = &lenient.text_fields["reference"];
        match &field.locator {
            Locator::ScriptRegex(re) => {
                assert_eq!(re.as_str(), r#""ref":"([^,}]+)""#);
                let caps = re.captures(r#"var cfg = {"ref":"AB-12","agent":"Lopez"};"#).unwrap();
                assert_eq!(&caps[1], "AB-12");
            }
            other => panic!("unexpected locator {other:?}"),
        }
        assert_eq!(field.post.split_char.as_deref(), Some(", ]"));
    }

    #[test]
    fn test_drop_trailing_commas() {
        assert_eq!(drop_trailing_commas("[1, 2 ,\n ]"), "[1, 2 \n ]");
        assert_eq!(drop_trailing_commas(r#"{"a": "x,}", }"#), r#"{"a": "x,}" }"#);
        assert_eq!(drop_trailing_commas(r#"{"a": "q\",]",}"#), r#"{"a": "q\",]"}"#);
    }
}
