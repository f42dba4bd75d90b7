//! Strategy resolver
//!
//! A [`ListingDocument`] wraps one page for the duration of one extraction.
//! Structured sources (JSON-LD, script variables, flight data) are parsed
//! lazily on first use and cached on the document, never across documents.
//!
//! Each [`FieldMapping`] node runs exactly one strategy. When the cleaned
//! result is empty its `fallbacks` are tried depth-first, in order.

mod css_extractor;
mod flight_data;
mod jsonld_extractor;
mod media_extractor;
mod script_extractor;
mod url_extractor;

pub use css_extractor::*;
pub use flight_data::*;
pub use jsonld_extractor::*;
pub use media_extractor::*;
pub use script_extractor::*;
pub use url_extractor::*;

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use scraper::Html;
use serde_json::Value;

use crate::error::StrategyError;
use crate::mapping::{FieldMapping, Locator, StrategyKind, MAX_FALLBACK_DEPTH};
use crate::modifiers::clean_up_string;

/// One parsed page plus its per-document caches.
pub struct ListingDocument<'a> {
    source: &'a str,
    source_url: &'a str,
    html: Html,
    max_flight_depth: usize,
    jsonld: OnceCell<Vec<Value>>,
    flight: OnceCell<FlightData>,
    script_vars: OnceCell<HashMap<String, Rc<Value>>>,
    scanned_vars: RefCell<HashMap<String, Option<Rc<Value>>>>,
}

impl<'a> ListingDocument<'a> {
    pub fn parse(source: &'a str, source_url: &'a str) -> Self {
        Self {
            source,
            source_url,
            html: Html::parse_document(source),
            max_flight_depth: DEFAULT_MAX_DEPTH,
            jsonld: OnceCell::new(),
            flight: OnceCell::new(),
            script_vars: OnceCell::new(),
            scanned_vars: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_flight_depth(mut self, depth: usize) -> Self {
        self.max_flight_depth = depth;
        self
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Raw page source, as received.
    pub fn source(&self) -> &str {
        self.source
    }

    pub fn source_url(&self) -> &str {
        self.source_url
    }

    pub fn jsonld_objects(&self) -> &[Value] {
        self.jsonld.get_or_init(|| collect_jsonld_objects(&self.html))
    }

    pub fn flight_data(&self) -> &FlightData {
        self.flight
            .get_or_init(|| parse_flight_data(self.source).with_max_depth(self.max_flight_depth))
    }

    /// Value assigned to `name` in an inline script.
    ///
    /// Scripts are parsed as ECMAScript first; a variable the parser could
    /// not reach is looked up by scanning the source for its assignment.
    pub fn script_var(&self, name: &str) -> Option<Rc<Value>> {
        let parsed = self
            .script_vars
            .get_or_init(|| extract_script_variables(&self.html));
        let bare = name.strip_prefix("window.").unwrap_or(name);
        if let Some(value) = parsed.get(name).or_else(|| parsed.get(bare)) {
            return Some(Rc::clone(value));
        }

        if let Some(cached) = self.scanned_vars.borrow().get(name) {
            return cached.clone();
        }
        let scanned = scan_script_variable(self.source, bare).map(Rc::new);
        self.scanned_vars
            .borrow_mut()
            .insert(name.to_string(), scanned.clone());
        scanned
    }
}

/// Outcome of resolving one field mapping tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// Cleaned, non-empty values.
    pub values: Vec<String>,
    /// Strategy of the node that produced `values`.
    pub strategy: Option<StrategyKind>,
    /// Fallback indices leading to that node; empty for the primary.
    pub fallback_path: Vec<usize>,
    /// Strategy failures met along the way.
    pub errors: Vec<StrategyError>,
}

impl Resolution {
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    One,
    Many,
}

/// Resolve a single-valued field. Empty string when nothing was found.
pub fn resolve_value(document: &ListingDocument, mapping: &FieldMapping) -> String {
    resolve_traced(document, mapping)
        .values
        .into_iter()
        .next()
        .unwrap_or_default()
}

/// Resolve a single-valued field, keeping strategy and failure details.
pub fn resolve_traced(document: &ListingDocument, mapping: &FieldMapping) -> Resolution {
    resolve(document, mapping, Cardinality::One)
}

/// Resolve a list-valued field (images, features).
pub fn resolve_values(document: &ListingDocument, mapping: &FieldMapping) -> Vec<String> {
    resolve(document, mapping, Cardinality::Many).values
}

fn resolve(
    document: &ListingDocument,
    mapping: &FieldMapping,
    cardinality: Cardinality,
) -> Resolution {
    let mut errors = Vec::new();
    let mut path = Vec::new();
    match resolve_node(document, mapping, cardinality, 0, &mut path, &mut errors) {
        Some((values, strategy)) => Resolution {
            values,
            strategy: Some(strategy),
            fallback_path: path,
            errors,
        },
        None => Resolution {
            errors,
            ..Resolution::default()
        },
    }
}

fn resolve_node(
    document: &ListingDocument,
    node: &FieldMapping,
    cardinality: Cardinality,
    depth: usize,
    path: &mut Vec<usize>,
    errors: &mut Vec<StrategyError>,
) -> Option<(Vec<String>, StrategyKind)> {
    if depth > MAX_FALLBACK_DEPTH {
        tracing::warn!(depth, "fallback chain too deep, giving up");
        return None;
    }

    match run_strategy(document, node, cardinality) {
        Ok(raw) => {
            let cleaned: Vec<String> = raw
                .iter()
                .map(|value| clean_up_string(value, &node.post, &node.modifiers))
                .filter(|value| !value.is_empty())
                .collect();
            if !cleaned.is_empty() {
                return Some((cleaned, node.locator.kind()));
            }
        }
        Err(err) => {
            tracing::debug!(error = %err, "strategy failed, treating as empty");
            errors.push(err);
        }
    }

    for (index, fallback) in node.fallbacks.iter().enumerate() {
        path.push(index);
        let found = resolve_node(document, fallback, cardinality, depth + 1, path, errors);
        if found.is_some() {
            return found;
        }
        path.pop();
    }

    None
}

fn run_strategy(
    document: &ListingDocument,
    node: &FieldMapping,
    cardinality: Cardinality,
) -> Result<Vec<String>, StrategyError> {
    let first_only = cardinality == Cardinality::One;
    let item_path = node.item_path.as_deref();

    match &node.locator {
        Locator::Css { selector, attr, nth } => {
            select_values(document.html(), selector, attr.as_deref(), *nth, first_only)
        }
        Locator::ScriptRegex(regex) => Ok(regex_values(document.source(), regex, first_only)),
        Locator::ScriptJson { var, path } => Ok(document
            .script_var(var)
            .map(|value| json_values(navigate_path(&value, path), item_path, cardinality))
            .unwrap_or_default()),
        Locator::FlightData { path } => {
            let found = search_flight_data(document.flight_data(), path);
            Ok(json_values(found.as_ref(), item_path, cardinality))
        }
        Locator::JsonLd { type_name, path } => {
            let found = find_jsonld_value(document.jsonld_objects(), type_name.as_deref(), path);
            Ok(json_values(found, item_path, cardinality))
        }
        Locator::UrlSegment { part } => {
            Ok(url_segment(document.source_url(), *part)?.into_iter().collect())
        }
        Locator::Unset => Ok(Vec::new()),
    }
}

/// Flatten a JSON value into candidate strings.
///
/// In list mode an array yields one candidate per element; `item_path` is
/// read from object elements.
fn json_values(
    value: Option<&Value>,
    item_path: Option<&str>,
    cardinality: Cardinality,
) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };

    let pick = |item: &Value| match (item, item_path) {
        (Value::Object(_), Some(path)) => navigate_path(item, path).and_then(value_to_text),
        _ => value_to_text(item),
    };

    match (value, cardinality) {
        (Value::Array(items), Cardinality::Many) => items.iter().filter_map(pick).collect(),
        _ => pick(value).into_iter().collect(),
    }
}

/// Navigate a JSON value by dot path. Segments address object keys first,
/// then array indices; `a[0].b` is accepted as well as `a.0.b`.
pub fn navigate_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.').map(str::trim).filter(|s| !s.is_empty()) {
        let (field, indices) = match segment.find('[') {
            Some(bracket) => (&segment[..bracket], &segment[bracket..]),
            None => (segment, ""),
        };

        if !field.is_empty() {
            current = current.get(field).or_else(|| {
                field
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| current.get(index))
            })?;
        }

        for index in indices
            .split(|c| c == '[' || c == ']')
            .filter(|s| !s.is_empty())
        {
            current = current.get(index.parse::<usize>().ok()?)?;
        }
    }
    Some(current)
}

/// Text form of a JSON value; strings unquoted, `null` is no value.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        _ => Some(value.to_string()),
    }
}
