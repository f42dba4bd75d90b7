//! Server-component flight data
//!
//! Some portals stream their page state as `self.__next_f.push([1, "..."])`
//! calls. Each payload is an escaped string of `key:JSON` lines; a value may
//! point at another chunk with a `"$key"` string.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{Map, Value};

use super::navigate_path;

/// Back-reference resolution stops this many levels deep.
pub const DEFAULT_MAX_DEPTH: usize = 10;

static PUSH_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)self\.__next_f\.push\(\[\s*\d+\s*,\s*"((?:[^"\\]|\\.)*)"\s*\]\)"#)
        .expect("flight push regex")
});
static ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\\(?:u([0-9a-fA-F]{4})|(.))").expect("escape regex"));
static CHUNK_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+$").expect("chunk key regex"));

/// Flat chunk table parsed from a page. Values are stored as received;
/// back-references are resolved on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightData {
    order: Vec<String>,
    chunks: HashMap<String, Value>,
    max_depth: usize,
}

impl FlightData {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Chunk keys in discovery order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.chunks.get(key)
    }

    /// The chunk under `key` with its back-references substituted.
    pub fn resolved(&self, key: &str) -> Option<Value> {
        self.chunks.get(key).map(|value| self.resolve(value, 0))
    }

    /// Every chunk, resolved, keyed by chunk key.
    pub fn to_resolved_map(&self) -> Map<String, Value> {
        self.order
            .iter()
            .filter_map(|key| Some((key.clone(), self.resolved(key)?)))
            .collect()
    }

    fn insert(&mut self, key: String, value: Value) {
        if self.chunks.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    fn resolve(&self, value: &Value, depth: usize) -> Value {
        if depth >= self.max_depth {
            return value.clone();
        }

        match value {
            Value::String(s) => match s.strip_prefix('$').and_then(|key| self.chunks.get(key)) {
                Some(target) => self.resolve(target, depth + 1),
                None => value.clone(),
            },
            Value::Array(items) => {
                Value::Array(items.iter().map(|v| self.resolve(v, depth + 1)).collect())
            }
            Value::Object(obj) => Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v, depth + 1)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }
}

/// Collect every flight payload in `html`, in document order.
pub fn parse_flight_data(html: &str) -> FlightData {
    let joined = PUSH_PAYLOAD
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .map(|m| unescape_payload(m.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    parse_flight_payload(&joined)
}

/// Parse already-unescaped `key:JSON` lines. Malformed lines are dropped.
pub fn parse_flight_payload(text: &str) -> FlightData {
    let mut data = FlightData {
        max_depth: DEFAULT_MAX_DEPTH,
        ..FlightData::default()
    };

    for line in text.lines() {
        let Some((key, raw)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if !CHUNK_KEY.is_match(key) {
            continue;
        }
        match serde_json::from_str::<Value>(raw.trim()) {
            Ok(value) => data.insert(key.to_string(), value),
            Err(_) => tracing::trace!(key, "dropping non-JSON flight line"),
        }
    }

    data
}

/// Undo JavaScript string escaping in one pass, so an escaped backslash
/// followed by `n` stays a backslash and an `n`.
fn unescape_payload(payload: &str) -> String {
    ESCAPE
        .replace_all(payload, |caps: &Captures| {
            if let Some(hex) = caps.get(1) {
                return u32::from_str_radix(hex.as_str(), 16)
                    .ok()
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_default();
            }
            match caps.get(2).map(|m| m.as_str()) {
                Some("n") => "\n".to_string(),
                Some("t") => "\t".to_string(),
                Some("r") => "\r".to_string(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        })
        .into_owned()
}

/// Look `path` up in each resolved chunk in discovery order, then in the
/// chunk table itself (`"12.props.title"`). First hit wins.
pub fn search_flight_data(data: &FlightData, path: &str) -> Option<Value> {
    for key in data.keys() {
        let Some(chunk) = data.resolved(key) else {
            continue;
        };
        if let Some(found) = navigate_path(&chunk, path).filter(|v| !v.is_null()) {
            return Some(found.clone());
        }
    }

    let graph = Value::Object(
        data.order
            .iter()
            .filter_map(|key| Some((key.clone(), data.chunks.get(key)?.clone())))
            .collect(),
    );
    navigate_path(&graph, path)
        .filter(|v| !v.is_null())
        .map(|found| data.resolve(found, 0))
}
