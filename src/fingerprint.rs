//! Content fingerprints for duplicate detection

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Fields that identify a listing, in hashing order. Coordinates are
/// rounded so float noise between crawls does not change the fingerprint.
const IDENTITY_FIELDS: &[&str] = &[
    "address_string",
    "postal_code",
    "city",
    "latitude",
    "longitude",
    "count_bedrooms",
    "count_bathrooms",
    "constructed_area",
    "price_cents",
];

/// Lowercase hex of the first 8 bytes of a SHA-256 over the identity
/// fields, or `None` when the record has none of them.
pub fn compute_fingerprint(record: &Map<String, Value>) -> Option<String> {
    let mut hasher = Sha256::new();
    let mut used = 0;

    for field in IDENTITY_FIELDS {
        let Some(text) = record.get(*field).and_then(|value| canonical(field, value)) else {
            continue;
        };
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        hasher.update(text.as_bytes());
        hasher.update(b"\n");
        used += 1;
    }

    if used == 0 {
        return None;
    }
    let digest = hasher.finalize();
    Some(hex::encode(&digest[..8]))
}

fn canonical(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if matches!(field, "latitude" | "longitude") {
                if let Ok(coordinate) = s.parse::<f64>() {
                    return Some(format!("{coordinate:.4}"));
                }
            }
            Some(s.to_lowercase())
        }
        Value::Number(n) if matches!(field, "latitude" | "longitude") => {
            n.as_f64().map(|f| format!("{f:.4}"))
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}
