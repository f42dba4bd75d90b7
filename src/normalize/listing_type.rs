//! Sale vs rental detection

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingType {
    Sale,
    Rental,
}

impl ListingType {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingType::Sale => "sale",
            ListingType::Rental => "rental",
        }
    }
}

impl fmt::Display for ListingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static RENTAL_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)/(?:[a-z]+-)*",
        r"(rent|rental|rentals|alquiler|alquileres|miete|mieten|location|locations|louer",
        r"|affitto|affitti|aluguel|arrendamento|huur)",
        r"(?:[/?#_.-]|$)",
    ))
    .expect("rental path regex")
});

const RENTAL_FLAGS: &[&str] = &["for_rent_long_term", "for_rent_short_term", "for_rent"];

/// Explicit boolean fields win over URL signals; the default is sale.
pub fn detect_listing_type(props: &Map<String, Value>, source_url: Option<&str>) -> ListingType {
    if RENTAL_FLAGS.iter().any(|flag| props.get(*flag).is_some_and(is_truthy)) {
        return ListingType::Rental;
    }
    if props.get("for_sale").is_some_and(is_truthy) {
        return ListingType::Sale;
    }

    let path = source_url.and_then(|url| Url::parse(url).ok()).map(|url| url.path().to_string());
    match path {
        Some(path) if RENTAL_PATH.is_match(&path) => ListingType::Rental,
        _ => ListingType::Sale,
    }
}

/// JSON truthiness as mapping authors expect it: `true`, non-zero numbers,
/// and `"true"`/`"yes"`/`"1"` strings.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "1" | "y" | "on"
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_boolean_overrides_url() {
        assert_eq!(
            detect_listing_type(&props(json!({"for_sale": true})), Some("https://x.com/to-rent/1")),
            ListingType::Sale
        );
        let both = props(json!({"for_rent_long_term": true, "for_sale": true}));
        assert_eq!(detect_listing_type(&both, None), ListingType::Rental);
    }

    #[test]
    fn test_url_patterns() {
        let empty = Map::new();
        let from_url = |url: &str| detect_listing_type(&empty, Some(url));
        assert_eq!(from_url("https://x.com/to-rent/1"), ListingType::Rental);
        assert_eq!(from_url("https://x.es/alquiler-viviendas/madrid/"), ListingType::Rental);
        assert_eq!(from_url("https://x.de/wohnung-mieten/berlin"), ListingType::Rental);
        assert_eq!(from_url("https://x.fr/location/paris"), ListingType::Rental);
        assert_eq!(from_url("https://x.com/parent/1"), ListingType::Sale);
        assert_eq!(from_url("https://x.com/for-sale/1"), ListingType::Sale);
        assert_eq!(detect_listing_type(&empty, None), ListingType::Sale);
    }

    #[test]
    fn test_false_flags_fall_through() {
        let not_long_term = props(json!({"for_rent_long_term": false}));
        assert_eq!(
            detect_listing_type(&not_long_term, Some("https://x.com/rent/1")),
            ListingType::Rental
        );
        let not_short_term = props(json!({"for_rent_short_term": "no"}));
        assert_eq!(
            detect_listing_type(&not_short_term, Some("https://x.com/buy/1")),
            ListingType::Sale
        );
    }
}
