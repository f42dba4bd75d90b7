//! JSON-LD extraction from HTML
//!
//! Extracts JSON-LD data from <script type="application/ld+json"> tags.
//! Supports @graph arrays and multiple JSON-LD blocks.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde_json::Value;

use super::navigate_path;

static JSONLD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("JSON-LD selector")
});

/// Every JSON-LD object that carries an `@type`, in document order.
/// `@graph` members and top-level arrays are flattened.
pub fn collect_jsonld_objects(document: &Html) -> Vec<Value> {
    let mut objects = Vec::new();

    for element in document.select(&JSONLD_SELECTOR) {
        let content = element.inner_html();
        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(json) => collect_typed_objects(json, &mut objects),
            Err(e) => tracing::debug!(error = %e, "skipping malformed JSON-LD block"),
        }
    }

    objects
}

fn collect_typed_objects(value: Value, result: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_typed_objects(item, result);
            }
        }
        Value::Object(mut obj) => {
            if let Some(Value::Array(graph)) = obj.remove("@graph") {
                for item in graph {
                    collect_typed_objects(item, result);
                }
            }
            if obj.contains_key("@type") {
                result.push(Value::Object(obj));
            }
        }
        _ => {}
    }
}

/// Whether `object` declares `type_name` as (one of) its `@type`s.
pub fn has_jsonld_type(object: &Value, type_name: &str) -> bool {
    let matches = |t: &str| {
        let clean = t
            .strip_prefix("https://schema.org/")
            .or_else(|| t.strip_prefix("http://schema.org/"))
            .unwrap_or(t);
        clean.eq_ignore_ascii_case(type_name)
    };

    match object.get("@type") {
        Some(Value::String(s)) => matches(s),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).any(matches),
        _ => false,
    }
}

/// First value at `path` among objects of `type_name` (any object when
/// `type_name` is `None`).
pub fn find_jsonld_value<'v>(
    objects: &'v [Value],
    type_name: Option<&str>,
    path: &str,
) -> Option<&'v Value> {
    objects
        .iter()
        .filter(|object| type_name.map_or(true, |t| has_jsonld_type(object, t)))
        .find_map(|object| navigate_path(object, path).filter(|v| !v.is_null()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_graph_jsonld() {
        let html = r#"
        <script type="application/ld+json">
        {
            "@context": "https://schema.org",
            "@graph": [
                {"@type": "BreadcrumbList", "name": "Home"},
                {"@type": ["Product", "Apartment"], "name": "Flat in Lisbon",
                 "offers": {"@type": "Offer", "price": "315000", "priceCurrency": "EUR"}}
            ]
        }
        </script>
        <script type="application/ld+json">{ not json </script>
        "#;

        let document = Html::parse_document(html);
        let objects = collect_jsonld_objects(&document);
        assert_eq!(objects.len(), 2);

        let price = find_jsonld_value(&objects, Some("Apartment"), "offers.price");
        assert_eq!(price, Some(&Value::String("315000".to_string())));

        let any_name = find_jsonld_value(&objects, None, "name");
        assert_eq!(any_name, Some(&Value::String("Home".to_string())));
    }

    #[test]
    fn test_type_match_skips_objects_without_path() {
        let html = r#"
        <script type="application/ld+json">[
            {"@type": "https://schema.org/Residence", "name": "first"},
            {"@type": "Residence", "geo": {"latitude": 40.4}}
        ]</script>
        "#;

        let document = Html::parse_document(html);
        let objects = collect_jsonld_objects(&document);
        assert_eq!(
            find_jsonld_value(&objects, Some("residence"), "geo.latitude"),
            Some(&serde_json::json!(40.4))
        );
        assert_eq!(
            find_jsonld_value(&objects, Some("Residence"), "name"),
            Some(&Value::String("first".to_string()))
        );
        assert!(find_jsonld_value(&objects, Some("Offer"), "name").is_none());
    }
}
