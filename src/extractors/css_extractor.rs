//! CSS selector-based extraction
//!
//! Uses the scraper crate to select elements by CSS selectors.

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use super::{navigate_path, value_to_text};
use crate::error::StrategyError;

/// Extract values from elements matching a CSS selector.
///
/// `nth` picks a single match (0-based). Otherwise the first match is used
/// when `first_only` is set, every match when it is not.
///
/// The accessor is `text` (default), `html`, an attribute name, or an
/// attribute name followed by a dot path into the attribute's JSON value
/// (`data-props.price.amount`).
pub fn select_values(
    document: &Html,
    selector_str: &str,
    accessor: Option<&str>,
    nth: Option<usize>,
    first_only: bool,
) -> Result<Vec<String>, StrategyError> {
    let selector = Selector::parse(selector_str).map_err(|e| StrategyError::InvalidSelector {
        selector: selector_str.to_string(),
        reason: e.to_string(),
    })?;

    let mut matches = document.select(&selector);
    let picked: Vec<ElementRef> = match nth {
        Some(index) => matches.nth(index).into_iter().collect(),
        None if first_only => matches.next().into_iter().collect(),
        None => matches.collect(),
    };

    let mut values = Vec::with_capacity(picked.len());
    for element in picked {
        if let Some(value) = element_value(&element, accessor)? {
            values.push(value);
        }
    }
    Ok(values)
}

fn element_value(
    element: &ElementRef,
    accessor: Option<&str>,
) -> Result<Option<String>, StrategyError> {
    match accessor.unwrap_or("text") {
        "text" | "innerText" => Ok(Some(element_text(element))),
        "html" | "innerHTML" => Ok(Some(element.inner_html())),
        accessor => {
            let (attr_name, json_path) = match accessor.split_once('.') {
                Some((name, path)) => (name, Some(path)),
                None => (accessor, None),
            };
            let Some(raw) = element.value().attr(attr_name) else {
                return Ok(None);
            };
            let Some(path) = json_path else {
                return Ok(Some(raw.to_string()));
            };

            let json: Value = serde_json::from_str(raw).map_err(|e| StrategyError::MalformedJson {
                context: format!("attribute '{attr_name}'"),
                reason: e.to_string(),
            })?;
            Ok(navigate_path(&json, path).and_then(value_to_text))
        }
    }
}

/// Trimmed text content of an element.
pub fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
    <html>
    <body>
        <ul class="facts">
            <li>3 <span>beds</span></li>
            <li>2 baths</li>
            <li>120 m²</li>
        </ul>
        <img class="photo" data-src="/img/1.jpg">
        <img class="photo" data-src="/img/2.jpg">
        <img class="photo">
        <div class="price"
             data-props='{"price": {"amount": 1250, "currency": "GBP"}}'>£1,250 pcm</div>
        <div class="broken" data-props='{"price": '></div>
    </body>
    </html>
    "#;

    #[test]
    fn test_nth_match() {
        let document = Html::parse_document(HTML);
        let baths = select_values(&document, "ul.facts li", None, Some(1), true).unwrap();
        assert_eq!(baths, vec!["2 baths"]);

        let beyond = select_values(&document, "ul.facts li", None, Some(9), true).unwrap();
        assert!(beyond.is_empty());
    }

    #[test]
    fn test_nested_text_is_joined() {
        let document = Html::parse_document(HTML);
        let beds = select_values(&document, "ul.facts li", Some("text"), None, true).unwrap();
        assert_eq!(beds, vec!["3 beds"]);
    }

    #[test]
    fn test_attribute_list_skips_missing() {
        let document = Html::parse_document(HTML);
        let sources = select_values(&document, "img.photo", Some("data-src"), None, false).unwrap();
        assert_eq!(sources, vec!["/img/1.jpg", "/img/2.jpg"]);
    }

    #[test]
    fn test_json_attribute_path() {
        let document = Html::parse_document(HTML);
        let accessor = Some("data-props.price.currency");
        let currency = select_values(&document, "div.price", accessor, None, true).unwrap();
        assert_eq!(currency, vec!["GBP"]);

        let broken = select_values(&document, "div.broken", Some("data-props.price"), None, true);
        assert!(matches!(broken, Err(StrategyError::MalformedJson { .. })));
    }

    #[test]
    fn test_inner_html() {
        let document = Html::parse_document(HTML);
        let html = select_values(&document, "ul.facts li", Some("html"), None, true).unwrap();
        assert_eq!(html, vec!["3 <span>beds</span>"]);
    }

    #[test]
    fn test_invalid_selector() {
        let document = Html::parse_document(HTML);
        let result = select_values(&document, "li:::", None, None, true);
        assert!(matches!(result, Err(StrategyError::InvalidSelector { .. })));
    }
}
