//! Post-extraction listing filters
//!
//! Criteria are independent; every failing one is reported.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::quality::is_populated;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterCriteria {
    /// Case-insensitive terms rejected in title or description.
    pub excluded_terms: Vec<String>,
    pub min_price_cents: Option<i64>,
    pub max_price_cents: Option<i64>,
    pub min_bedrooms: Option<i64>,
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum FilterReason {
    ExcludedTerm { term: String },
    PriceBelowMinimum { price_cents: i64, min_cents: i64 },
    PriceAboveMaximum { price_cents: i64, max_cents: i64 },
    TooFewBedrooms { bedrooms: i64, min_bedrooms: i64 },
    MissingField { field: String },
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::ExcludedTerm { term } => write!(f, "contains excluded term '{term}'"),
            FilterReason::PriceBelowMinimum { price_cents, min_cents } => {
                write!(f, "price {price_cents} below minimum {min_cents}")
            }
            FilterReason::PriceAboveMaximum { price_cents, max_cents } => {
                write!(f, "price {price_cents} above maximum {max_cents}")
            }
            FilterReason::TooFewBedrooms { bedrooms, min_bedrooms } => {
                write!(f, "{bedrooms} bedrooms, at least {min_bedrooms} required")
            }
            FilterReason::MissingField { field } => write!(f, "missing required field '{field}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub passed: bool,
    pub reasons: Vec<FilterReason>,
}

pub fn apply_filters(record: &Map<String, Value>, criteria: &FilterCriteria) -> FilterOutcome {
    let mut reasons = Vec::new();

    let haystack = ["title", "description"]
        .iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    for term in &criteria.excluded_terms {
        let needle = term.trim().to_lowercase();
        if !needle.is_empty() && haystack.contains(&needle) {
            reasons.push(FilterReason::ExcludedTerm { term: term.clone() });
        }
    }

    // A zero price means "unknown" and is never filtered on.
    let price_cents = record_price_cents(record);
    if price_cents != 0 {
        if let Some(min_cents) = criteria.min_price_cents.filter(|min| price_cents < *min) {
            reasons.push(FilterReason::PriceBelowMinimum { price_cents, min_cents });
        }
        if let Some(max_cents) = criteria.max_price_cents.filter(|max| price_cents > *max) {
            reasons.push(FilterReason::PriceAboveMaximum { price_cents, max_cents });
        }
    }

    let bedrooms = record.get("count_bedrooms").and_then(as_i64);
    if let (Some(min_bedrooms), Some(bedrooms)) = (criteria.min_bedrooms, bedrooms) {
        if bedrooms < min_bedrooms {
            reasons.push(FilterReason::TooFewBedrooms { bedrooms, min_bedrooms });
        }
    }

    for field in &criteria.required_fields {
        if !record.get(field).is_some_and(is_populated) {
            reasons.push(FilterReason::MissingField { field: field.clone() });
        }
    }

    FilterOutcome {
        passed: reasons.is_empty(),
        reasons,
    }
}

fn record_price_cents(record: &Map<String, Value>) -> i64 {
    if let Some(cents) = record.get("price_cents").and_then(as_i64) {
        return cents;
    }
    record
        .get("price_float")
        .and_then(Value::as_f64)
        .filter(|f| f.is_finite())
        .map(|f| (f * 100.0).round() as i64)
        .unwrap_or(0)
}

fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
