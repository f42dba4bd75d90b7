//! Extraction completeness scoring

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mapping::ScraperMapping;

/// Record key holding extracted image URLs.
pub const IMAGES_KEY: &str = "image_urls";
/// Record key holding extracted feature labels.
pub const FEATURES_KEY: &str = "features";

const EXPECTATION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityGrade {
    A,
    B,
    C,
    F,
}

impl fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let grade = match self {
            QualityGrade::A => "A",
            QualityGrade::B => "B",
            QualityGrade::C => "C",
            QualityGrade::F => "F",
        };
        f.write_str(grade)
    }
}

pub fn compute_quality_grade(rate: f64) -> QualityGrade {
    if rate >= 0.8 {
        QualityGrade::A
    } else if rate >= 0.5 {
        QualityGrade::B
    } else if rate >= 0.2 {
        QualityGrade::C
    } else {
        QualityGrade::F
    }
}

/// `None` when the mapping declares no expectation. Equal counts as meeting.
pub fn meets_expectation(rate: f64, expected: Option<f64>) -> Option<bool> {
    expected.map(|expected| rate + EXPECTATION_TOLERANCE >= expected)
}

/// A value counts as extracted unless it is null, an empty string, or an
/// empty collection.
pub fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityReport {
    pub populated_fields: usize,
    pub total_fields: usize,
    pub extraction_rate: f64,
    pub grade: QualityGrade,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meets_expectation: Option<bool>,
    pub missing_fields: Vec<String>,
}

/// Score `record` against the fields `mapping` declares.
pub fn assess_quality(record: &Map<String, Value>, mapping: &ScraperMapping) -> QualityReport {
    let mut declared: Vec<&str> = mapping.declared_fields().map(|(name, _, _)| name).collect();
    if !mapping.images.is_empty() {
        declared.push(IMAGES_KEY);
    }
    if !mapping.features.is_empty() {
        declared.push(FEATURES_KEY);
    }

    let missing_fields: Vec<String> = declared
        .iter()
        .filter(|name| !record.get(**name).is_some_and(is_populated))
        .map(|name| name.to_string())
        .collect();

    let total_fields = declared.len();
    let populated_fields = total_fields - missing_fields.len();
    let extraction_rate = if total_fields == 0 {
        0.0
    } else {
        populated_fields as f64 / total_fields as f64
    };

    QualityReport {
        populated_fields,
        total_fields,
        extraction_rate,
        grade: compute_quality_grade(extraction_rate),
        meets_expectation: meets_expectation(extraction_rate, mapping.expected_extraction_rate),
        missing_fields,
    }
}
