//! Extraction orchestrator
//!
//! Runs every declared field of a mapping against one page and assembles a
//! flat property record. Field failures never abort the run; they surface as
//! empty fields and, when requested, in per-field traces.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::cache::{MappingCache, MappingSource};
use crate::extractors::{
    extract_features, extract_images, resolve_traced, ListingDocument, DEFAULT_MAX_DEPTH,
};
use crate::fingerprint::compute_fingerprint;
use crate::mapping::{Evaluator, FieldKind, FieldMapping, ScraperMapping, StrategyKind};
use crate::modifiers::{parse_float_or_zero, parse_int_or_zero};
use crate::normalize::{
    detect_listing_type, normalize_price, normalize_property_type, ImageUrlOptions,
    DEFAULT_IMAGE_EXTENSIONS,
};
use crate::quality::{assess_quality, is_populated, QualityGrade, FEATURES_KEY, IMAGES_KEY};

/// One extracted listing as a flat field map.
pub type PropertyRecord = Map<String, Value>;

/// Caller-tunable extraction behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractOptions {
    pub upgrade_http_images: bool,
    pub allowed_image_extensions: Vec<String>,
    pub max_flight_depth: usize,
    pub include_field_trace: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            upgrade_http_images: true,
            allowed_image_extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_flight_depth: DEFAULT_MAX_DEPTH,
            include_field_trace: false,
        }
    }
}

impl ExtractOptions {
    fn image_url_options(&self) -> ImageUrlOptions {
        ImageUrlOptions {
            upgrade_http: self.upgrade_http_images,
            allowed_extensions: self
                .allowed_image_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            thumbnail_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Populated,
    Empty,
    /// Nothing was found and a mapping default filled the field.
    Defaulted,
    /// Nothing was found and at least one strategy failed.
    Errored,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTrace {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    /// Fallback indices leading to the node that produced the value.
    pub fallback_path: Vec<usize>,
    pub status: FieldStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    pub scraper_name: String,
    pub populated_fields: usize,
    pub total_fields: usize,
    pub extraction_rate: f64,
    pub quality_grade: QualityGrade,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meets_expectation: Option<bool>,
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_traces: Option<Vec<FieldTrace>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub success: bool,
    pub properties: Vec<PropertyRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<ExtractionDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            properties: Vec::new(),
            diagnostics: None,
            fingerprint: None,
            error: Some(error.into()),
        }
    }

    /// The extracted listing, when there is one.
    pub fn property(&self) -> Option<&PropertyRecord> {
        self.properties.first()
    }
}

/// Extract one listing from `html` with an already-loaded mapping.
pub fn extract_from_html(
    html: &str,
    source_url: &str,
    mapping: &ScraperMapping,
    options: &ExtractOptions,
) -> ExtractionResult {
    let document =
        ListingDocument::parse(html, source_url).with_flight_depth(options.max_flight_depth);
    let mut record = PropertyRecord::new();
    let mut traces = Vec::new();

    for (name, kind, field) in mapping.declared_fields() {
        let resolution = resolve_traced(&document, field);
        let status = match resolution.first() {
            Some(text) => {
                record.insert(name.to_string(), typed_value(kind, field, text));
                FieldStatus::Populated
            }
            None if !resolution.errors.is_empty() => FieldStatus::Errored,
            None => FieldStatus::Empty,
        };
        traces.push(FieldTrace {
            field: name.to_string(),
            strategy: resolution.strategy,
            fallback_path: resolution.fallback_path,
            status,
            error: resolution.errors.first().map(ToString::to_string),
        });
    }

    if !mapping.images.is_empty() {
        let images = extract_images(&document, &mapping.images, &options.image_url_options());
        let urls = images.into_iter().map(|image| Value::String(image.url)).collect();
        record.insert(IMAGES_KEY.to_string(), Value::Array(urls));
    }
    if !mapping.features.is_empty() {
        let features = extract_features(&document, &mapping.features);
        record.insert(
            FEATURES_KEY.to_string(),
            Value::Array(features.into_iter().map(Value::String).collect()),
        );
    }

    for (key, default) in &mapping.default_values {
        if record.get(key).is_some_and(is_populated) {
            continue;
        }
        record.insert(key.clone(), default.clone());
        if let Some(trace) = traces.iter_mut().find(|t| &t.field == key) {
            trace.status = FieldStatus::Defaulted;
        }
    }

    let quality = assess_quality(&record, mapping);
    normalize_record(&mut record, mapping, source_url);
    let fingerprint = compute_fingerprint(&record);

    tracing::debug!(
        scraper = %mapping.name,
        populated = quality.populated_fields,
        total = quality.total_fields,
        grade = %quality.grade,
        "listing extracted"
    );

    ExtractionResult {
        success: true,
        properties: vec![record],
        diagnostics: Some(ExtractionDiagnostics {
            scraper_name: mapping.name.clone(),
            populated_fields: quality.populated_fields,
            total_fields: quality.total_fields,
            extraction_rate: quality.extraction_rate,
            quality_grade: quality.grade,
            meets_expectation: quality.meets_expectation,
            missing_fields: quality.missing_fields,
            field_traces: options.include_field_trace.then_some(traces),
        }),
        fingerprint,
        error: None,
    }
}

fn typed_value(kind: FieldKind, field: &FieldMapping, text: &str) -> Value {
    match kind {
        FieldKind::Text => Value::String(text.to_string()),
        FieldKind::Int => Value::from(parse_int_or_zero(text)),
        FieldKind::Float => Number::from_f64(parse_float_or_zero(text))
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(0)),
        FieldKind::Boolean => Value::Bool(evaluate_boolean(field.evaluator.as_ref(), text)),
    }
}

fn evaluate_boolean(evaluator: Option<&Evaluator>, text: &str) -> bool {
    let text = text.trim();
    match evaluator {
        Some(Evaluator::Include(needle)) => text.to_lowercase().contains(&needle.to_lowercase()),
        Some(Evaluator::Equals(expected)) => text.eq_ignore_ascii_case(expected.trim()),
        Some(Evaluator::Present) => !text.is_empty(),
        None => matches!(
            text.to_lowercase().as_str(),
            "true" | "yes" | "y" | "1" | "on" | "si" | "sí" | "oui" | "ja" | "sim"
        ),
    }
}

/// Derived keys computed after scoring; they never count toward coverage.
fn normalize_record(record: &mut PropertyRecord, mapping: &ScraperMapping, source_url: &str) {
    let portal = &mapping.portal;

    let price_string = record.get("price_string").and_then(Value::as_str).map(str::to_string);
    let price_float = record.get("price_float").and_then(Value::as_f64);
    if price_string.is_some() || price_float.is_some() {
        let fallback_currency = record
            .get("currency")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
            .or_else(|| portal.currency.clone());
        let price = normalize_price(
            price_string.as_deref().unwrap_or(""),
            price_float,
            fallback_currency.as_deref(),
        );
        record.insert("price_cents".into(), Value::from(price.price_cents));
        record.insert("currency".into(), Value::String(price.currency));
        record.insert("price_display".into(), Value::String(price.display_string));
    }

    if let Some(raw) = record
        .get("property_type")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
    {
        let normalized = normalize_property_type(&raw);
        record.insert("property_type".into(), Value::String(normalized.as_str().to_string()));
        record.insert("property_type_raw".into(), Value::String(raw));
    }

    let listing_type = detect_listing_type(record, Some(source_url));
    record.insert("listing_type".into(), Value::String(listing_type.as_str().to_string()));

    for (key, portal_value) in [
        ("country", &portal.country),
        ("area_unit", &portal.area_unit),
        ("locale", &portal.locale),
    ] {
        if let Some(value) = portal_value {
            if !record.get(key).is_some_and(is_populated) {
                record.insert(key.to_string(), Value::String(value.clone()));
            }
        }
    }

    record.insert("import_url".into(), Value::String(source_url.to_string()));
}

/// Portal-name based extraction over a shared mapping cache.
pub struct Extractor {
    cache: Arc<MappingCache>,
    source: Box<dyn MappingSource>,
    options: ExtractOptions,
}

impl Extractor {
    pub fn new(source: impl MappingSource + 'static) -> Self {
        Self {
            cache: Arc::new(MappingCache::new()),
            source: Box::new(source),
            options: ExtractOptions::default(),
        }
    }

    /// Share `cache` with other extractors.
    pub fn with_cache(mut self, cache: Arc<MappingCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_options(mut self, options: ExtractOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cache(&self) -> &Arc<MappingCache> {
        &self.cache
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Extract with the mapping registered for `portal`. A mapping that
    /// cannot be loaded is the only unsuccessful outcome.
    pub fn extract(&self, portal: &str, html: &str, source_url: &str) -> ExtractionResult {
        match self.cache.get_or_load(portal, self.source.as_ref()) {
            Ok(mapping) => extract_from_html(html, source_url, &mapping, &self.options),
            Err(e) => {
                tracing::warn!(portal, error = %e, "mapping unavailable");
                ExtractionResult::failure(e.to_string())
            }
        }
    }
}
