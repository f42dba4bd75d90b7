//! Real-estate listing extraction
//!
//! Turns a listing page into a flat property record, driven by declarative
//! per-portal mappings:
//! - field strategies: CSS selectors, script regex, inline script JSON,
//!   streamed flight data, JSON-LD, URL path segments, with fallback trees
//! - named text modifiers
//! - price, image URL, property type and listing type normalization
//! - quality scoring, filtering and asset/listing splitting
//!
//! Exposed to C callers through a JSON-in/JSON-out FFI.

pub mod cache;
pub mod engine;
pub mod error;
pub mod extractors;
pub mod ffi;
pub mod filter;
pub mod fingerprint;
pub mod mapping;
pub mod modifiers;
pub mod normalize;
pub mod quality;
pub mod schema;

pub use cache::{DirectorySource, MappingCache, MappingSource};
pub use engine::{
    extract_from_html, ExtractOptions, ExtractionDiagnostics, ExtractionResult, Extractor,
    FieldStatus, FieldTrace, PropertyRecord,
};
pub use error::{MappingError, StrategyError};
pub use extractors::{ImageInfo, ListingDocument};
pub use ffi::*;
pub use filter::{apply_filters, FilterCriteria, FilterOutcome, FilterReason};
pub use fingerprint::compute_fingerprint;
pub use mapping::{FieldMapping, ScraperMapping};
pub use modifiers::apply_modifiers;
pub use quality::{compute_quality_grade, QualityGrade};
pub use schema::{split_property_hash, SplitProperty};
