//! Image and feature list extraction

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{resolve_values, ListingDocument};
use crate::mapping::FieldMapping;
use crate::normalize::{image_extension, normalize_image_url_with, ImageUrlOptions};

/// One listing photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Set once dimensions or size have been filled in by a later stage.
    #[serde(default)]
    pub enriched: bool,
}

impl ImageInfo {
    fn from_normalized(url: String) -> Self {
        let format = Url::parse(&url).ok().and_then(|parsed| image_extension(&parsed));
        Self {
            url,
            width: None,
            height: None,
            size_bytes: None,
            format,
            enriched: false,
        }
    }
}

/// Collect every image the mappings locate, absolutized against the
/// document URL and normalized. Unusable URLs are dropped; duplicates keep
/// their first position.
pub fn extract_images(
    document: &ListingDocument,
    mappings: &[FieldMapping],
    options: &ImageUrlOptions,
) -> Vec<ImageInfo> {
    let base = Url::parse(document.source_url()).ok();
    let mut seen = HashSet::new();
    let mut images = Vec::new();

    for mapping in mappings {
        let mut mapping_options = options.clone();
        mapping_options
            .thumbnail_patterns
            .extend(mapping.thumbnail_patterns.iter().cloned());

        for raw in resolve_values(document, mapping) {
            let prefix = mapping.image_path_prefix.as_deref();
            let Some(absolute) = absolutize(&raw, base.as_ref(), prefix) else {
                tracing::debug!(url = %raw, "dropping unresolvable image URL");
                continue;
            };
            let Some(normalized) = normalize_image_url_with(&absolute, &mapping_options) else {
                tracing::debug!(url = %absolute, "dropping rejected image URL");
                continue;
            };
            if seen.insert(normalized.clone()) {
                images.push(ImageInfo::from_normalized(normalized));
            }
        }
    }

    images
}

/// Collect feature labels across mappings, first occurrence wins.
pub fn extract_features(document: &ListingDocument, mappings: &[FieldMapping]) -> Vec<String> {
    let mut seen = HashSet::new();
    mappings
        .iter()
        .flat_map(|mapping| resolve_values(document, mapping))
        .filter(|feature| seen.insert(feature.clone()))
        .collect()
}

/// Absolute form of `raw`. Only paths that were relative get `prefix`.
fn absolutize(raw: &str, base: Option<&Url>, prefix: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("//") || Url::parse(raw).is_ok() {
        return Some(raw.to_string());
    }

    let relative = match prefix {
        Some(prefix) => format!("{prefix}{raw}"),
        None => raw.to_string(),
    };
    if Url::parse(&relative).is_ok() {
        return Some(relative);
    }
    base?.join(&relative).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ThumbnailPattern;

    const GALLERY: &str = r#"
    <html><head>
    <script>
    var gallery = {"photos": [{"src": "/media/1_thumb.jpg"},
                              {"src": "//cdn.example.com/2_thumb.jpg"},
                              {"src": "/media/1_thumb.jpg"},
                              {"src": "/docs/plan.pdf"}]};
    </script>
    </head><body>
    <img class="hero" src="http://static.example.com/hero.png">
    <img class="hero" src="mailto:someone">
    <li class="amenity">Lift</li><li class="amenity">Terrace</li><li class="amenity">Lift</li>
    </body></html>
    "#;

    #[test]
    fn test_images_absolutized_normalized_deduplicated() {
        let document = ListingDocument::parse(GALLERY, "https://www.example.com/listing/7");
        let mut photos = FieldMapping::from_json(
            "images",
            r#"{"scriptJsonVar": "gallery", "scriptJsonPath": "photos", "cssAttr": "src"}"#,
        )
        .unwrap();
        photos.thumbnail_patterns = vec![ThumbnailPattern {
            pattern: "_thumb".into(),
            replacement: "_full".into(),
        }];
        let hero =
            FieldMapping::from_json("images", r#"{"cssLocator": "img.hero", "cssAttr": "src"}"#)
                .unwrap();

        let images = extract_images(&document, &[photos, hero], &ImageUrlOptions::default());
        let urls: Vec<&str> = images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://www.example.com/media/1_full.jpg",
                "https://cdn.example.com/2_full.jpg",
                "https://static.example.com/hero.png",
            ]
        );
        assert_eq!(images[2].format.as_deref(), Some("png"));
    }

    #[test]
    fn test_prefix_only_for_relative_paths() {
        let base = Url::parse("https://portal.example.com/a/b").unwrap();
        let prefix = Some("https://img.example.com/");
        assert_eq!(
            absolutize("photos/9.jpg", Some(&base), prefix).as_deref(),
            Some("https://img.example.com/photos/9.jpg")
        );
        assert_eq!(
            absolutize("https://other.example.com/9.jpg", Some(&base), prefix).as_deref(),
            Some("https://other.example.com/9.jpg")
        );
        assert_eq!(
            absolutize("9.jpg", Some(&base), None).as_deref(),
            Some("https://portal.example.com/a/9.jpg")
        );
        assert_eq!(absolutize("9.jpg", None, None), None);
    }

    #[test]
    fn test_features_deduplicated() {
        let document = ListingDocument::parse(GALLERY, "https://www.example.com/listing/7");
        let features = extract_features(&document, &[FieldMapping::css("li.amenity")]);
        assert_eq!(features, vec!["Lift", "Terrace"]);
    }
}
