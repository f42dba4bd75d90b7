//! Image URL normalization

use url::Url;

use crate::mapping::ThumbnailPattern;

/// Extensions accepted when the caller does not supply its own list.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "bmp", "tiff"];

#[derive(Debug, Clone, PartialEq)]
pub struct ImageUrlOptions {
    /// Rewrite `http:` to `https:`.
    pub upgrade_http: bool,
    /// Lowercase extensions; URLs without an extension always pass.
    pub allowed_extensions: Vec<String>,
    /// Thumbnail to full-size substring replacements, applied in order.
    pub thumbnail_patterns: Vec<ThumbnailPattern>,
}

impl Default for ImageUrlOptions {
    fn default() -> Self {
        Self {
            upgrade_http: true,
            allowed_extensions: DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            thumbnail_patterns: Vec::new(),
        }
    }
}

/// Normalize with the default options.
pub fn normalize_image_url(raw: &str) -> Option<String> {
    normalize_image_url_with(raw, &ImageUrlOptions::default())
}

/// Canonical absolute https URL for an image, or `None` when the URL is
/// unusable.
pub fn normalize_image_url_with(raw: &str, options: &ImageUrlOptions) -> Option<String> {
    let trimmed = raw.trim();
    let candidate = match trimmed.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => trimmed.to_string(),
    };

    let mut url = Url::parse(&candidate).ok()?;
    match url.scheme() {
        "https" => {}
        "http" if options.upgrade_http => url.set_scheme("https").ok()?,
        "http" => {}
        _ => return None,
    }
    url.host_str().filter(|h| !h.is_empty())?;

    if let Some(ext) = image_extension(&url) {
        if !options.allowed_extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&ext)) {
            return None;
        }
    }

    let mut normalized = url.to_string();
    for ThumbnailPattern { pattern, replacement } in &options.thumbnail_patterns {
        if !pattern.is_empty() {
            normalized = normalized.replace(pattern.as_str(), replacement);
        }
    }
    Some(normalized)
}

/// Lowercased extension of the last path segment, when it looks like one.
pub fn image_extension(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    let looks_like_extension =
        (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric());
    looks_like_extension.then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_relative_and_scheme() {
        assert_eq!(
            normalize_image_url("//cdn.x.com/a.jpg").as_deref(),
            Some("https://cdn.x.com/a.jpg")
        );
        assert_eq!(normalize_image_url("ftp://x.com/a.jpg"), None);
        assert_eq!(normalize_image_url("data:image/png;base64,AAAA"), None);
        assert_eq!(normalize_image_url("not a url"), None);
    }

    #[test]
    fn test_http_upgrade_can_be_disabled() {
        assert_eq!(
            normalize_image_url("http://x.com/a.png").as_deref(),
            Some("https://x.com/a.png")
        );

        let options = ImageUrlOptions { upgrade_http: false, ..ImageUrlOptions::default() };
        assert_eq!(
            normalize_image_url_with("http://x.com/a.png", &options).as_deref(),
            Some("http://x.com/a.png")
        );
    }

    #[test]
    fn test_extension_allow_list() {
        assert_eq!(normalize_image_url("https://x.com/floorplan.pdf"), None);
        assert!(normalize_image_url("https://x.com/photo.JPG").is_some());
        assert!(normalize_image_url("https://x.com/img/12345?w=800").is_some());
        assert!(normalize_image_url("https://x.com/v1.2/photo").is_some());
    }

    #[test]
    fn test_thumbnail_replacements_in_order() {
        let options = ImageUrlOptions {
            thumbnail_patterns: vec![
                ThumbnailPattern { pattern: "/thumbs/".into(), replacement: "/large/".into() },
                ThumbnailPattern { pattern: "_s.".into(), replacement: "_xl.".into() },
            ],
            ..ImageUrlOptions::default()
        };
        assert_eq!(
            normalize_image_url_with("https://img.x.com/thumbs/44_s.webp", &options).as_deref(),
            Some("https://img.x.com/large/44_xl.webp")
        );
    }
}
