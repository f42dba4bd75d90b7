//! Source URL path segments

use url::Url;

use crate::error::StrategyError;

/// Segment `part` of the URL path split on `/` (index 0 is the empty string
/// before the leading slash). `None` returns the whole path.
pub fn url_segment(source_url: &str, part: Option<usize>) -> Result<Option<String>, StrategyError> {
    let url = Url::parse(source_url)
        .map_err(|e| StrategyError::InvalidUrl(format!("{source_url}: {e}")))?;
    let path = url.path();

    let segment = match part {
        None => Some(path),
        Some(index) => path.split('/').nth(index),
    };
    Ok(segment.filter(|s| !s.is_empty()).map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        let url = "https://portal.example.com/en/property/4521/sea-view?ref=home";
        assert_eq!(url_segment(url, Some(1)).unwrap().as_deref(), Some("en"));
        assert_eq!(url_segment(url, Some(3)).unwrap().as_deref(), Some("4521"));
        assert_eq!(url_segment(url, Some(9)).unwrap(), None);
        assert_eq!(url_segment(url, None).unwrap().as_deref(), Some("/en/property/4521/sea-view"));
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(url_segment("not a url", Some(1)), Err(StrategyError::InvalidUrl(_))));
    }
}
