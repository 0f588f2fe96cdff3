//! Source photo references.

use serde::{Deserialize, Serialize};

/// A photo supplied by the caller.
///
/// The locator is opaque to the model; the image loader decides how to
/// resolve it (file path, `file://` URL, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePhoto {
    /// Where the photo can be fetched from.
    pub locator: String,
}

impl SourcePhoto {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
        }
    }
}

impl From<&str> for SourcePhoto {
    fn from(locator: &str) -> Self {
        Self::new(locator)
    }
}

impl From<String> for SourcePhoto {
    fn from(locator: String) -> Self {
        Self::new(locator)
    }
}

/// Build an ordered photo list from any iterable of locators.
pub fn photos_from_locators<I, S>(locators: I) -> Vec<SourcePhoto>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    locators.into_iter().map(SourcePhoto::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photos_preserve_order() {
        let photos = photos_from_locators(["c.jpg", "a.jpg", "b.jpg"]);
        let locators: Vec<_> = photos.iter().map(|p| p.locator.as_str()).collect();
        assert_eq!(locators, vec!["c.jpg", "a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_photo_json_shape() {
        let json = serde_json::to_string(&SourcePhoto::new("x.png")).unwrap();
        assert_eq!(json, r#"{"locator":"x.png"}"#);
    }
}
