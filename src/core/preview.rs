//! Previewable content detection
//!
//! Decides how an object body can be shown inline: images become a data URL,
//! valid UTF-8 becomes text, anything else is not previewable.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Bodies above this size are never fetched for preview
pub const PREVIEW_LIMIT: u64 = 100 * 1024 * 1024;

/// Inline rendering of an object body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum PreviewContent {
    /// `data:{mime};base64,...`
    Image(String),
    Text(String),
}

/// Mime type from the backend, falling back to a guess from the key
pub fn resolve_mime(content_type: Option<&str>, key: &str) -> String {
    match content_type {
        Some(ct) if !ct.trim().is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => mime_guess::from_path(key)
            .first_or_octet_stream()
            .essence_str()
            .to_string(),
    }
}

/// Classify a downloaded body
pub fn inspect(content_type: Option<&str>, key: &str, body: &[u8]) -> Option<PreviewContent> {
    let mime = resolve_mime(content_type, key);
    if mime.starts_with("image/") {
        return Some(PreviewContent::Image(format!(
            "data:{};base64,{}",
            mime,
            STANDARD.encode(body)
        )));
    }
    std::str::from_utf8(body)
        .ok()
        .map(|text| PreviewContent::Text(text.to_string()))
}

/// Whether an object of `size` bytes may be fetched for preview
pub fn within_limit(size: Option<u64>) -> bool {
    size.map_or(true, |s| s <= PREVIEW_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_becomes_data_url() {
        let preview = inspect(Some("image/png"), "a.png", &[1, 2, 3]);
        assert_eq!(
            preview,
            Some(PreviewContent::Image("data:image/png;base64,AQID".to_string()))
        );
    }

    #[test]
    fn test_mime_guessed_from_key() {
        assert_eq!(resolve_mime(None, "photos/cat.jpg"), "image/jpeg");
        assert_eq!(resolve_mime(Some("application/octet-stream"), "x.gif"), "image/gif");
        assert_eq!(resolve_mime(Some("text/csv"), "x.bin"), "text/csv");
    }

    #[test]
    fn test_text_and_binary() {
        assert_eq!(
            inspect(None, "notes.txt", b"hello"),
            Some(PreviewContent::Text("hello".to_string()))
        );
        assert_eq!(inspect(None, "blob.bin", &[0xff, 0xfe, 0x00]), None);
    }

    #[test]
    fn test_limit() {
        assert!(within_limit(None));
        assert!(within_limit(Some(PREVIEW_LIMIT)));
        assert!(!within_limit(Some(PREVIEW_LIMIT + 1)));
    }
}
