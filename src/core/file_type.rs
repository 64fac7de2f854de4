//! Object type classification
//!
//! Maps an object key to a [`FileCategory`]. Keys ending with the delimiter are
//! folders; everything else is classified by its extension.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::path::{file_extension, DEFAULT_DELIMITER};

/// Semantic category of an object, derived from its key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Folder,
    Pdf,
    Image,
    Font,
    Application,
    Html,
    Js,
    Css,
    Video,
    Audio,
    Compressed,
    /// Recognized extension without a dedicated category (upper-cased)
    Extension(String),
    /// No extension at all
    Unknown,
}

const EXTENSION_TABLE: &[(&str, FileCategory)] = &[
    ("PDF", FileCategory::Pdf),
    ("JPG", FileCategory::Image),
    ("JPEG", FileCategory::Image),
    ("PNG", FileCategory::Image),
    ("BMP", FileCategory::Image),
    ("GIF", FileCategory::Image),
    ("SVG", FileCategory::Image),
    ("TTF", FileCategory::Font),
    ("OTF", FileCategory::Font),
    ("EOT", FileCategory::Font),
    ("WOFF", FileCategory::Font),
    ("WOFF2", FileCategory::Font),
    ("EXE", FileCategory::Application),
    ("HTML", FileCategory::Html),
    ("HTM", FileCategory::Html),
    ("JS", FileCategory::Js),
    ("TS", FileCategory::Js),
    ("CSS", FileCategory::Css),
    ("MP4", FileCategory::Video),
    ("WMV", FileCategory::Video),
    ("AVI", FileCategory::Video),
    ("MOV", FileCategory::Video),
    ("MKV", FileCategory::Video),
    ("MP3", FileCategory::Audio),
    ("WAV", FileCategory::Audio),
    ("AAC", FileCategory::Audio),
    ("FLAC", FileCategory::Audio),
    ("OGG", FileCategory::Audio),
    ("ZIP", FileCategory::Compressed),
    ("7Z", FileCategory::Compressed),
    ("GZIP", FileCategory::Compressed),
    ("GZ", FileCategory::Compressed),
    ("TAR", FileCategory::Compressed),
];

impl FileCategory {
    /// Classify an object key
    pub fn classify(key: &str) -> Self {
        if key.ends_with(DEFAULT_DELIMITER) {
            return FileCategory::Folder;
        }
        match file_extension(key) {
            Some(ext) => Self::from_extension(&ext),
            None => FileCategory::Unknown,
        }
    }

    /// Look up an extension, matching case-insensitively
    pub fn from_extension(extension: &str) -> Self {
        let upper = extension.to_ascii_uppercase();
        EXTENSION_TABLE
            .iter()
            .find(|(ext, _)| *ext == upper)
            .map(|(_, category)| category.clone())
            .unwrap_or(FileCategory::Extension(upper))
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, FileCategory::Folder)
    }

    /// Human readable label shown next to an object
    pub fn label(&self) -> String {
        match self {
            FileCategory::Folder => "File Folder".to_string(),
            FileCategory::Pdf => "PDF File".to_string(),
            FileCategory::Image => "Image File".to_string(),
            FileCategory::Font => "Font File".to_string(),
            FileCategory::Application => "Application".to_string(),
            FileCategory::Html => "HTML File".to_string(),
            FileCategory::Js => "JS File".to_string(),
            FileCategory::Css => "CSS File".to_string(),
            FileCategory::Video => "VIDEO File".to_string(),
            FileCategory::Audio => "AUDIO File".to_string(),
            FileCategory::Compressed => "Compressed File".to_string(),
            FileCategory::Extension(ext) => format!("{} File", ext),
            FileCategory::Unknown => "Unknown File".to_string(),
        }
    }
}

impl fmt::Display for FileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}
