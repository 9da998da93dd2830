//! Core types for a generation request.

use serde::{Deserialize, Serialize};

/// Filename used for staged uploads when the caller does not supply one.
pub const DEFAULT_FILENAME: &str = "upload.jpg";

/// Image formats recognised from magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format.
    WebP,
    /// GIF format.
    Gif,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
            Self::Gif => "gif",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(Self::Gif);
        }

        // RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }
}

/// Image bytes that arrived inline and must be staged before submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    /// Raw decoded bytes.
    pub bytes: Vec<u8>,
    /// Declared or sniffed media type.
    pub mime: String,
}

impl EmbeddedImage {
    /// Size of the decoded payload in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Where the source photo comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Inline bytes (data URL or bare base64).
    Embedded(EmbeddedImage),
    /// An image the upstream can already fetch.
    Hosted(String),
}

/// A validated generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The source photo.
    pub image: ImageSource,
    /// Filename used when staging the photo.
    pub filename: String,
    /// Optional pergola colour.
    pub color: Option<String>,
    /// Optional free-text note appended to the prompt.
    pub note: Option<String>,
}

impl GenerationRequest {
    /// Creates a request for the given image with default filename and no extras.
    pub fn new(image: ImageSource) -> Self {
        Self {
            image,
            filename: DEFAULT_FILENAME.to_string(),
            color: None,
            note: None,
        }
    }

    /// Sets the filename used for the staging upload.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Sets the pergola colour.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    /// Sets the free-text note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Successful generation: the URL of the rendered image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    /// URL of the generated image.
    pub image: String,
}

/// Error body returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
    /// Diagnostic payload, only present in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
