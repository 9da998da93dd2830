//! Parsing and building of data URLs for inline images.

use base64::Engine;

use crate::error::{PergolaError, Result};
use crate::types::{EmbeddedImage, ImageFormat, ImageSource};

/// Decodes a base64 string that may be imperfectly formatted.
///
/// Browsers and hand-written clients send base64 with issues that strict
/// decoders reject: embedded whitespace or newlines, and missing `=` padding.
fn decode_base64_lenient(input: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let cleaned: String = input.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned)
}

/// Interprets the `image` field of a generation request.
///
/// Accepts:
/// - `data:image/<type>;base64,<payload>` data URLs,
/// - `http(s)://` URLs the upstream can fetch directly,
/// - bare base64 whose bytes carry a known image signature.
pub fn parse_image_field(value: &str) -> Result<ImageSource> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PergolaError::BadRequest("No image provided".into()));
    }

    if value.starts_with("http://") || value.starts_with("https://") {
        let url = url::Url::parse(value)
            .map_err(|e| PergolaError::BadRequest(format!("Invalid image URL: {e}")))?;
        return Ok(ImageSource::Hosted(url.to_string()));
    }

    if let Some(rest) = value.strip_prefix("data:") {
        return parse_data_url(rest).map(ImageSource::Embedded);
    }

    let bytes = decode_base64_lenient(value)
        .map_err(|_| PergolaError::BadRequest("Missing image data".into()))?;
    let format = ImageFormat::from_magic_bytes(&bytes)
        .ok_or_else(|| PergolaError::BadRequest("Missing image data".into()))?;

    Ok(ImageSource::Embedded(EmbeddedImage {
        bytes,
        mime: format.mime_type().to_string(),
    }))
}

/// Parses everything after `data:`.
fn parse_data_url(rest: &str) -> Result<EmbeddedImage> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| PergolaError::BadRequest("Malformed data URL".into()))?;

    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    if !mime.starts_with("image/") || mime.len() == "image/".len() {
        return Err(PergolaError::BadRequest("Missing image data".into()));
    }
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(PergolaError::BadRequest(
            "Image data URL must be base64 encoded".into(),
        ));
    }

    let bytes = decode_base64_lenient(payload)
        .map_err(|e| PergolaError::BadRequest(format!("Invalid base64 image data: {e}")))?;
    if bytes.is_empty() {
        return Err(PergolaError::BadRequest("Missing image data".into()));
    }

    Ok(EmbeddedImage { bytes, mime })
}

/// Encodes bytes as a `data:` URL.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}
