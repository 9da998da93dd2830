use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};

use crate::error::{PergolaError, Result};
use crate::types::ImageFormat;

/// Bounds applied to a photo before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOptions {
    /// Widest image sent as-is.
    pub max_width: u32,
    /// Tallest image sent as-is.
    pub max_height: u32,
    /// JPEG quality (1-100) used when re-encoding.
    pub jpeg_quality: u8,
}

impl Default for ResizeOptions {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1920,
            jpeg_quality: 85,
        }
    }
}

impl ResizeOptions {
    /// Square bounds of `dimension` pixels.
    pub fn square(dimension: u32) -> Self {
        Self {
            max_width: dimension,
            max_height: dimension,
            ..Self::default()
        }
    }
}

/// A photo ready to be embedded in a generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`.
    pub mime: String,
    /// Whether the photo was downscaled and re-encoded.
    pub resized: bool,
}

/// Downscales oversized photos; in-bounds photos are returned untouched.
pub fn prepare_image(bytes: Vec<u8>, options: &ResizeOptions) -> Result<PreparedImage> {
    let reader = ImageReader::new(Cursor::new(&bytes)).with_guessed_format()?;
    let detected = reader.format();
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| PergolaError::Image(e.to_string()))?;

    if width <= options.max_width && height <= options.max_height {
        let mime = ImageFormat::from_magic_bytes(&bytes)
            .map(|f| f.mime_type().to_string())
            .or_else(|| detected.map(|f| f.to_mime_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".to_string());
        return Ok(PreparedImage {
            bytes,
            mime,
            resized: false,
        });
    }

    let decoded = image::load_from_memory(&bytes).map_err(|e| PergolaError::Image(e.to_string()))?;
    let rgb = decoded
        .resize(options.max_width, options.max_height, FilterType::Triangle)
        .to_rgb8();
    tracing::debug!(
        from_width = width,
        from_height = height,
        to_width = rgb.width(),
        to_height = rgb.height(),
        "downscaled photo before upload"
    );

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, options.jpeg_quality.clamp(1, 100))
        .encode_image(&DynamicImage::ImageRgb8(rgb))
        .map_err(|e| PergolaError::Image(e.to_string()))?;

    Ok(PreparedImage {
        bytes: out,
        mime: ImageFormat::Jpeg.mime_type().to_string(),
        resized: true,
    })
}
