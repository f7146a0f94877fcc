use crate::errors::DetectionError;
use crate::outcome::ImageSize;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader, RgbImage};
use std::io::Cursor;

/// Uploaded bytes together with what the uploader claimed they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

impl RawImage {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: Some(content_type.into()),
            filename: None,
        }
    }

    pub fn untyped(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: None,
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Whether the declared content type is an `image/*` media type.
    pub fn declares_image(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.trim().to_ascii_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }
}

/// Decoded three-channel bitmap.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pixels: RgbImage,
    source_format: Option<ImageFormat>,
    source_color: ColorType,
}

impl NormalizedImage {
    /// Wraps pixels that were decoded elsewhere.
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self {
            pixels,
            source_format: None,
            source_color: ColorType::Rgb8,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Interleaved RGB bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn source_color(&self) -> ColorType {
        self.source_color
    }
}

/// Decodes `raw` and converts it to RGB.
///
/// Grayscale and palette images expand losslessly; alpha channels are
/// dropped and 16-bit or float samples are reduced to 8 bits.
pub fn validate_and_normalize(raw: &RawImage) -> Result<NormalizedImage, DetectionError> {
    if raw.bytes.is_empty() {
        return Err(DetectionError::InvalidImage("empty image payload".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(raw.bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| DetectionError::InvalidImage(format!("unable to read image: {}", e)))?;

    let source_format = reader.format().ok_or_else(|| {
        DetectionError::InvalidImage("unable to determine image format".to_string())
    })?;

    if source_format == ImageFormat::Jpeg && !jpeg_is_complete(&raw.bytes) {
        return Err(DetectionError::InvalidImage(
            "truncated JPEG: no end-of-image marker after the last scan".to_string(),
        ));
    }

    let decoded = reader.decode().map_err(|e| {
        DetectionError::InvalidImage(format!(
            "failed to decode {} image: {}",
            source_format.extensions_str().first().unwrap_or(&"unknown"),
            e
        ))
    })?;

    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(DetectionError::InvalidImage(format!(
            "image has no pixels ({}x{})",
            decoded.width(),
            decoded.height()
        )));
    }

    let source_color = decoded.color();
    let pixels = match decoded {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.into_rgb8(),
    };

    tracing::trace!(
        format = ?source_format,
        color = ?source_color,
        width = pixels.width(),
        height = pixels.height(),
        "Image normalized"
    );

    Ok(NormalizedImage {
        pixels,
        source_format: Some(source_format),
        source_color,
    })
}

const JPEG_SOS: [u8; 2] = [0xFF, 0xDA];
const JPEG_EOI: [u8; 2] = [0xFF, 0xD9];

/// The JPEG decoder pads missing scan data instead of failing, so a cut-off
/// upload must be caught here. Entropy-coded data byte-stuffs every 0xFF, so
/// a complete stream has an EOI marker after its last SOS. Bytes trailing the
/// EOI are allowed.
fn jpeg_is_complete(bytes: &[u8]) -> bool {
    bytes
        .windows(2)
        .rposition(|w| w == JPEG_SOS)
        .is_some_and(|sos| bytes[sos..].windows(2).any(|w| w == JPEG_EOI))
}
