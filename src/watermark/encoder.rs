//! Output format selection and encoding.
//!
//! The output format is inferred from the source descriptor (a data URL
//! header, URL, path or mime type), never from the watermark itself:
//!
//! | descriptor contains | output |
//! |---|---|
//! | `image/png` | PNG |
//! | `image/gif` | PNG (first frame only) |
//! | `image/webp` | WebP |
//! | anything else | JPEG |

use super::WatermarkError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbaImage;
use std::io::Cursor;

/// Default JPEG quality, the usual 2D canvas export default.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

/// Encoded output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }
}

/// Infer the output format from the source descriptor.
pub fn infer_output_format(descriptor: &str) -> OutputFormat {
    if descriptor.contains("image/png") {
        OutputFormat::Png
    } else if descriptor.contains("image/gif") {
        // Animation is not preserved
        OutputFormat::Png
    } else if descriptor.contains("image/webp") {
        OutputFormat::WebP
    } else {
        OutputFormat::Jpeg
    }
}

/// Trait for surface encoders.
pub trait ImageEncoder: Send + Sync {
    /// The output format this encoder produces
    fn format(&self) -> OutputFormat;

    /// Encode an RGBA surface to bytes
    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, WatermarkError>;

    /// Check if this encoder keeps the alpha channel
    fn supports_transparency(&self) -> bool;
}

/// JPEG encoder using the image crate.
pub struct JpegEncoder {
    pub quality: u8,
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageEncoder for JpegEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Jpeg
    }

    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::jpeg::JpegEncoder as ImageJpegEncoder;
        use image::ImageEncoder as _;

        // JPEG has no alpha: composite onto black like a canvas export
        let rgb_data = flatten_onto_black(image.as_raw());

        let mut output = Cursor::new(Vec::new());
        let encoder = ImageJpegEncoder::new_with_quality(&mut output, self.quality.clamp(1, 100));

        encoder
            .write_image(
                &rgb_data,
                image.width(),
                image.height(),
                image::ColorType::Rgb8,
            )
            .map_err(|e| encode_failed("jpeg", e))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        false
    }
}

/// PNG encoder using the image crate.
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::Png
    }

    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::png::PngEncoder as ImagePngEncoder;
        use image::ImageEncoder as _;

        let mut output = Cursor::new(Vec::new());
        ImagePngEncoder::new(&mut output)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )
            .map_err(|e| encode_failed("png", e))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// WebP encoder using the image crate.
///
/// The `image` crate only encodes lossless WebP.
pub struct WebPEncoder;

impl ImageEncoder for WebPEncoder {
    fn format(&self) -> OutputFormat {
        OutputFormat::WebP
    }

    fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::webp::WebPEncoder as ImageWebPEncoder;
        use image::ImageEncoder as _;

        let mut output = Cursor::new(Vec::new());
        ImageWebPEncoder::new_lossless(&mut output)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )
            .map_err(|e| encode_failed("webp", e))?;

        Ok(output.into_inner())
    }

    fn supports_transparency(&self) -> bool {
        true
    }
}

/// Factory for creating encoders based on output format.
pub struct EncoderFactory;

impl EncoderFactory {
    pub fn create(format: OutputFormat, jpeg_quality: u8) -> Box<dyn ImageEncoder> {
        match format {
            OutputFormat::Jpeg => Box::new(JpegEncoder {
                quality: jpeg_quality,
            }),
            OutputFormat::Png => Box::new(PngEncoder),
            OutputFormat::WebP => Box::new(WebPEncoder),
        }
    }
}

/// Build a `data:<mime>;base64,<payload>` URL for encoded bytes.
pub fn to_data_url(format: OutputFormat, data: &[u8]) -> String {
    format!("data:{};base64,{}", format.content_type(), BASE64.encode(data))
}

fn encode_failed(format: &str, err: image::ImageError) -> WatermarkError {
    WatermarkError::render(format!("Failed to encode to {}: {}", format, err))
}

/// Drop the alpha channel by compositing each pixel over opaque black.
fn flatten_onto_black(rgba: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(rgba.len() / 4 * 3);

    for chunk in rgba.chunks_exact(4) {
        let alpha = chunk[3] as u32;
        for &channel in &chunk[..3] {
            rgb.push(((channel as u32 * alpha + 127) / 255) as u8);
        }
    }

    rgb
}
