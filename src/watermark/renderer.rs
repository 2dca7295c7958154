//! Watermark rendering pipeline.
//!
//! [`WatermarkRenderer`] loads a source image, stamps a single line of text
//! on a copy of it and re-encodes the result in a format inferred from the
//! source:
//!
//! 1. Load and decode the source (the only suspension point)
//! 2. Copy the bitmap onto a fresh [`RasterSurface`]
//! 3. Resolve the text (pre-formatted text or the timestamp)
//! 4. Measure the text and place it (grid or percentage)
//! 5. Paint an optional backing rectangle, then the text
//! 6. Encode
//!
//! # Example
//!
//! ```ignore
//! use chrono::Local;
//! use stampmark::config::{RendererConfig, WatermarkSettings};
//! use stampmark::watermark::{ImageSource, WatermarkRenderer};
//!
//! let renderer = WatermarkRenderer::new(&RendererConfig::default())?;
//! let output = renderer
//!     .render(
//!         &ImageSource::parse("photo.jpg"),
//!         &Local::now(),
//!         &WatermarkSettings::default(),
//!         None,
//!     )
//!     .await?;
//! std::fs::write(format!("stamped.{}", output.format.extension()), &output.data)?;
//! ```

use super::encoder::{infer_output_format, to_data_url, EncoderFactory, OutputFormat};
use super::position::{
    backing_rect, place_by_percentage, place_on_grid, ImageDimensions, TextMetrics,
    TextPlacement,
};
use super::source::{DecodedImage, ImageLoader, ImageSource};
use super::surface::RasterSurface;
use super::template::resolve_text;
use super::text_renderer::{hex_to_rgba, RgbaColor};
use super::WatermarkError;
use crate::config::{Position, RendererConfig, WatermarkSettings};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;

/// Grid-placed text gets a backing rectangle below this opacity.
pub const BACKING_OPACITY_THRESHOLD: f32 = 0.8;

/// Backing rectangle fill, translucent black.
pub const BACKING_COLOR: RgbaColor = RgbaColor {
    r: 0,
    g: 0,
    b: 0,
    alpha: 0.2,
};

/// An encoded, watermarked image.
#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkedImage {
    /// Encoded bytes.
    pub data: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    /// The text that was painted.
    pub text: String,
}

impl WatermarkedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// `data:<mime>;base64,<payload>` for the encoded bytes.
    pub fn to_data_url(&self) -> String {
        to_data_url(self.format, &self.data)
    }
}

/// Stamps text watermarks onto images.
///
/// Holds no per-call state: every call allocates its own surface, so one
/// renderer can serve concurrent calls.
#[derive(Clone)]
pub struct WatermarkRenderer {
    loader: ImageLoader,
    jpeg_quality: u8,
}

impl WatermarkRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self, WatermarkError> {
        Ok(Self {
            loader: ImageLoader::new(config)?,
            jpeg_quality: config.jpeg_quality,
        })
    }

    /// Load `source`, stamp it and encode the result.
    ///
    /// The text is `formatted_text` when it is non-empty, otherwise
    /// `timestamp` formatted as `YYYY-MM-DD HH:MM:SS` in its own time zone.
    ///
    /// # Errors
    ///
    /// `DecodeError` if the source cannot be loaded, `RenderError` for any
    /// failure after that. No output is produced on failure.
    pub async fn render<Tz>(
        &self,
        source: &ImageSource,
        timestamp: &DateTime<Tz>,
        settings: &WatermarkSettings,
        formatted_text: Option<&str>,
    ) -> Result<WatermarkedImage, WatermarkError>
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let decoded = match self.loader.load(source).await {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(source = %source.describe(), error = %e, "Failed to load watermark source");
                return Err(e);
            }
        };

        tracing::debug!(
            width = decoded.width(),
            height = decoded.height(),
            descriptor = %decoded.descriptor,
            "Decoded watermark source"
        );

        let text = resolve_text(formatted_text, timestamp);
        self.render_decoded(&decoded, &text, settings)
    }

    /// Stamp `text` onto an already decoded image.
    pub fn render_decoded(
        &self,
        image: &DecodedImage,
        text: &str,
        settings: &WatermarkSettings,
    ) -> Result<WatermarkedImage, WatermarkError> {
        let mut surface = RasterSurface::from_image(&image.image)?;

        let metrics = TextMetrics {
            width: surface.measure_text(text, settings.font_size)?,
            height: settings.font_size * settings.position.line_height_factor(),
        };
        let color = hex_to_rgba(&settings.color, settings.opacity)?;

        let dimensions = ImageDimensions {
            width: surface.width(),
            height: surface.height(),
        };
        let placement = compute_placement(&settings.position, &dimensions, &metrics)?;

        tracing::debug!(
            text_width = metrics.width,
            text_height = metrics.height,
            x = placement.anchor_x,
            y = placement.baseline_y,
            position = ?settings.position,
            "Computed watermark placement"
        );

        if settings.position.is_grid() && settings.opacity < BACKING_OPACITY_THRESHOLD {
            surface.fill_rect(&backing_rect(&placement, &metrics), BACKING_COLOR);
        }

        surface.fill_text(
            text,
            settings.font_size,
            placement.origin_x,
            placement.baseline_y,
            color,
        )?;

        let format = infer_output_format(&image.descriptor);
        let data = EncoderFactory::create(format, self.jpeg_quality).encode(surface.as_image())?;

        tracing::debug!(
            format = format.as_str(),
            bytes = data.len(),
            "Encoded watermarked image"
        );

        Ok(WatermarkedImage {
            data,
            format,
            width: dimensions.width,
            height: dimensions.height,
            text: text.to_string(),
        })
    }
}

/// Dispatch to the placement formula for `position`.
pub fn compute_placement(
    position: &Position,
    image: &ImageDimensions,
    text: &TextMetrics,
) -> Result<TextPlacement, WatermarkError> {
    match *position {
        Position::Grid(index) => Ok(place_on_grid(index, image, text)),
        Position::Percentage { x, y } => {
            if !x.is_finite() || !y.is_finite() {
                return Err(WatermarkError::render(format!(
                    "Position percentages must be finite, got ({}, {})",
                    x, y
                )));
            }
            Ok(place_by_percentage(x, y, image, text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watermark::encoder::{ImageEncoder, PngEncoder};
    use chrono::Utc;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn renderer() -> WatermarkRenderer {
        WatermarkRenderer::new(&RendererConfig::default()).unwrap()
    }

    fn gray_image(width: u32, height: u32, descriptor: &str) -> DecodedImage {
        let image = RgbaImage::from_pixel(width, height, Rgba([128, 128, 128, 255]));
        DecodedImage::new(DynamicImage::ImageRgba8(image), descriptor)
    }

    fn decode_output(output: &WatermarkedImage) -> RgbaImage {
        image::load_from_memory(&output.data).unwrap().to_rgba8()
    }

    #[test]
    fn test_render_decoded_keeps_dimensions() {
        let output = renderer()
            .render_decoded(
                &gray_image(320, 240, "image/png"),
                "Hello",
                &WatermarkSettings::default(),
            )
            .unwrap();

        assert_eq!((output.width, output.height), (320, 240));
        assert_eq!(output.format, OutputFormat::Png);
        assert_eq!(decode_output(&output).dimensions(), (320, 240));
        assert_eq!(output.text, "Hello");
    }

    #[test]
    fn test_render_decoded_one_pixel_image() {
        let output = renderer()
            .render_decoded(
                &gray_image(1, 1, "image/png"),
                "2024-03-05 02:01:09",
                &WatermarkSettings::default(),
            )
            .unwrap();
        assert_eq!(decode_output(&output).dimensions(), (1, 1));
    }

    #[test]
    fn test_render_decoded_paints_text() {
        let settings = WatermarkSettings {
            color: "#FF0000".to_string(),
            opacity: 1.0,
            position: Position::Grid(4),
            ..WatermarkSettings::default()
        };
        let output = renderer()
            .render_decoded(&gray_image(300, 100, "image/png"), "STAMP", &settings)
            .unwrap();

        let reddish = decode_output(&output)
            .pixels()
            .filter(|p| p[0] > 200 && p[1] < 80)
            .count();
        assert!(reddish > 0);
    }

    #[test]
    fn test_backing_rect_only_below_threshold() {
        // An empty string paints no glyphs, leaving only the backing rectangle
        let image = gray_image(200, 100, "image/png");
        let center = |opacity: f32| {
            let settings = WatermarkSettings {
                opacity,
                position: Position::Grid(4),
                ..WatermarkSettings::default()
            };
            let output = renderer().render_decoded(&image, "", &settings).unwrap();
            *decode_output(&output).get_pixel(100, 48)
        };

        assert_eq!(center(0.8), Rgba([128, 128, 128, 255]));
        assert_eq!(center(1.0), Rgba([128, 128, 128, 255]));
        let darkened = center(0.79);
        assert!(darkened[0] < 128, "got {:?}", darkened);
    }

    #[test]
    fn test_percentage_mode_has_no_backing_rect() {
        let settings = WatermarkSettings {
            opacity: 0.1,
            position: Position::Percentage { x: 50.0, y: 50.0 },
            ..WatermarkSettings::default()
        };
        let output = renderer()
            .render_decoded(&gray_image(200, 100, "image/png"), "", &settings)
            .unwrap();
        assert!(decode_output(&output)
            .pixels()
            .all(|p| *p == Rgba([128, 128, 128, 255])));
    }

    #[test]
    fn test_render_decoded_rejects_bad_color() {
        let settings = WatermarkSettings {
            color: "not-a-color".to_string(),
            ..WatermarkSettings::default()
        };
        let err = renderer()
            .render_decoded(&gray_image(10, 10, "image/png"), "x", &settings)
            .unwrap_err();
        assert!(matches!(err, WatermarkError::RenderError(_)));
    }

    #[test]
    fn test_render_decoded_rejects_zero_font_size() {
        let settings = WatermarkSettings {
            font_size: 0.0,
            ..WatermarkSettings::default()
        };
        let err = renderer()
            .render_decoded(&gray_image(10, 10, "image/png"), "x", &settings)
            .unwrap_err();
        assert!(matches!(err, WatermarkError::RenderError(_)));
    }

    #[test]
    fn test_compute_placement_rejects_nan() {
        let image = ImageDimensions {
            width: 10,
            height: 10,
        };
        let text = TextMetrics {
            width: 1.0,
            height: 1.0,
        };
        let position = Position::Percentage {
            x: f32::NAN,
            y: 0.0,
        };
        assert!(compute_placement(&position, &image, &text).is_err());
    }

    #[test]
    fn test_format_follows_descriptor() {
        let settings = WatermarkSettings::default();
        let renderer = renderer();

        let jpeg = renderer
            .render_decoded(&gray_image(16, 16, "image/jpeg"), "x", &settings)
            .unwrap();
        assert_eq!(jpeg.format, OutputFormat::Jpeg);
        assert_eq!(&jpeg.data[0..2], &[0xFF, 0xD8]);

        let webp = renderer
            .render_decoded(&gray_image(16, 16, "data:image/webp;base64"), "x", &settings)
            .unwrap();
        assert_eq!(webp.format, OutputFormat::WebP);
        assert_eq!(webp.content_type(), "image/webp");
    }

    #[tokio::test]
    async fn test_render_uses_timestamp_when_text_empty() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 2, 1, 9).unwrap();
        let png = PngEncoder
            .encode(&RgbaImage::from_pixel(64, 32, Rgba([0, 0, 0, 255])))
            .unwrap();
        let source = ImageSource::Bytes {
            data: png.into(),
            content_type: Some("image/png".to_string()),
        };

        let output = renderer()
            .render(&source, &ts, &WatermarkSettings::default(), Some(""))
            .await
            .unwrap();
        assert_eq!(output.text, "2024-03-05 02:01:09");
        assert_eq!(output.format, OutputFormat::Png);
    }

    #[tokio::test]
    async fn test_render_decode_failure() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 5, 2, 1, 9).unwrap();
        let source = ImageSource::from_bytes(&b"definitely not an image"[..]);

        let err = renderer()
            .render(&source, &ts, &WatermarkSettings::default(), None)
            .await
            .unwrap_err();
        assert!(err.is_decode());
    }
}
