//! Text measurement and glyph rasterization.
//!
//! This module owns the embedded default typeface and the color conversion
//! used for watermark text.
//!
//! # Features
//!
//! - Hex color parsing (`#RRGGBB`, the `#` is optional) combined with an opacity
//! - Advance-width text measurement (glyph advances plus kerning)
//! - Coverage-based glyph rasterization at a left-baseline origin
//!
//! # Example
//!
//! ```ignore
//! use stampmark::watermark::text_renderer::{hex_to_rgba, measure_text};
//!
//! let color = hex_to_rgba("#FF0000", 0.5).unwrap();
//! assert_eq!(color.to_string(), "rgba(255, 0, 0, 0.5)");
//!
//! let width = measure_text("2024-03-05 02:01:09", 24.0).unwrap();
//! ```

use super::WatermarkError;
use ab_glyph::{point, Font, FontRef, GlyphId, PxScale, ScaleFont};
use image::Rgba;
use std::fmt;
use std::sync::OnceLock;

static DEFAULT_FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();

/// Embedded font data (DejaVu Sans, proportional sans-serif).
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSans.ttf");

/// Get the default font, initializing it lazily.
fn default_font() -> Result<&'static FontRef<'static>, WatermarkError> {
    DEFAULT_FONT
        .get_or_init(|| FontRef::try_from_slice(EMBEDDED_FONT_DATA).ok())
        .as_ref()
        .ok_or_else(|| WatermarkError::render("Failed to initialize embedded font"))
}

fn check_font_size(font_size: f32) -> Result<(), WatermarkError> {
    if !font_size.is_finite() || font_size <= 0.0 {
        return Err(WatermarkError::render(format!(
            "Font size must be a positive number, got {}",
            font_size
        )));
    }
    Ok(())
}

/// RGB color with a fractional alpha, the fill style for watermark text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RgbaColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    /// Alpha from 0.0 (transparent) to 1.0 (opaque).
    pub alpha: f32,
}

impl RgbaColor {
    pub fn new(r: u8, g: u8, b: u8, alpha: f32) -> Self {
        Self { r, g, b, alpha }
    }

    /// Alpha quantized to a byte, clamped to the valid range.
    pub fn alpha_u8(&self) -> u8 {
        (self.alpha.clamp(0.0, 1.0) * 255.0).round() as u8
    }

    pub fn to_pixel(&self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.alpha_u8()])
    }
}

impl fmt::Display for RgbaColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, self.alpha)
    }
}

/// Convert a hex color plus an opacity into an [`RgbaColor`].
///
/// Accepts `#RRGGBB` or `RRGGBB`. Each channel is the exact decimal value of
/// its hex byte pair; the opacity is carried through unchanged.
pub fn hex_to_rgba(hex: &str, opacity: f32) -> Result<RgbaColor, WatermarkError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);

    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WatermarkError::render(format!(
            "Color must be in #RRGGBB format, got '{}'",
            hex
        )));
    }

    if !opacity.is_finite() {
        return Err(WatermarkError::render(format!(
            "Opacity must be a finite number, got {}",
            opacity
        )));
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map_err(|_| WatermarkError::render(format!("Invalid hex digit in '{}'", hex)))
    };

    Ok(RgbaColor::new(
        channel(0..2)?,
        channel(2..4)?,
        channel(4..6)?,
        opacity,
    ))
}

/// Measure the advance width of `text` at `font_size` pixels.
///
/// Matches what a 2D canvas reports as the text width: the sum of horizontal
/// advances plus pair kerning, with no padding.
pub fn measure_text(text: &str, font_size: f32) -> Result<f32, WatermarkError> {
    check_font_size(font_size)?;
    let font = default_font()?;
    let scaled_font = font.as_scaled(PxScale::from(font_size));

    let mut width = 0.0f32;
    let mut prev_glyph: Option<GlyphId> = None;

    for c in text.chars() {
        let glyph_id = scaled_font.glyph_id(c);
        if let Some(prev) = prev_glyph {
            width += scaled_font.kern(prev, glyph_id);
        }
        width += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    Ok(width)
}

/// Rasterize `text` with its left-baseline origin at `(origin_x, baseline_y)`.
///
/// `plot` receives integer pixel coordinates and the glyph coverage in
/// `0.0..=1.0`. Glyphs whose pixel bounds fall entirely outside
/// `0..clip_width` x `0..clip_height` are skipped; pixels of partially
/// visible glyphs may still lie outside and must be bounds-checked by the
/// caller.
pub fn rasterize_text<F>(
    text: &str,
    font_size: f32,
    origin_x: f32,
    baseline_y: f32,
    (clip_width, clip_height): (u32, u32),
    mut plot: F,
) -> Result<(), WatermarkError>
where
    F: FnMut(i32, i32, f32),
{
    check_font_size(font_size)?;
    let font = default_font()?;
    let scale = PxScale::from(font_size);
    let scaled_font = font.as_scaled(scale);

    let mut cursor_x = origin_x;
    let mut prev_glyph: Option<GlyphId> = None;

    for c in text.chars() {
        let glyph_id = scaled_font.glyph_id(c);

        if let Some(prev) = prev_glyph {
            cursor_x += scaled_font.kern(prev, glyph_id);
        }

        let glyph = glyph_id.with_scale_and_position(scale, point(cursor_x, baseline_y));

        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            let visible = bounds.max.x > 0.0
                && bounds.max.y > 0.0
                && bounds.min.x < clip_width as f32
                && bounds.min.y < clip_height as f32;
            if visible {
                let min_x = bounds.min.x as i32;
                let min_y = bounds.min.y as i32;
                outlined.draw(|px, py, coverage| {
                    plot(min_x + px as i32, min_y + py as i32, coverage);
                });
            }
        }

        cursor_x += scaled_font.h_advance(glyph_id);
        prev_glyph = Some(glyph_id);
    }

    Ok(())
}
