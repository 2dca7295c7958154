//! Off-screen raster surface for watermark painting.
//!
//! A surface is created per render call from the decoded source image and
//! discarded after encoding. Painting uses the Porter-Duff "over" operator so
//! translucent fills blend with the pixels underneath.

use super::position::Rect;
use super::text_renderer::{measure_text, rasterize_text, RgbaColor};
use super::WatermarkError;
use image::{DynamicImage, Rgba, RgbaImage};

/// Writable RGBA pixel buffer sized exactly to the source image.
pub struct RasterSurface {
    pixels: RgbaImage,
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("dimensions", &self.pixels.dimensions())
            .finish()
    }
}

impl RasterSurface {
    /// Allocate a surface matching `image` and copy it in unscaled at (0, 0).
    pub fn from_image(image: &DynamicImage) -> Result<Self, WatermarkError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(WatermarkError::render(format!(
                "Cannot create a {}x{} surface",
                image.width(),
                image.height()
            )));
        }

        Ok(Self {
            pixels: image.to_rgba8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Advance width of `text` at `font_size` pixels in the default typeface.
    pub fn measure_text(&self, text: &str, font_size: f32) -> Result<f32, WatermarkError> {
        measure_text(text, font_size)
    }

    /// Fill `rect` with `color`. Pixels whose centers fall inside the
    /// rectangle are painted; the rest of the rectangle is clipped.
    pub fn fill_rect(&mut self, rect: &Rect, color: RgbaColor) {
        let x_start = rect.x.round().max(0.0) as u32;
        let y_start = rect.y.round().max(0.0) as u32;
        let x_end = (rect.x + rect.width).round().clamp(0.0, self.width() as f32) as u32;
        let y_end = (rect.y + rect.height).round().clamp(0.0, self.height() as f32) as u32;

        let fill = color.to_pixel();
        for y in y_start..y_end {
            for x in x_start..x_end {
                let existing = *self.pixels.get_pixel(x, y);
                self.pixels.put_pixel(x, y, blend_pixels(existing, fill, 1.0));
            }
        }
    }

    /// Paint `text` with its left-baseline origin at `(x, y)`.
    pub fn fill_text(
        &mut self,
        text: &str,
        font_size: f32,
        x: f32,
        y: f32,
        color: RgbaColor,
    ) -> Result<(), WatermarkError> {
        let clip = self.pixels.dimensions();
        let width = clip.0 as i32;
        let height = clip.1 as i32;
        let fill = color.to_pixel();
        let pixels = &mut self.pixels;

        rasterize_text(text, font_size, x, y, clip, |px, py, coverage| {
            if px < 0 || py < 0 || px >= width || py >= height {
                return;
            }
            let existing = *pixels.get_pixel(px as u32, py as u32);
            pixels.put_pixel(
                px as u32,
                py as u32,
                blend_pixels(existing, fill, coverage),
            );
        })
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }
}

/// Blend `foreground` over `background`, scaling the foreground alpha by
/// `coverage`.
fn blend_pixels(background: Rgba<u8>, foreground: Rgba<u8>, coverage: f32) -> Rgba<u8> {
    let fg_alpha = (foreground[3] as f32 / 255.0) * coverage.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;

    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let blend_channel = |fg: u8, bg: u8| -> u8 {
        let fg_f = fg as f32 / 255.0;
        let bg_f = bg as f32 / 255.0;
        let result = (fg_f * fg_alpha + bg_f * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(foreground[0], background[0]),
        blend_channel(foreground[1], background[1]),
        blend_channel(foreground[2], background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}
