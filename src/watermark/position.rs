//! Text placement for watermark rendering.
//!
//! Two placement modes are supported and kept deliberately distinct:
//!
//! - **Grid**: nine fixed anchors (top-left .. bottom-right) with a fixed
//!   edge inset, clamped so the text stays on the canvas.
//! - **Percentage**: a free point given as percentages of the image size,
//!   with no inset and no clamping. Extreme values may push the text
//!   partially or fully off the canvas.
//!
//! # Example
//!
//! ```ignore
//! use stampmark::watermark::position::{place_on_grid, ImageDimensions, TextMetrics};
//!
//! let image = ImageDimensions { width: 800, height: 600 };
//! let text = TextMetrics { width: 100.0, height: 24.0 };
//!
//! let placement = place_on_grid(8, &image, &text);
//! assert_eq!(placement.anchor_x, 730.0); // 800 - 20 - 100 / 2
//! assert_eq!(placement.baseline_y, 580.0); // 600 - 20
//! ```

/// Distance from the image edges for grid placement, in pixels.
pub const EDGE_INSET: f32 = 20.0;

/// Padding around the text for the legibility backing rectangle.
pub const BACKING_PADDING: f32 = 5.0;

/// Dimensions of the target image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDimensions {
    pub width: u32,
    pub height: u32,
}

/// Rendered size of the watermark text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMetrics {
    /// Advance width in pixels.
    pub width: f32,
    /// Line height in pixels, derived from the font size.
    pub height: f32,
}

/// Where the text ends up on the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPlacement {
    /// Horizontal reference point computed by the placement mode. For grid
    /// placement this is the text's horizontal center.
    pub anchor_x: f32,
    /// Baseline of the text.
    pub baseline_y: f32,
    /// Left edge of the text, the x of the left-baseline drawing origin.
    pub origin_x: f32,
}

/// Axis-aligned rectangle in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The nine grid anchors, indexed 0..=8 in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAnchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl GridAnchor {
    pub const ALL: [GridAnchor; 9] = [
        GridAnchor::TopLeft,
        GridAnchor::TopCenter,
        GridAnchor::TopRight,
        GridAnchor::CenterLeft,
        GridAnchor::Center,
        GridAnchor::CenterRight,
        GridAnchor::BottomLeft,
        GridAnchor::BottomCenter,
        GridAnchor::BottomRight,
    ];

    /// Look up an anchor by grid index. Anything outside 0..=8 falls back to
    /// bottom-right.
    pub fn from_index(index: i32) -> Self {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .unwrap_or(GridAnchor::BottomRight)
    }

    /// Fractional position of the anchor as `(fx, fy)` in `{0, 0.5, 1}`.
    pub fn fractions(self) -> (f32, f32) {
        match self {
            GridAnchor::TopLeft => (0.0, 0.0),
            GridAnchor::TopCenter => (0.5, 0.0),
            GridAnchor::TopRight => (1.0, 0.0),
            GridAnchor::CenterLeft => (0.0, 0.5),
            GridAnchor::Center => (0.5, 0.5),
            GridAnchor::CenterRight => (1.0, 0.5),
            GridAnchor::BottomLeft => (0.0, 1.0),
            GridAnchor::BottomCenter => (0.5, 1.0),
            GridAnchor::BottomRight => (1.0, 1.0),
        }
    }
}

/// Compute grid placement for `index` (0..=8, anything else means 8).
///
/// `anchor_x` is the horizontal center of the text and is clamped into
/// `[w/2 + inset, W - w/2 - inset]`; `baseline_y` is clamped into
/// `[h/2 + inset, H - inset]`. When a range is empty the lower bound wins.
pub fn place_on_grid(index: i32, image: &ImageDimensions, text: &TextMetrics) -> TextPlacement {
    let (fx, fy) = GridAnchor::from_index(index).fractions();
    let img_w = image.width as f32;
    let img_h = image.height as f32;
    let half_w = text.width / 2.0;

    let x = if fx == 0.0 {
        EDGE_INSET + half_w
    } else if fx == 1.0 {
        img_w - EDGE_INSET - half_w
    } else {
        img_w * fx
    };

    let y = if fy == 0.0 {
        EDGE_INSET + text.height / 2.0
    } else if fy == 1.0 {
        img_h - EDGE_INSET
    } else {
        img_h * fy + text.height / 4.0
    };

    // min then max: f32::clamp would panic on an empty range
    let x = x.min(img_w - half_w - EDGE_INSET).max(half_w + EDGE_INSET);
    let y = y
        .min(img_h - EDGE_INSET)
        .max(text.height / 2.0 + EDGE_INSET);

    TextPlacement {
        anchor_x: x,
        baseline_y: y,
        origin_x: x - half_w,
    }
}

/// Compute percentage placement. `x_percent`/`y_percent` are nominally
/// 0..=100 but are not clamped.
pub fn place_by_percentage(
    x_percent: f32,
    y_percent: f32,
    image: &ImageDimensions,
    text: &TextMetrics,
) -> TextPlacement {
    let x = (x_percent / 100.0) * image.width as f32 - text.width / 2.0;
    let y = (y_percent / 100.0) * image.height as f32;

    TextPlacement {
        anchor_x: x,
        baseline_y: y,
        origin_x: x,
    }
}

/// Backing rectangle drawn behind grid-placed text, padded around the text
/// box and sitting on the baseline.
pub fn backing_rect(placement: &TextPlacement, text: &TextMetrics) -> Rect {
    Rect {
        x: placement.anchor_x - text.width / 2.0 - BACKING_PADDING,
        y: placement.baseline_y - text.height + BACKING_PADDING,
        width: text.width + BACKING_PADDING * 2.0,
        height: text.height + BACKING_PADDING,
    }
}
