//! Text watermarking for raster images.
//!
//! Stamps a single line of text (caller-supplied, or a timestamp) onto an
//! image and re-encodes it in the format family of the source.
//!
//! # Placement
//!
//! - **Grid**: indices 0..=8, row-major from top-left. 20px edge inset,
//!   clamped to stay on the canvas, with a translucent backing rectangle when
//!   the opacity is below 0.8.
//! - **Percentage**: a free `{x, y}` point in percent of the image size,
//!   unclamped, no backing rectangle.
//!
//! # Output Format
//!
//! Inferred from the source descriptor: PNG and GIF sources produce PNG,
//! WebP produces WebP, everything else produces JPEG.
//!
//! # Settings Example
//!
//! ```yaml
//! font_size: 24
//! color: "#FFFFFF"
//! opacity: 0.6
//! position: 8
//! ```

pub mod encoder;
pub mod error;
pub mod position;
pub mod renderer;
pub mod source;
pub mod surface;
pub mod template;
pub mod text_renderer;

// Re-export main types for convenience
pub use crate::config::{Position, WatermarkSettings};
pub use encoder::{infer_output_format, OutputFormat};
pub use error::WatermarkError;
pub use position::{
    place_by_percentage, place_on_grid, GridAnchor, ImageDimensions, TextMetrics, TextPlacement,
};
pub use renderer::{WatermarkRenderer, WatermarkedImage};
pub use source::{DecodedImage, ImageLoader, ImageSource};
pub use template::format_timestamp;
pub use text_renderer::{hex_to_rgba, RgbaColor};
