//! Watermark error types.
//!
//! Every failure of a render call surfaces as exactly one of these values.

use std::fmt;

/// Errors that can occur while watermarking an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkError {
    /// The image source could not be fetched, read or decoded
    DecodeError(String),

    /// Surface creation, text measurement, painting or encoding failed
    RenderError(String),

    /// Invalid configuration or settings
    ConfigError(String),
}

impl WatermarkError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::DecodeError(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::RenderError(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Whether this error came from loading the source image.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::DecodeError(_))
    }
}

impl fmt::Display for WatermarkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DecodeError(msg) => write!(f, "Failed to load source image: {}", msg),
            Self::RenderError(msg) => write!(f, "Failed to render watermark: {}", msg),
            Self::ConfigError(msg) => write!(f, "Watermark configuration error: {}", msg),
        }
    }
}

impl std::error::Error for WatermarkError {}
