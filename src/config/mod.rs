// Configuration module

use regex::Regex;
use serde::de::IgnoredAny;
use serde::Deserialize;
use std::path::Path;

use crate::watermark::encoder::DEFAULT_JPEG_QUALITY;
use crate::watermark::WatermarkError;

fn default_font_size() -> f32 {
    24.0
}

fn default_color() -> String {
    "#FFFFFF".to_string()
}

fn default_opacity() -> f32 {
    0.8
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

fn default_max_source_bytes() -> usize {
    50 * 1024 * 1024
}

/// Where the watermark goes.
///
/// An integer is a grid index, a `{x, y}` map is a percentage point.
/// Anything else (a fractional index, a string, a map missing a
/// coordinate) places the text bottom-right.
///
/// ```yaml
/// position: 8             # bottom-right
/// position: {x: 50, y: 90}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "RawPosition")]
pub enum Position {
    /// Grid index 0..=8 (row-major, top-left first). Out-of-range indices
    /// place the text bottom-right.
    Grid(i32),
    /// Percentages of the image width/height, nominally 0..=100. Not clamped.
    Percentage { x: f32, y: f32 },
}

/// Wire shapes accepted for `position`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawPosition {
    Index(i64),
    Fractional(f64),
    Point { x: f32, y: f32 },
    Other(IgnoredAny),
}

impl From<RawPosition> for Position {
    fn from(raw: RawPosition) -> Self {
        match raw {
            RawPosition::Index(index) => Position::Grid(i32::try_from(index).unwrap_or(8)),
            // 4.0 is index 4; 2.5 is not an index
            RawPosition::Fractional(value)
                if value.fract() == 0.0 && value >= i32::MIN as f64 && value <= i32::MAX as f64 =>
            {
                Position::Grid(value as i32)
            }
            RawPosition::Fractional(_) | RawPosition::Other(_) => Position::Grid(8),
            RawPosition::Point { x, y } => Position::Percentage { x, y },
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::Grid(8)
    }
}

impl Position {
    /// Line height as a multiple of the font size.
    pub fn line_height_factor(&self) -> f32 {
        match self {
            Position::Grid(_) => 1.2,
            Position::Percentage { .. } => 1.0,
        }
    }

    pub fn is_grid(&self) -> bool {
        matches!(self, Position::Grid(_))
    }
}

/// Caller-supplied watermark style.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatermarkSettings {
    /// Font size in pixels (default: 24)
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Text color as `#RRGGBB`, the `#` is optional (default: "#FFFFFF")
    #[serde(default = "default_color")]
    pub color: String,

    /// Opacity from 0.0 (transparent) to 1.0 (opaque) (default: 0.8)
    #[serde(default = "default_opacity")]
    pub opacity: f32,

    /// Grid index or percentage point (default: grid 8, bottom-right)
    #[serde(default)]
    pub position: Position,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            font_size: default_font_size(),
            color: default_color(),
            opacity: default_opacity(),
            position: Position::default(),
        }
    }
}

impl WatermarkSettings {
    /// Parse settings from a JSON object such as
    /// `{"font_size": 32, "color": "#FF0000", "opacity": 0.5, "position": 4}`.
    pub fn from_json(json: &str) -> Result<Self, WatermarkError> {
        serde_json::from_str(json)
            .map_err(|e| WatermarkError::config(format!("Invalid watermark settings: {}", e)))
    }

    /// Validate the settings.
    ///
    /// Out-of-range grid indices and percentages outside 0..=100 are
    /// accepted: placement defines what they do.
    pub fn validate(&self) -> Result<(), WatermarkError> {
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(WatermarkError::config(format!(
                "font_size must be a positive number, got {}",
                self.font_size
            )));
        }

        if !self.opacity.is_finite() || !(0.0..=1.0).contains(&self.opacity) {
            return Err(WatermarkError::config(format!(
                "opacity must be a finite value between 0.0 and 1.0, got {}",
                self.opacity
            )));
        }

        let digits = self.color.strip_prefix('#').unwrap_or(&self.color);
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WatermarkError::config(format!(
                "color must be in #RRGGBB format, got '{}'",
                self.color
            )));
        }

        if let Position::Percentage { x, y } = self.position {
            if !x.is_finite() || !y.is_finite() {
                return Err(WatermarkError::config(format!(
                    "position percentages must be finite, got ({}, {})",
                    x, y
                )));
            }
        }

        Ok(())
    }
}

/// Renderer tuning that is not part of the watermark style.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RendererConfig {
    /// Timeout for fetching URL sources in seconds (default: 30)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// JPEG output quality 1-100 (default: 92)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Largest accepted encoded source in bytes (default: 50 MiB)
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            jpeg_quality: default_jpeg_quality(),
            max_source_bytes: default_max_source_bytes(),
        }
    }
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), WatermarkError> {
        if self.fetch_timeout_secs == 0 {
            return Err(WatermarkError::config("fetch_timeout_secs must be > 0"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(WatermarkError::config(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_source_bytes == 0 {
            return Err(WatermarkError::config("max_source_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Top-level configuration file.
///
/// ```yaml
/// watermark:
///   font_size: 32
///   color: "${WATERMARK_COLOR}"
///   opacity: 0.6
///   position: {x: 50, y: 95}
/// renderer:
///   jpeg_quality: 85
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watermark: WatermarkSettings,
    #[serde(default)]
    pub renderer: RendererConfig,
}

impl Config {
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, WatermarkError> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| WatermarkError::config(e.to_string()))?;

        // Check that all referenced environment variables exist first
        let mut missing = None;
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| {
                missing.get_or_insert_with(|| var_name.to_string());
                String::new()
            })
        });

        if let Some(var_name) = missing {
            return Err(WatermarkError::config(format!(
                "Environment variable '{}' is referenced but not set",
                var_name
            )));
        }

        serde_yaml::from_str(&substituted).map_err(|e| WatermarkError::config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WatermarkError> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| WatermarkError::config(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_yaml_with_env(&yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), WatermarkError> {
        self.watermark.validate()?;
        self.renderer.validate()
    }
}
