// THEORY:
// Every tunable of the engine lives in one plain value, `FireConfig`. It is
// built once, validated once, and handed to the pipeline at construction. A
// running stream can swap it for another validated value, but only between
// two ticks; no stage ever reads a half-replaced configuration.

use crate::error::FireError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest hue value on the 8-bit HSV scale (degrees / 2).
pub const MAX_HUE: u8 = 180;

/// COCO class id of "person".
pub const COCO_PERSON_CLASS_ID: usize = 0;

/// A named, inclusive band in 8-bit HSV space (hue 0..=180, saturation and value 0..=255).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorRange {
    pub name: String,
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(name: &str, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            name: name.to_string(),
            lower,
            upper,
        }
    }

    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }

    /// The red/orange, yellow and bright white/yellow bands whose union is "fire-colored".
    pub fn default_fire_table() -> Vec<ColorRange> {
        vec![
            ColorRange::new("red_orange", [0, 30, 180], [15, 255, 255]),
            ColorRange::new("yellow", [16, 50, 180], [35, 255, 255]),
            ColorRange::new("bright_white_yellow", [0, 0, 200], [180, 80, 255]),
        ]
    }
}

/// Configuration for the fire pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FireConfig {
    /// Minimum detector confidence (0..=1) for a box to be considered.
    pub confidence_threshold: f32,
    /// Consecutive positive ticks needed to raise the alert.
    pub fire_debounce_frames: u32,
    /// Consecutive negative ticks needed to clear the alert. Must exceed `fire_debounce_frames`.
    pub clear_debounce_frames: u32,
    /// Minimum time between two successful notifications.
    pub notify_cooldown_secs: f64,
    /// Contours with an area at or below this value (px²) are noise.
    pub min_candidate_area: f64,
    /// Open interval of accepted width/height ratios for flame candidates.
    pub aspect_ratio_bounds: (f64, f64),
    /// Gray-level difference above which a pixel counts as moving.
    pub motion_threshold: u8,
    /// Square input resolution requested from the detector.
    pub inference_size: u32,
    /// Detector classes that never count as fire evidence.
    pub excluded_classes: Vec<usize>,
    /// Ordered HSV table; a pixel in any band is fire-colored.
    pub color_ranges: Vec<ColorRange>,
}

impl Default for FireConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            fire_debounce_frames: 3,
            clear_debounce_frames: 20,
            notify_cooldown_secs: 30.0,
            min_candidate_area: 200.0,
            aspect_ratio_bounds: (0.15, 1.5),
            motion_threshold: 25,
            inference_size: 256,
            excluded_classes: vec![COCO_PERSON_CLASS_ID],
            color_ranges: ColorRange::default_fire_table(),
        }
    }
}

impl FireConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), FireError> {
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(FireError::Config(
                "Confidence threshold must be between 0 and 1".to_string(),
            ));
        }

        if self.fire_debounce_frames == 0 || self.clear_debounce_frames == 0 {
            return Err(FireError::Config(
                "Debounce frame counts must be non-zero".to_string(),
            ));
        }

        if self.clear_debounce_frames <= self.fire_debounce_frames {
            return Err(FireError::Config(format!(
                "Clear debounce ({}) must be larger than fire debounce ({})",
                self.clear_debounce_frames, self.fire_debounce_frames
            )));
        }

        if Duration::try_from_secs_f64(self.notify_cooldown_secs).is_err() {
            return Err(FireError::Config(format!(
                "Notification cooldown must be a non-negative number of seconds, got {}",
                self.notify_cooldown_secs
            )));
        }

        if !self.min_candidate_area.is_finite() || self.min_candidate_area < 0.0 {
            return Err(FireError::Config(
                "Minimum candidate area must be non-negative".to_string(),
            ));
        }

        let (low, high) = self.aspect_ratio_bounds;
        if !low.is_finite() || !high.is_finite() || low <= 0.0 || low >= high {
            return Err(FireError::Config(format!(
                "Aspect ratio bounds must satisfy 0 < low < high, got ({}, {})",
                low, high
            )));
        }

        if self.inference_size == 0 {
            return Err(FireError::Config(
                "Inference size must be non-zero".to_string(),
            ));
        }

        if self.color_ranges.is_empty() {
            return Err(FireError::Config(
                "Color range table must not be empty".to_string(),
            ));
        }

        for range in &self.color_ranges {
            if range.lower[0] > MAX_HUE || range.upper[0] > MAX_HUE {
                return Err(FireError::Config(format!(
                    "Color range '{}' has a hue above {}",
                    range.name, MAX_HUE
                )));
            }
            if (0..3).any(|i| range.lower[i] > range.upper[i]) {
                return Err(FireError::Config(format!(
                    "Color range '{}' has a lower bound above its upper bound",
                    range.name
                )));
            }
        }

        Ok(())
    }

    /// Parses a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, FireError> {
        let config: FireConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, FireError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Cooldown as a `Duration`. Saturates for values `validate` would reject.
    pub fn notify_cooldown(&self) -> Duration {
        Duration::try_from_secs_f64(self.notify_cooldown_secs).unwrap_or(Duration::MAX)
    }

    pub fn is_excluded(&self, class_id: usize) -> bool {
        self.excluded_classes.contains(&class_id)
    }
}
