use crate::{ReelError, Result, BASIC_ASCII_RAMP, DETAILED_ASCII_RAMP};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Rendering quality level.
///
/// `Basic` is the plain path: luma only, area-averaged downscale and a short
/// glyph ramp. `High` adds gamma correction, histogram equalization, a 3x3
/// Gaussian blur after the downscale and a 70-level ramp.
#[derive(clap::ValueEnum, Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    /// Fast path with a short ramp
    Basic,
    /// Enhanced contrast, softened edges, detailed ramp
    #[default]
    High,
}

impl Quality {
    /// Height correction for the roughly 2:1 glyph cell
    pub fn correction_factor(self) -> f64 {
        match self {
            Quality::Basic => 0.5,
            Quality::High => 0.55,
        }
    }

    pub fn blur(self) -> bool {
        matches!(self, Quality::High)
    }

    pub fn enhance(self) -> bool {
        matches!(self, Quality::High)
    }

    /// Default glyph ramp, fullest glyph first
    pub fn default_ramp(self) -> &'static str {
        match self {
            Quality::Basic => BASIC_ASCII_RAMP,
            Quality::High => DETAILED_ASCII_RAMP,
        }
    }
}

/// Per-session playback settings. Never mutated once a scheduler owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Output width in characters
    pub width: u16,
    /// FPS cap, 0 means uncapped (paced by the native delay alone)
    pub fps_cap: f64,
    /// Wrap glyphs in true-color escapes sampled from the source frame
    pub color: bool,
    pub quality: Quality,
    /// Gamma exponent used by the enhancer
    pub gamma: f64,
    /// Custom grayscale ramp, fullest glyph first
    pub ramp: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            width: 120,
            fps_cap: 30.0,
            color: false,
            quality: Quality::High,
            gamma: 1.8,
            ramp: None,
        }
    }
}

impl PlaybackConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PlaybackConfig = serde_json::from_str(&content)?;
        debug!("Loaded config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Check the caller preconditions the pipeline relies on
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 {
            return Err(ReelError::InvalidConfig("Width must be greater than 0".to_string()));
        }
        if !self.fps_cap.is_finite() || self.fps_cap < 0.0 {
            return Err(ReelError::InvalidConfig(
                "FPS cap must be a non-negative number".to_string(),
            ));
        }
        if self.fps_cap > 0.0 && Duration::try_from_secs_f64(1.0 / self.fps_cap).is_err() {
            return Err(ReelError::InvalidConfig(format!(
                "FPS cap {} is too small to pace frames",
                self.fps_cap
            )));
        }
        if !self.gamma.is_finite() || self.gamma <= 0.0 {
            return Err(ReelError::InvalidConfig("Gamma must be greater than 0".to_string()));
        }
        if let Some(ramp) = &self.ramp {
            if ramp.is_empty() {
                return Err(ReelError::InvalidConfig("Glyph ramp cannot be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Ramp used in grayscale mode
    pub fn glyph_ramp(&self) -> &str {
        self.ramp.as_deref().unwrap_or_else(|| self.quality.default_ramp())
    }
}

/// Frame pacing derived once per opened source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    native_delay: Duration,
    effective_delay: Duration,
}

impl FrameTiming {
    /// Effective delay is the larger of the native delay and `1 / fps_cap`;
    /// a cap of 0 leaves the native delay alone. A cap whose interval does
    /// not fit a `Duration` saturates to `Duration::MAX`.
    pub fn new(native_delay: Duration, fps_cap: f64) -> Self {
        let effective_delay = if fps_cap > 0.0 {
            let cap_delay = Duration::try_from_secs_f64(1.0 / fps_cap).unwrap_or(Duration::MAX);
            native_delay.max(cap_delay)
        } else {
            native_delay
        };
        Self {
            native_delay,
            effective_delay,
        }
    }

    pub fn native_delay(&self) -> Duration {
        self.native_delay
    }

    pub fn effective_delay(&self) -> Duration {
        self.effective_delay
    }

    /// Sleep budget left after `elapsed` processing time
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.effective_delay.saturating_sub(elapsed)
    }
}
