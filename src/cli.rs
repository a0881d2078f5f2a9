use crate::config::{PlaybackConfig, Quality};
use crate::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the video or animated GIF to play
    #[arg(required = true)]
    pub file_path: PathBuf,

    /// Output width in characters
    #[arg(short, long)]
    pub width: Option<u16>,

    /// Frame rate cap (0 = follow the source's native rate only)
    #[arg(short, long)]
    pub fps: Option<f64>,

    /// Enable true-color output
    #[arg(short, long)]
    pub color: bool,

    /// Rendering quality
    #[arg(short, long, value_enum)]
    pub quality: Option<Quality>,

    /// Gamma exponent applied before equalization
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Custom glyph ramp, fullest glyph first
    #[arg(long, value_name = "GLYPHS")]
    pub ramp: Option<String>,

    /// JSON file with playback settings; flags take precedence
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Show source information only (don't play)
    #[arg(long)]
    pub info: bool,
}

impl Cli {
    /// Validate command line arguments
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.file_path.exists() {
            return Err(format!("Media file does not exist: {}", self.file_path.display()));
        }

        if let Some(width) = self.width {
            if width == 0 {
                return Err("Width must be greater than 0".to_string());
            }
        }

        if let Some(fps) = self.fps {
            if !fps.is_finite() || fps < 0.0 {
                return Err("FPS cap must be 0 or greater".to_string());
            }
            if fps > 0.0 && Duration::try_from_secs_f64(1.0 / fps).is_err() {
                return Err(format!("FPS cap {} is too small to pace frames", fps));
            }
        }

        if let Some(gamma) = self.gamma {
            if !gamma.is_finite() || gamma <= 0.0 {
                return Err("Gamma must be greater than 0".to_string());
            }
        }

        if let Some(config) = &self.config {
            if !config.exists() {
                return Err(format!("Config file does not exist: {}", config.display()));
            }
        }

        Ok(())
    }

    /// Merge the config file (if any) with the flags
    pub fn playback_config(&self) -> Result<PlaybackConfig> {
        let mut config = match &self.config {
            Some(path) => PlaybackConfig::from_json_file(path)?,
            None => PlaybackConfig::default(),
        };

        if let Some(width) = self.width {
            config.width = width;
        }
        if let Some(fps) = self.fps {
            config.fps_cap = fps;
        }
        if self.color {
            config.color = true;
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(gamma) = self.gamma {
            config.gamma = gamma;
        }
        if let Some(ramp) = &self.ramp {
            config.ramp = Some(ramp.clone());
        }

        config.validate()?;
        Ok(config)
    }
}
