//! ASCII Reel - a looping ASCII art player for videos and animated GIFs
//!
//! Frames are pulled from a [`FrameSource`], enhanced (gamma and histogram
//! equalization), resampled to a character grid with glyph aspect
//! correction, mapped to glyphs (optionally true-color) and printed as
//! full-screen text blocks. The [`PlaybackScheduler`] paces the loop so the
//! wall-clock frame interval tracks the source's native rate while honoring
//! an FPS cap.

use std::path::PathBuf;

pub mod cli;
pub mod config;
pub mod converter;
pub mod decoder;
pub mod enhance;
pub mod prelude;
pub mod renderer;
pub mod resample;
pub mod scheduler;

pub use cli::Cli;
pub use config::{FrameTiming, PlaybackConfig, Quality};
pub use converter::{AsciiFrame, ColorBucket, FrameConverter, GlyphRamp, ToneMapper};
pub use decoder::{open_source, AnimatedImageSource, FrameSource, MemorySource, PixelFormat, RasterFrame};
#[cfg(feature = "video")]
pub use decoder::VideoSource;
pub use enhance::ImageEnhancer;
pub use renderer::{Renderer, TextBlock};
pub use resample::Resampler;
pub use scheduler::{PlaybackScheduler, PlaybackState, PlaybackSummary};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name
pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

/// Short glyph ramp, fullest glyph first
pub const BASIC_ASCII_RAMP: &str = "@%#*+=-:. ";

/// 70-level glyph ramp, fullest glyph first
pub const DETAILED_ASCII_RAMP: &str =
    "$@B%8&WM#*oahkbdpqwmZO0QLCJUYXzcvunxrjft/\\|()1{}[]?-_+~<>i!lI;:,\"^`'. ";

/// Glyph buckets used in color mode as `(glyph, representative gray level)`,
/// darkest first. The last entry must be the space.
pub const COLOR_BUCKETS: &[(char, u8)] = &[
    ('@', 0),
    ('#', 70),
    ('8', 135),
    ('o', 200),
    (' ', 255),
];

/// Error types used throughout the crate
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("Failed to open '{}': {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Frame decoding error: {0}")]
    FrameDecode(String),

    #[error("No decodable frame in a full pass over the source")]
    NoPlayableFrames,

    #[error("Failed to rewind source: {0}")]
    Rewind(String),

    #[error("No frame source is attached to the scheduler")]
    NotOpened,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("Config file error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReelError {
    /// Whether the error only concerns the current frame, so playback can
    /// move on to the next decode attempt.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, ReelError::FrameDecode(_))
    }

    pub(crate) fn open(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ReelError::Open {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, ReelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramps_end_with_space() {
        assert_eq!(BASIC_ASCII_RAMP.chars().last(), Some(' '));
        assert_eq!(DETAILED_ASCII_RAMP.chars().last(), Some(' '));
        assert_eq!(DETAILED_ASCII_RAMP.chars().count(), 70);
    }

    #[test]
    fn test_color_buckets_are_ordered() {
        assert!(COLOR_BUCKETS.windows(2).all(|w| w[0].1 < w[1].1));
        assert_eq!(COLOR_BUCKETS.last().map(|b| b.0), Some(' '));
    }

    #[test]
    fn test_frame_local_classification() {
        assert!(ReelError::FrameDecode("bad packet".into()).is_frame_local());
        assert!(!ReelError::NoPlayableFrames.is_frame_local());
        assert!(!ReelError::open("a.gif", "missing").is_frame_local());
    }

    #[test]
    fn test_open_error_message_names_path() {
        let err = ReelError::open("clip.mp4", "No such file");
        assert_eq!(err.to_string(), "Failed to open 'clip.mp4': No such file");
    }
}
