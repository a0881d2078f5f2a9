// Re-export commonly used types for convenience
pub use crate::cli::Cli;
pub use crate::config::{FrameTiming, PlaybackConfig, Quality};
pub use crate::converter::{AsciiFrame, ColorBucket, FrameConverter, GlyphRamp, ToneMapper};
pub use crate::decoder::{open_source, AnimatedImageSource, FrameSource, MemorySource, PixelFormat, RasterFrame};
pub use crate::enhance::ImageEnhancer;
pub use crate::renderer::{Renderer, TextBlock};
pub use crate::resample::Resampler;
pub use crate::scheduler::{PlaybackScheduler, PlaybackState, PlaybackSummary};
pub use crate::ReelError;

// Re-export external types commonly used in tests
pub use anyhow::Result;
pub use std::path::Path;
pub use std::time::Duration;
