use crate::config::PlaybackConfig;
use crate::decoder::RasterFrame;
use crate::enhance::ImageEnhancer;
use crate::resample::Resampler;
use crate::{ReelError, Result, COLOR_BUCKETS};
use log::debug;

/// Represents an ASCII frame with characters and optional colors
#[derive(Debug, Clone, PartialEq)]
pub struct AsciiFrame {
    /// Glyph for each cell, row-major
    pub characters: Vec<char>,
    /// Foreground color for each cell in color mode
    pub fg_colors: Option<Vec<(u8, u8, u8)>>,
    /// Frame width in characters
    pub width: u32,
    /// Frame height in characters
    pub height: u32,
    /// Frame number in the source
    pub frame_number: u64,
}

/// Ordered glyph alphabet, visually fullest glyph first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: Vec<char>,
}

impl GlyphRamp {
    pub fn new(glyphs: &str) -> Result<Self> {
        let glyphs: Vec<char> = glyphs.chars().collect();
        if glyphs.is_empty() {
            return Err(ReelError::InvalidConfig("Glyph ramp cannot be empty".to_string()));
        }
        Ok(Self { glyphs })
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    /// `floor(intensity / 255 * (len - 1))`
    pub fn index_for(&self, intensity: u8) -> usize {
        intensity as usize * (self.glyphs.len() - 1) / 255
    }

    pub fn glyph_for(&self, intensity: u8) -> char {
        self.glyphs[self.index_for(intensity)]
    }
}

/// A glyph paired with the brightness it stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorBucket {
    pub glyph: char,
    pub threshold: u8,
}

impl ColorBucket {
    /// Default buckets, darkest first
    pub fn defaults() -> Vec<ColorBucket> {
        COLOR_BUCKETS
            .iter()
            .map(|&(glyph, threshold)| ColorBucket { glyph, threshold })
            .collect()
    }
}

#[derive(Debug, Clone)]
enum ToneMode {
    Ramp(GlyphRamp),
    Buckets(Vec<ColorBucket>),
}

/// Maps resampled cells to glyphs.
///
/// In ramp mode the cell intensity indexes the glyph ramp. In bucket mode
/// the color is sampled from the full-resolution source frame at the
/// matching position and the first bucket whose threshold is at or above
/// its brightness wins; a brightness past every threshold maps to a space.
#[derive(Debug, Clone)]
pub struct ToneMapper {
    mode: ToneMode,
}

impl ToneMapper {
    pub fn grayscale(ramp: GlyphRamp) -> Self {
        Self {
            mode: ToneMode::Ramp(ramp),
        }
    }

    pub fn color(buckets: Vec<ColorBucket>) -> Result<Self> {
        if buckets.is_empty() {
            return Err(ReelError::InvalidConfig("Color bucket list cannot be empty".to_string()));
        }
        Ok(Self {
            mode: ToneMode::Buckets(buckets),
        })
    }

    pub fn is_color(&self) -> bool {
        matches!(self.mode, ToneMode::Buckets(_))
    }

    /// Glyph for a color brightness, scanning buckets darkest first
    pub fn bucket_glyph(buckets: &[ColorBucket], brightness: f32) -> char {
        buckets
            .iter()
            .find(|bucket| brightness <= bucket.threshold as f32)
            .map(|bucket| bucket.glyph)
            .unwrap_or(' ')
    }

    /// Map every cell of `small` to a glyph; `original` provides colors
    pub fn map(&self, small: &RasterFrame, original: &RasterFrame) -> AsciiFrame {
        match &self.mode {
            ToneMode::Ramp(ramp) => Self::ramp_cells(ramp, small, original.frame_number),
            ToneMode::Buckets(buckets) => {
                Self::bucket_cells(buckets, small.width(), small.height(), original)
            }
        }
    }

    /// Bucket mode only needs the grid size, not a resampled frame.
    /// Returns `None` in ramp mode.
    pub fn map_colors(&self, cols: u32, rows: u32, original: &RasterFrame) -> Option<AsciiFrame> {
        match &self.mode {
            ToneMode::Ramp(_) => None,
            ToneMode::Buckets(buckets) => Some(Self::bucket_cells(buckets, cols, rows, original)),
        }
    }

    fn ramp_cells(ramp: &GlyphRamp, small: &RasterFrame, frame_number: u64) -> AsciiFrame {
        let (cols, rows) = (small.width(), small.height());
        let mut characters = Vec::with_capacity(cols as usize * rows as usize);
        for y in 0..rows {
            for x in 0..cols {
                let (intensity, _, _) = small.rgb_at(x, y);
                characters.push(ramp.glyph_for(intensity));
            }
        }

        AsciiFrame {
            characters,
            fg_colors: None,
            width: cols,
            height: rows,
            frame_number,
        }
    }

    /// Nearest back-mapping: cell `(x, y)` samples `original` at
    /// `(x * w / cols, y * h / rows)`
    fn bucket_cells(buckets: &[ColorBucket], cols: u32, rows: u32, original: &RasterFrame) -> AsciiFrame {
        let cells = cols as usize * rows as usize;
        let mut characters = Vec::with_capacity(cells);
        let mut colors = Vec::with_capacity(cells);
        for y in 0..rows {
            let orig_y = (y as u64 * original.height() as u64 / rows as u64) as u32;
            for x in 0..cols {
                let orig_x = (x as u64 * original.width() as u64 / cols as u64) as u32;
                let (r, g, b) = original.rgb_at(orig_x, orig_y);
                let brightness = (r as f32 + g as f32 + b as f32) / 3.0;
                characters.push(Self::bucket_glyph(buckets, brightness));
                colors.push((r, g, b));
            }
        }

        AsciiFrame {
            characters,
            fg_colors: Some(colors),
            width: cols,
            height: rows,
            frame_number: original.frame_number,
        }
    }
}

/// Runs enhance, resample and tone mapping for one frame
pub struct FrameConverter {
    enhancer: ImageEnhancer,
    resampler: Resampler,
    mapper: ToneMapper,
    width: u32,
}

impl FrameConverter {
    pub fn new(enhancer: ImageEnhancer, resampler: Resampler, mapper: ToneMapper, width: u16) -> Self {
        Self {
            enhancer,
            resampler,
            mapper,
            width: width as u32,
        }
    }

    /// Build the pipeline stages for a validated configuration
    pub fn from_config(config: &PlaybackConfig) -> Result<Self> {
        let quality = config.quality;
        let enhancer = if quality.enhance() {
            ImageEnhancer::new(config.gamma)
        } else {
            ImageEnhancer::luma_only()
        };
        let resampler = Resampler::new(quality.correction_factor(), quality.blur());
        let mapper = if config.color {
            ToneMapper::color(ColorBucket::defaults())?
        } else {
            ToneMapper::grayscale(GlyphRamp::new(config.glyph_ramp())?)
        };
        debug!(
            "Converter: width {}, quality {:?}, color {}",
            config.width, quality, config.color
        );
        Ok(Self::new(enhancer, resampler, mapper, config.width))
    }

    /// Grid size a `src_width` x `src_height` source renders to
    pub fn grid_size(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        self.resampler.target_dimensions(src_width, src_height, self.width)
    }

    pub fn convert(&mut self, frame: &RasterFrame) -> Result<AsciiFrame> {
        let (cols, rows) = self.grid_size(frame.width(), frame.height());
        if let Some(ascii) = self.mapper.map_colors(cols, rows, frame) {
            return Ok(ascii);
        }

        let intensity = self.enhancer.enhance(frame);
        let small = self.resampler.resize(&intensity, self.width)?;
        Ok(self.mapper.map(&small, frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Quality;
    use crate::BASIC_ASCII_RAMP;

    #[test]
    fn test_ramp_extremes() {
        let ramp = GlyphRamp::new(BASIC_ASCII_RAMP).unwrap();
        assert_eq!(ramp.glyph_for(0), '@');
        assert_eq!(ramp.glyph_for(255), ' ');
        assert_eq!(ramp.index_for(255), ramp.len() - 1);
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let ramp = GlyphRamp::new(crate::DETAILED_ASCII_RAMP).unwrap();
        let indices: Vec<usize> = (0..=255u8).map(|v| ramp.index_for(v)).collect();
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(indices[0], 0);
    }

    #[test]
    fn test_single_glyph_ramp() {
        let ramp = GlyphRamp::new("#").unwrap();
        assert_eq!(ramp.glyph_for(0), '#');
        assert_eq!(ramp.glyph_for(255), '#');
        assert!(GlyphRamp::new("").is_err());
    }

    #[test]
    fn test_bucket_first_match() {
        let buckets = ColorBucket::defaults();
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 0.0), '@');
        // Exactly on a threshold picks the darker bucket
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 70.0), '#');
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 70.5), '8');
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 200.0), 'o');
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 255.0), ' ');
    }

    #[test]
    fn test_bucket_fallback_is_space() {
        let buckets = vec![ColorBucket { glyph: '@', threshold: 10 }];
        assert_eq!(ToneMapper::bucket_glyph(&buckets, 11.0), ' ');
        assert!(ToneMapper::color(Vec::new()).is_err());
    }

    #[test]
    fn test_color_mapping_samples_original() {
        // Left column red, right column blue
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&[255, 0, 0, 255, 0, 0, 0, 0, 255, 0, 0, 255]);
        }
        let original = RasterFrame::rgb(4, 4, data).unwrap();
        let small = RasterFrame::gray(2, 2, vec![0; 4]).unwrap();

        let mapper = ToneMapper::color(ColorBucket::defaults()).unwrap();
        let frame = mapper.map(&small, &original);
        let colors = frame.fg_colors.unwrap();
        assert_eq!(colors[0], (255, 0, 0));
        assert_eq!(colors[1], (0, 0, 255));
        // brightness 85 lands in the '8' bucket
        assert_eq!(frame.characters[0], '8');
    }

    #[test]
    fn test_black_pixel_selects_darkest_bucket() {
        let original = RasterFrame::solid(3, 3, (0, 0, 0)).unwrap();
        let small = RasterFrame::gray(1, 1, vec![0]).unwrap();
        let mapper = ToneMapper::color(ColorBucket::defaults()).unwrap();
        let frame = mapper.map(&small, &original);
        assert_eq!(frame.characters, vec!['@']);
        assert_eq!(frame.fg_colors, Some(vec![(0, 0, 0)]));
    }

    #[test]
    fn test_converter_grid_size() {
        let config = PlaybackConfig {
            width: 20,
            quality: Quality::High,
            ..Default::default()
        };
        let mut converter = FrameConverter::from_config(&config).unwrap();
        let frame = RasterFrame::solid(100, 50, (128, 128, 128)).unwrap();
        let ascii = converter.convert(&frame).unwrap();
        assert_eq!((ascii.width, ascii.height), (20, 6));
        assert_eq!(ascii.characters.len(), 120);
        assert!(ascii.fg_colors.is_none());
    }

    #[test]
    fn test_black_and_white_frames() {
        let config = PlaybackConfig {
            width: 8,
            quality: Quality::Basic,
            ..Default::default()
        };
        let mut converter = FrameConverter::from_config(&config).unwrap();

        let black = converter.convert(&RasterFrame::solid(16, 16, (0, 0, 0)).unwrap()).unwrap();
        assert!(black.characters.iter().all(|&c| c == '@'));

        let white = converter
            .convert(&RasterFrame::solid(16, 16, (255, 255, 255)).unwrap())
            .unwrap();
        assert!(white.characters.iter().all(|&c| c == ' '));
    }

    #[test]
    fn test_tall_source_keeps_every_row() {
        // 70_000 rows do not fit a u16
        let config = PlaybackConfig {
            width: 1,
            quality: Quality::Basic,
            ..Default::default()
        };
        let mut converter = FrameConverter::from_config(&config).unwrap();
        let frame = RasterFrame::gray(1, 140_000, vec![0; 140_000]).unwrap();
        let ascii = converter.convert(&frame).unwrap();
        assert_eq!((ascii.width, ascii.height), (1, 70_000));
        assert_eq!(ascii.characters.len(), 70_000);
    }

    #[test]
    fn test_color_mode_matches_resampled_grid() {
        let config = PlaybackConfig {
            width: 12,
            color: true,
            ..Default::default()
        };
        let data = (0..64 * 32).flat_map(|i| [(i % 256) as u8, (i / 8 % 256) as u8, 40]).collect();
        let frame = RasterFrame::rgb(64, 32, data).unwrap();

        let mut converter = FrameConverter::from_config(&config).unwrap();
        let direct = converter.convert(&frame).unwrap();

        let mut resampler = Resampler::new(Quality::High.correction_factor(), true);
        let small = resampler
            .resize(&ImageEnhancer::new(config.gamma).enhance(&frame), 12)
            .unwrap();
        let mapper = ToneMapper::color(ColorBucket::defaults()).unwrap();
        assert_eq!(direct, mapper.map(&small, &frame));
        assert!(mapper.map_colors(12, 4, &frame).is_some());
        assert!(ToneMapper::grayscale(GlyphRamp::new("@ ").unwrap())
            .map_colors(12, 4, &frame)
            .is_none());
    }
}
