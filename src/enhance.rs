use crate::decoder::{PixelFormat, RasterFrame};
use log::trace;

/// Converts frames to intensity and widens their contrast before downscaling.
///
/// Steps run in order: BT.601 luma, gamma correction through a 256-entry
/// lookup table, histogram equalization. A frame holding a single intensity
/// level passes through after the luma step untouched, so enhancing a flat
/// frame twice gives the same frame.
#[derive(Debug, Clone)]
pub struct ImageEnhancer {
    gamma_lut: Option<[u8; 256]>,
    equalize: bool,
}

impl ImageEnhancer {
    /// Enhancer applying `output = 255 * (input / 255)^(1 / gamma)` followed
    /// by histogram equalization
    pub fn new(gamma: f64) -> Self {
        Self {
            gamma_lut: Some(gamma_table(gamma)),
            equalize: true,
        }
    }

    /// Enhancer that only converts to intensity
    pub fn luma_only() -> Self {
        Self {
            gamma_lut: None,
            equalize: false,
        }
    }

    pub fn enhance(&self, frame: &RasterFrame) -> RasterFrame {
        let mut data = to_luma(frame);

        if is_flat(&data) {
            trace!("Flat frame {}, skipping contrast enhancement", frame.frame_number);
        } else {
            if let Some(lut) = &self.gamma_lut {
                for value in data.iter_mut() {
                    *value = lut[*value as usize];
                }
            }
            if self.equalize {
                equalize_histogram(&mut data);
            }
        }

        RasterFrame::derived(frame.width(), frame.height(), PixelFormat::Gray, data)
            .with_frame_number(frame.frame_number)
    }
}

fn to_luma(frame: &RasterFrame) -> Vec<u8> {
    match frame.format() {
        PixelFormat::Gray => frame.data().to_vec(),
        PixelFormat::Rgb => frame
            .data()
            .chunks_exact(3)
            .map(|px| luma(px[0], px[1], px[2]))
            .collect(),
    }
}

/// ITU-R BT.601 luma, the weighting most grayscale conversions use
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

/// `table[i] = 255 * (i / 255)^(1 / gamma)`, truncated
pub fn gamma_table(gamma: f64) -> [u8; 256] {
    let inv_gamma = 1.0 / gamma;
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        *entry = ((i as f64 / 255.0).powf(inv_gamma) * 255.0).clamp(0.0, 255.0) as u8;
    }
    table
}

fn is_flat(data: &[u8]) -> bool {
    match data.first() {
        Some(&first) => data.iter().all(|&v| v == first),
        None => true,
    }
}

/// Spread intensities over 0..=255 by mapping each level through the
/// cumulative histogram. The darkest occupied level maps to 0.
pub fn equalize_histogram(data: &mut [u8]) {
    let mut histogram = [0u32; 256];
    for &value in data.iter() {
        histogram[value as usize] += 1;
    }

    let total = data.len() as u32;
    let Some(lowest) = histogram.iter().position(|&count| count > 0) else {
        return;
    };
    if histogram[lowest] == total {
        return;
    }

    let scale = 255.0 / (total - histogram[lowest]) as f32;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for level in lowest + 1..256 {
        cumulative += histogram[level];
        lut[level] = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }

    for value in data.iter_mut() {
        *value = lut[*value as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> RasterFrame {
        let data = (0..width * height).map(|i| (i % 64) as u8 + 64).collect();
        RasterFrame::gray(width, height, data).unwrap()
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        assert!(luma(0, 255, 0) > luma(255, 0, 0));
        assert!(luma(255, 0, 0) > luma(0, 0, 255));
    }

    #[test]
    fn test_gamma_table_endpoints_and_lift() {
        let table = gamma_table(1.8);
        assert_eq!(table[0], 0);
        assert_eq!(table[255], 255);
        // gamma > 1 brightens midtones
        assert!(table[64] > 64);
        assert!(table.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_equalization_spans_full_range() {
        let mut data = gradient(16, 8).data().to_vec();
        equalize_histogram(&mut data);
        assert_eq!(data.iter().min(), Some(&0));
        assert_eq!(data.iter().max(), Some(&255));
    }

    #[test]
    fn test_enhance_outputs_gray_with_same_dimensions() {
        let frame = RasterFrame::solid(10, 5, (200, 10, 10)).unwrap().with_frame_number(7);
        let out = ImageEnhancer::new(1.8).enhance(&frame);
        assert_eq!(out.format(), PixelFormat::Gray);
        assert_eq!((out.width(), out.height()), (10, 5));
        assert_eq!(out.frame_number, 7);
    }

    #[test]
    fn test_flat_frame_is_stable() {
        let enhancer = ImageEnhancer::new(1.8);
        for level in [0u8, 1, 77, 128, 254, 255] {
            let flat = RasterFrame::gray(12, 6, vec![level; 72]).unwrap();
            let once = enhancer.enhance(&flat);
            let twice = enhancer.enhance(&once);
            assert_eq!(once, flat);
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn test_luma_only_keeps_levels() {
        let frame = gradient(8, 8);
        let out = ImageEnhancer::luma_only().enhance(&frame);
        assert_eq!(out.data(), frame.data());
    }
}
