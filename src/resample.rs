use crate::decoder::{PixelFormat, RasterFrame};
use crate::{ReelError, Result};
use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer as FirResizer};
use image::{imageops, GrayImage, ImageBuffer, Pixel, RgbImage};
use log::trace;

/// `[1 2 1] x [1 2 1] / 16`
const GAUSSIAN_3X3: [f32; 9] = [
    1.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
    2.0 / 16.0,
    4.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
    2.0 / 16.0,
    1.0 / 16.0,
];

/// Downsizes frames to the character grid.
///
/// The output height compensates for glyph cells being roughly twice as
/// tall as they are wide. A box convolution averages every source pixel
/// that falls under a destination pixel. The resizer and its scratch buffer
/// are reused across frames.
pub struct Resampler {
    inner: FirResizer,
    options: ResizeOptions,
    src_buf: Vec<u8>,
    correction_factor: f64,
    blur: bool,
}

impl Resampler {
    pub fn new(correction_factor: f64, blur: bool) -> Self {
        Self {
            inner: FirResizer::new(),
            options: ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Box)),
            src_buf: Vec::new(),
            correction_factor,
            blur,
        }
    }

    /// `(width, round(width * src_height / src_width * correction))`,
    /// never smaller than 1x1
    pub fn target_dimensions(&self, src_width: u32, src_height: u32, target_width: u32) -> (u32, u32) {
        let aspect_ratio = src_height as f64 / src_width as f64;
        let height = (target_width as f64 * aspect_ratio * self.correction_factor).round();
        (target_width.max(1), (height as u32).max(1))
    }

    pub fn resize(&mut self, frame: &RasterFrame, target_width: u32) -> Result<RasterFrame> {
        let (width, height) = self.target_dimensions(frame.width(), frame.height(), target_width);
        trace!(
            "Resampling {}x{} -> {}x{}",
            frame.width(),
            frame.height(),
            width,
            height
        );

        let mut data = self.area_resize(frame, width, height)?;
        if self.blur {
            data = gaussian_blur_3x3(data, width, height, frame.format())?;
        }

        Ok(RasterFrame::derived(width, height, frame.format(), data).with_frame_number(frame.frame_number))
    }

    fn area_resize(&mut self, frame: &RasterFrame, width: u32, height: u32) -> Result<Vec<u8>> {
        if (frame.width(), frame.height()) == (width, height) {
            return Ok(frame.data().to_vec());
        }

        let pixel_type = match frame.format() {
            PixelFormat::Gray => PixelType::U8,
            PixelFormat::Rgb => PixelType::U8x3,
        };

        // The source view needs a mutable buffer
        self.src_buf.clear();
        self.src_buf.extend_from_slice(frame.data());

        let src_image = Image::from_slice_u8(frame.width(), frame.height(), &mut self.src_buf, pixel_type)
            .map_err(|e| ReelError::Resize(format!("source buffer: {}", e)))?;

        let mut data = vec![0u8; width as usize * height as usize * frame.format().channels()];
        {
            let mut dst_image = Image::from_slice_u8(width, height, &mut data, pixel_type)
                .map_err(|e| ReelError::Resize(format!("destination buffer: {}", e)))?;

            self.inner
                .resize(&src_image, &mut dst_image, Some(&self.options))
                .map_err(|e| ReelError::Resize(e.to_string()))?;
        }

        Ok(data)
    }
}

/// Reflect-101 border: -1 -> 1, len -> len - 2
fn reflect(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let last = len as isize - 1;
    let reflected = if index < 0 {
        -index
    } else if index > last {
        2 * last - index
    } else {
        index
    };
    reflected.clamp(0, last) as usize
}

fn gaussian_blur_3x3(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Vec<u8>> {
    let mismatch = || ReelError::Resize(format!("blur buffer does not match {}x{}", width, height));
    match format {
        PixelFormat::Gray => GrayImage::from_raw(width, height, data)
            .map(|image| blur_padded(&image))
            .ok_or_else(mismatch),
        PixelFormat::Rgb => RgbImage::from_raw(width, height, data)
            .map(|image| blur_padded(&image))
            .ok_or_else(mismatch),
    }
}

/// `filter3x3` leaves the outermost ring untouched, so the image is padded
/// by one reflected pixel on every side and cropped back afterwards.
fn blur_padded<P>(image: &ImageBuffer<P, Vec<u8>>) -> Vec<u8>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = image.dimensions();
    let padded = ImageBuffer::from_fn(width + 2, height + 2, |x, y| {
        let sx = reflect(x as isize - 1, width as usize) as u32;
        let sy = reflect(y as isize - 1, height as usize) as u32;
        *image.get_pixel(sx, sy)
    });
    let blurred = imageops::filter3x3(&padded, &GAUSSIAN_3X3);
    imageops::crop_imm(&blurred, 1, 1, width, height).to_image().into_raw()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_dimensions_follow_aspect() {
        let resampler = Resampler::new(0.5, false);
        assert_eq!(resampler.target_dimensions(200, 100, 100), (100, 25));

        let resampler = Resampler::new(0.55, true);
        assert_eq!(resampler.target_dimensions(100, 50, 20), (20, 6));
    }

    #[test]
    fn test_target_height_within_rounding() {
        for factor in [0.5, 0.55] {
            let resampler = Resampler::new(factor, false);
            for (w, h) in [(1, 1), (7, 3), (100, 50), (640, 480), (1920, 1080), (31, 977)] {
                for target in [1u32, 20, 80, 120, 333] {
                    let expected = (target as f64 * h as f64 / w as f64 * factor).round();
                    let (_, height) = resampler.target_dimensions(w, h, target);
                    assert!((height as f64 - expected.max(1.0)).abs() <= 1.0);
                }
            }
        }
    }

    #[test]
    fn test_area_average_of_blocks() {
        // Left half black, right half white
        let data = (0..4 * 2).map(|i| if i % 4 < 2 { 0 } else { 255 }).collect();
        let frame = RasterFrame::gray(4, 2, data).unwrap();
        let out = Resampler::new(1.0, false).resize(&frame, 2).unwrap();
        assert_eq!((out.width(), out.height()), (2, 1));
        assert_eq!(out.data(), &[0, 255]);
    }

    #[test]
    fn test_area_average_mixes_pixels() {
        let frame = RasterFrame::gray(2, 2, vec![0, 100, 200, 100]).unwrap();
        let out = Resampler::new(1.0, false).resize(&frame, 1).unwrap();
        assert_eq!(out.data(), &[100]);
    }

    #[test]
    fn test_uniform_frame_stays_uniform() {
        let frame = RasterFrame::solid(97, 41, (12, 200, 99)).unwrap();
        let out = Resampler::new(0.55, true).resize(&frame, 20).unwrap();
        assert_eq!(out.format(), PixelFormat::Rgb);
        for px in out.data().chunks(3) {
            assert!(px[0].abs_diff(12) <= 1);
            assert!(px[1].abs_diff(200) <= 1);
            assert!(px[2].abs_diff(99) <= 1);
        }
    }

    #[test]
    fn test_resampler_is_reusable_across_sizes() {
        let mut resampler = Resampler::new(0.5, true);
        let small = resampler
            .resize(&RasterFrame::solid(40, 20, (0, 0, 0)).unwrap(), 10)
            .unwrap();
        let large = resampler
            .resize(&RasterFrame::solid(640, 480, (255, 255, 255)).unwrap(), 80)
            .unwrap();
        assert_eq!((small.width(), small.height()), (10, 3));
        assert_eq!((large.width(), large.height()), (80, 30));
        assert!(small.data().iter().all(|&v| v == 0));
        assert!(large.data().iter().all(|&v| v >= 254));
    }

    #[test]
    fn test_upscale_is_supported() {
        let frame = RasterFrame::gray(2, 2, vec![10, 20, 30, 40]).unwrap();
        let out = Resampler::new(1.0, false).resize(&frame, 4).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
        assert!(out.data()[0] < out.data()[15]);
    }

    #[test]
    fn test_blur_softens_single_spike() {
        let mut data = vec![0u8; 25];
        data[12] = 160;
        let blurred = gaussian_blur_3x3(data, 5, 5, PixelFormat::Gray).unwrap();
        assert_eq!(blurred[12], 40);
        assert_eq!(blurred[7], 20);
        assert_eq!(blurred[6], 10);
        assert_eq!(blurred[0], 0);
    }

    #[test]
    fn test_blur_keeps_borders() {
        // A flat frame must come back flat, edges included
        let blurred = gaussian_blur_3x3(vec![90u8; 4 * 3 * 3], 4, 3, PixelFormat::Rgb).unwrap();
        assert!(blurred.iter().all(|&v| v == 90));
    }

    #[test]
    fn test_reflect_border() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(2, 5), 2);
        assert_eq!(reflect(-1, 1), 0);
    }
}
