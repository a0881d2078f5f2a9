#[cfg(feature = "video")]
use ffmpeg_next as ffmpeg;
use crate::{ReelError, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, Frames, ImageDecoder};
use log::{debug, info, warn};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Fallback delay when a video stream carries no usable frame rate
pub const DEFAULT_VIDEO_DELAY: Duration = Duration::from_nanos(1_000_000_000 / 30);

/// Fallback delay when an animated image carries no frame duration
pub const DEFAULT_ANIMATION_DELAY: Duration = Duration::from_millis(100);

/// Pixel layout of a [`RasterFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// One intensity byte per pixel
    Gray,
    /// Three bytes per pixel, R G B
    Rgb,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::Rgb => 3,
        }
    }
}

/// A decoded frame or the output of one pipeline stage.
///
/// Stages never mutate their input; each one produces a new frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
    /// Position in the source, starting at 1; 0 for derived frames
    pub frame_number: u64,
}

impl RasterFrame {
    /// Wrap a pixel buffer, checking it matches the stated dimensions
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(ReelError::FrameDecode(format!(
                "Empty frame dimensions {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * format.channels();
        if data.len() != expected {
            return Err(ReelError::FrameDecode(format!(
                "Pixel buffer holds {} bytes, {}x{} {:?} needs {}",
                data.len(),
                width,
                height,
                format,
                expected
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
            frame_number: 0,
        })
    }

    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Rgb, data)
    }

    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, PixelFormat::Gray, data)
    }

    /// Frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: (u8, u8, u8)) -> Result<Self> {
        let data = [rgb.0, rgb.1, rgb.2].repeat(width as usize * height as usize);
        Self::rgb(width, height, data)
    }

    /// Stage output whose dimensions follow from an already validated frame
    pub(crate) fn derived(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * format.channels());
        Self {
            width,
            height,
            format,
            data,
            frame_number: 0,
        }
    }

    pub(crate) fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Color at `(x, y)`; gray frames repeat the intensity on all channels
    pub fn rgb_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let index = (y as usize * self.width as usize + x as usize) * self.format.channels();
        match self.format {
            PixelFormat::Gray => {
                let v = self.data[index];
                (v, v, v)
            }
            PixelFormat::Rgb => (self.data[index], self.data[index + 1], self.data[index + 2]),
        }
    }
}

/// An ordered, restartable sequence of frames with a native inter-frame delay.
///
/// `next_frame` returns `Ok(None)` at end of stream; `rewind` then restarts
/// from the first frame without reopening the container. An
/// `Err(ReelError::FrameDecode)` concerns only the current frame and the next
/// call moves on.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Option<RasterFrame>>;

    fn rewind(&mut self) -> Result<()>;

    fn native_delay(&self) -> Duration;

    /// Pixel dimensions of the decoded frames
    fn dimensions(&self) -> (u32, u32);

    /// Short human readable kind, used in logs and `--info`
    fn describe(&self) -> &'static str;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        (**self).next_frame()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }

    fn native_delay(&self) -> Duration {
        (**self).native_delay()
    }

    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn describe(&self) -> &'static str {
        (**self).describe()
    }
}

/// Open a file as a frame source, picking the variant by extension
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("gif") => Ok(Box::new(AnimatedImageSource::open(path)?)),
        _ => open_video(path),
    }
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(VideoSource::open(path)?))
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>> {
    Err(ReelError::UnsupportedFormat(format!(
        "'{}' needs video support; rebuild with the `video` feature",
        path.display()
    )))
}

/// Video decoder that extracts frames from container files through FFmpeg
#[cfg(feature = "video")]
pub struct VideoSource {
    input_context: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: Option<(ffmpeg::software::scaling::Context, ffmpeg::format::Pixel, u32, u32)>,
    native_delay: Duration,
    frame_count: u64,
    eof_sent: bool,
}

#[cfg(feature = "video")]
impl VideoSource {
    /// Open a video file and select its best video stream
    pub fn open(path: &Path) -> Result<Self> {
        if let Err(e) = ffmpeg::init() {
            // Not fatal on every platform, opening the input reports real failures
            debug!("FFmpeg init error: {:?}", e);
        }

        debug!("Attempting to open video file: {}", path.display());
        let input_context = ffmpeg::format::input(&path).map_err(|e| ReelError::open(path, e))?;

        let stream = input_context
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| ReelError::open(path, "no video stream found"))?;
        let stream_index = stream.index();

        let context_decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| ReelError::open(path, format!("codec context: {}", e)))?;
        let decoder = context_decoder
            .decoder()
            .video()
            .map_err(|e| ReelError::open(path, format!("video decoder: {}", e)))?;

        let rate = stream.avg_frame_rate();
        let native_delay = if rate.numerator() > 0 && rate.denominator() > 0 {
            Duration::from_secs_f64(rate.denominator() as f64 / rate.numerator() as f64)
        } else {
            DEFAULT_VIDEO_DELAY
        };

        info!(
            "Opened video stream {} in '{}': {}x{}, native delay {:.2}ms",
            stream_index,
            path.display(),
            decoder.width(),
            decoder.height(),
            native_delay.as_secs_f64() * 1000.0
        );

        Ok(Self {
            input_context,
            stream_index,
            decoder,
            scaler: None,
            native_delay,
            frame_count: 0,
            eof_sent: false,
        })
    }

    fn next_packet(&mut self) -> Option<ffmpeg::Packet> {
        for (stream, packet) in self.input_context.packets() {
            if stream.index() == self.stream_index {
                return Some(packet);
            }
        }
        None
    }

    /// Convert a decoded frame to tightly packed RGB24
    fn convert_frame(&mut self, frame: &ffmpeg::frame::Video) -> Result<RasterFrame> {
        let (format, width, height) = (frame.format(), frame.width(), frame.height());

        let stale = match &self.scaler {
            Some((_, f, w, h)) => (*f, *w, *h) != (format, width, height),
            None => true,
        };
        if stale {
            let context = ffmpeg::software::scaling::Context::get(
                format,
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| ReelError::FrameDecode(format!("scaling context: {}", e)))?;
            self.scaler = Some((context, format, width, height));
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Some((scaler, ..)) = self.scaler.as_mut() {
            scaler
                .run(frame, &mut rgb_frame)
                .map_err(|e| ReelError::FrameDecode(format!("scale: {}", e)))?;
        }

        // Rows may be padded past width * 3
        let stride = rgb_frame.stride(0);
        let row_bytes = width as usize * 3;
        let plane = rgb_frame.data(0);
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in plane.chunks(stride).take(height as usize) {
            data.extend_from_slice(&row[..row_bytes]);
        }

        self.frame_count += 1;
        debug!("Decoded frame {}: {}x{}", self.frame_count, width, height);
        Ok(RasterFrame::rgb(width, height, data)?.with_frame_number(self.frame_count))
    }
}

#[cfg(feature = "video")]
impl FrameSource for VideoSource {
    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert_frame(&decoded).map(Some),
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {}
                Err(e) => return Err(ReelError::FrameDecode(e.to_string())),
            }

            if self.eof_sent {
                return Ok(None);
            }

            match self.next_packet() {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .map_err(|e| ReelError::FrameDecode(format!("packet rejected: {}", e)))?,
                None => {
                    self.eof_sent = true;
                    self.decoder
                        .send_eof()
                        .map_err(|e| ReelError::FrameDecode(format!("flush: {}", e)))?;
                }
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.input_context
            .seek(0, ..0i64)
            .map_err(|e| ReelError::Rewind(e.to_string()))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.frame_count = 0;
        debug!("Video rewound to the first frame");
        Ok(())
    }

    fn native_delay(&self) -> Duration {
        self.native_delay
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn describe(&self) -> &'static str {
        "video"
    }
}

/// Placeholder path for sources built from bytes
const IN_MEMORY: &str = "<memory>";

/// Animated GIF decoded frame by frame from an in-memory copy of the file
pub struct AnimatedImageSource {
    bytes: Arc<[u8]>,
    frames: Frames<'static>,
    /// First frame, decoded at open time to read the native delay
    pending: Option<RasterFrame>,
    dimensions: (u32, u32),
    native_delay: Duration,
    frame_count: u64,
    exhausted: bool,
}

impl AnimatedImageSource {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes: Arc<[u8]> = std::fs::read(path)
            .map_err(|e| ReelError::open(path, e))?
            .into();
        Self::from_bytes(bytes).map_err(|e| match e {
            ReelError::Open { reason, .. } => ReelError::open(path, reason),
            other => ReelError::open(path, other),
        })
    }

    /// Build a source over GIF data already held in memory
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self> {
        let bytes = bytes.into();
        let (dimensions, mut frames) =
            Self::decode(&bytes).map_err(|e| ReelError::open(IN_MEMORY, e))?;

        let first = frames
            .next()
            .ok_or_else(|| ReelError::open(IN_MEMORY, "animation has no frames"))?
            .map_err(|e| ReelError::open(IN_MEMORY, e))?;

        let (numer, denom) = first.delay().numer_denom_ms();
        let native_delay = if numer == 0 || denom == 0 {
            DEFAULT_ANIMATION_DELAY
        } else {
            Duration::from_secs_f64(numer as f64 / denom as f64 / 1000.0)
        };
        let pending = Some(Self::to_raster(first, 1)?);

        info!(
            "Opened animated image: {}x{}, native delay {:.0}ms",
            dimensions.0,
            dimensions.1,
            native_delay.as_secs_f64() * 1000.0
        );

        Ok(Self {
            bytes,
            frames,
            pending,
            dimensions,
            native_delay,
            frame_count: 1,
            exhausted: false,
        })
    }

    fn decode(bytes: &Arc<[u8]>) -> image::ImageResult<((u32, u32), Frames<'static>)> {
        let decoder = GifDecoder::new(Cursor::new(Arc::clone(bytes)))?;
        let dimensions = decoder.dimensions();
        Ok((dimensions, decoder.into_frames()))
    }

    fn to_raster(frame: image::Frame, frame_number: u64) -> Result<RasterFrame> {
        let buffer = frame.into_buffer();
        let (width, height) = buffer.dimensions();
        let data = buffer
            .pixels()
            .flat_map(|pixel| [pixel[0], pixel[1], pixel[2]])
            .collect();
        Ok(RasterFrame::rgb(width, height, data)?.with_frame_number(frame_number))
    }
}

impl FrameSource for AnimatedImageSource {
    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }
        if self.exhausted {
            return Ok(None);
        }

        match self.frames.next() {
            Some(Ok(frame)) => {
                self.frame_count += 1;
                Self::to_raster(frame, self.frame_count).map(Some)
            }
            Some(Err(e)) => {
                // The GIF stream cannot be resynchronised after a bad block
                warn!("Animated image frame {} is corrupt: {}", self.frame_count + 1, e);
                self.exhausted = true;
                Err(ReelError::FrameDecode(e.to_string()))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn rewind(&mut self) -> Result<()> {
        let (_, frames) = Self::decode(&self.bytes).map_err(|e| ReelError::Rewind(e.to_string()))?;
        self.frames = frames;
        self.pending = None;
        self.frame_count = 0;
        self.exhausted = false;
        debug!("Animated image rewound to frame 0");
        Ok(())
    }

    fn native_delay(&self) -> Duration {
        self.native_delay
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn describe(&self) -> &'static str {
        "animated image"
    }
}

/// Frames already decoded by the caller, replayed in order
pub struct MemorySource {
    frames: Vec<RasterFrame>,
    native_delay: Duration,
    cursor: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<RasterFrame>, native_delay: Duration) -> Self {
        let frames = frames
            .into_iter()
            .enumerate()
            .map(|(i, frame)| frame.with_frame_number(i as u64 + 1))
            .collect();
        Self {
            frames,
            native_delay,
            cursor: 0,
        }
    }

    /// Index of the next frame to be returned
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RasterFrame>> {
        let frame = self.frames.get(self.cursor).cloned();
        if frame.is_some() {
            self.cursor += 1;
        }
        Ok(frame)
    }

    fn rewind(&mut self) -> Result<()> {
        self.cursor = 0;
        Ok(())
    }

    fn native_delay(&self) -> Duration {
        self.native_delay
    }

    fn dimensions(&self) -> (u32, u32) {
        self.frames
            .first()
            .map(|frame| (frame.width(), frame.height()))
            .unwrap_or((0, 0))
    }

    fn describe(&self) -> &'static str {
        "in-memory frames"
    }
}
