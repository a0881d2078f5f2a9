use crate::config::{FrameTiming, PlaybackConfig};
use crate::converter::FrameConverter;
use crate::decoder::{open_source, FrameSource, RasterFrame};
use crate::renderer::Renderer;
use crate::{ReelError, Result};
use log::{debug, info, warn};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Lifecycle of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Opening,
    Playing,
    /// Rewinding an exhausted source
    Looping,
    Stopped,
}

/// Counters reported when playback stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub frames_rendered: u64,
    pub frames_skipped: u64,
    pub loops: u64,
}

/// Drives pull -> convert -> render -> present -> sleep, looping forever
/// until cancelled.
pub struct PlaybackScheduler<W: Write> {
    config: PlaybackConfig,
    converter: FrameConverter,
    renderer: Renderer<W>,
    source: Option<Box<dyn FrameSource>>,
    timing: Option<FrameTiming>,
    state: PlaybackState,
    summary: PlaybackSummary,
    decoded_since_rewind: bool,
}

impl<W: Write> PlaybackScheduler<W> {
    /// Idle scheduler; the configuration is validated here and frozen
    pub fn new(config: PlaybackConfig, out: W) -> Result<Self> {
        config.validate()?;
        let converter = FrameConverter::from_config(&config)?;
        let renderer = Renderer::new(out, config.color);
        Ok(Self {
            config,
            converter,
            renderer,
            source: None,
            timing: None,
            state: PlaybackState::Idle,
            summary: PlaybackSummary::default(),
            decoded_since_rewind: false,
        })
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn timing(&self) -> Option<FrameTiming> {
        self.timing
    }

    pub fn summary(&self) -> PlaybackSummary {
        self.summary
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn renderer(&self) -> &Renderer<W> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<W> {
        &mut self.renderer
    }

    /// Open `path` and start playing. On failure the session stops and
    /// nothing is printed.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.transition(PlaybackState::Opening);
        match open_source(path) {
            Ok(source) => {
                self.attach(source);
                Ok(())
            }
            Err(e) => {
                self.transition(PlaybackState::Stopped);
                Err(e)
            }
        }
    }

    /// Play from an already opened source
    pub fn attach(&mut self, source: Box<dyn FrameSource>) {
        if self.state != PlaybackState::Opening {
            self.transition(PlaybackState::Opening);
        }

        let timing = FrameTiming::new(source.native_delay(), self.config.fps_cap);
        let (width, height) = source.dimensions();
        let (cols, rows) = self.converter.grid_size(width.max(1), height.max(1));
        info!(
            "Playing {} {}x{} as {}x{} cells, native delay {:.1}ms, effective delay {:.1}ms",
            source.describe(),
            width,
            height,
            cols,
            rows,
            timing.native_delay().as_secs_f64() * 1000.0,
            timing.effective_delay().as_secs_f64() * 1000.0
        );

        self.timing = Some(timing);
        self.source = Some(source);
        self.decoded_since_rewind = false;
        self.transition(PlaybackState::Playing);
    }

    /// Run one loop body without the pacing sleep and return the sleep
    /// budget left for this frame.
    pub fn tick(&mut self) -> Result<Duration> {
        let timing = self.timing.ok_or(ReelError::NotOpened)?;
        let started = Instant::now();

        let frame = self.pull_frame()?;
        let ascii = self.converter.convert(&frame)?;
        let block = self.renderer.render(&ascii)?;
        self.renderer.present(&block)?;
        self.summary.frames_rendered += 1;

        let elapsed = started.elapsed();
        debug!(
            "Frame {} rendered in {:.2}ms",
            frame.frame_number,
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(timing.remaining(elapsed))
    }

    /// Play until `cancel` turns true or the sender goes away. Cancellation
    /// is observed between frames and interrupts the pacing sleep.
    pub async fn run(&mut self, mut cancel: watch::Receiver<bool>) -> Result<PlaybackSummary> {
        if self.source.is_none() {
            return Err(ReelError::NotOpened);
        }

        loop {
            if *cancel.borrow() {
                break;
            }

            let remaining = match self.tick() {
                Ok(remaining) => remaining,
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(remaining) => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop();
        info!(
            "Playback stopped: {} frames rendered, {} skipped, {} loops",
            self.summary.frames_rendered, self.summary.frames_skipped, self.summary.loops
        );
        Ok(self.summary)
    }

    /// Release the source and enter `Stopped`
    pub fn stop(&mut self) {
        self.source = None;
        self.transition(PlaybackState::Stopped);
    }

    /// Next decodable frame, rewinding at end of stream and skipping bad
    /// frames
    fn pull_frame(&mut self) -> Result<RasterFrame> {
        loop {
            let source = self.source.as_mut().ok_or(ReelError::NotOpened)?;
            match source.next_frame() {
                Ok(Some(frame)) => {
                    self.decoded_since_rewind = true;
                    return Ok(frame);
                }
                Ok(None) => {
                    if !self.decoded_since_rewind {
                        return Err(ReelError::NoPlayableFrames);
                    }
                    self.transition(PlaybackState::Looping);
                    self.source.as_mut().ok_or(ReelError::NotOpened)?.rewind()?;
                    self.summary.loops += 1;
                    self.decoded_since_rewind = false;
                    self.transition(PlaybackState::Playing);
                }
                Err(e) if e.is_frame_local() => {
                    warn!("Skipping undecodable frame: {}", e);
                    self.summary.frames_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn transition(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!("Playback state {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
