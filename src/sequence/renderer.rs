//! Frame-accurate sequence rendering.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use image::RgbaImage;
use image::imageops::{self, FilterType};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::encoder::{EncodedVideo, EncoderConfig, VideoEncoder};
use crate::error::{DxError, Result};
use crate::render::{CaptureSettings, RenderSurface, Timeline, capture_surface};

/// Default wait between the last frame and closing a realtime session.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Longest sequence accepted: ten minutes at 60 fps. Every still is held in
/// memory until encoding starts.
pub const MAX_FRAMES: u32 = 36_000;

/// Capture percentages stop here; 100 means the container is ready.
const CAPTURE_PERCENT_CAP: u8 = 99;

/// What to render.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSettings {
    /// Seconds.
    pub duration: f64,
    pub fps: u32,
    /// Export resolution, independent of the canvas size.
    pub capture: CaptureSettings,
    pub settle_delay: Duration,
}

impl SequenceSettings {
    pub fn new(duration: f64, fps: u32, capture: CaptureSettings) -> Self {
        Self {
            duration,
            fps,
            capture,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }

    /// `ceil(duration * fps)`.
    pub fn total_frames(&self) -> u32 {
        (self.duration * f64::from(self.fps)).ceil().max(0.0) as u32
    }

    /// Seek time of frame `index`.
    pub fn frame_time(&self, index: u32) -> f64 {
        f64::from(index) / f64::from(self.fps)
    }

    /// Interval between frames when pacing a realtime encoder.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.max(1)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.fps == 0 {
            return Err(DxError::InvalidSequence("fps must be at least 1".to_string()));
        }
        if !self.duration.is_finite() || self.duration <= 0.0 {
            return Err(DxError::InvalidSequence(format!(
                "duration must be positive, got {}",
                self.duration
            )));
        }
        let frames = (self.duration * f64::from(self.fps)).ceil();
        if frames > f64::from(MAX_FRAMES) {
            return Err(DxError::InvalidSequence(format!(
                "{frames} frames requested, at most {MAX_FRAMES} are supported"
            )));
        }
        Ok(())
    }
}

/// Renderer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencePhase {
    Idle,
    Preparing,
    Rendering,
    Encoding,
    Completed,
    Error,
    Cancelled,
}

/// Progress snapshot handed to callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceProgress {
    pub phase: SequencePhase,
    pub current_frame: u32,
    pub total_frames: u32,
    pub percentage: u8,
    /// Measured capture rate so far.
    pub frames_per_second: f64,
    /// Seconds left, from the measured rate.
    pub eta_seconds: Option<f64>,
    pub message: String,
}

impl SequenceProgress {
    fn new(phase: SequencePhase, total_frames: u32, message: impl Into<String>) -> Self {
        Self {
            phase,
            current_frame: 0,
            total_frames,
            percentage: 0,
            frames_per_second: 0.0,
            eta_seconds: None,
            message: message.into(),
        }
    }
}

/// Terminal outcome of a render that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Completed(EncodedVideo),
    Cancelled { frames_captured: u32 },
}

/// Shared flag for cooperative cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Captures one still per frame time, then feeds them to an encoder.
#[derive(Debug)]
pub struct SequenceRenderer {
    settings: SequenceSettings,
    cancel: CancelHandle,
    phase: SequencePhase,
}

impl SequenceRenderer {
    pub fn new(settings: SequenceSettings) -> Self {
        Self {
            settings,
            cancel: CancelHandle::new(),
            phase: SequencePhase::Idle,
        }
    }

    /// Use an externally owned cancel flag.
    #[must_use]
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub const fn phase(&self) -> SequencePhase {
        self.phase
    }

    pub const fn settings(&self) -> &SequenceSettings {
        &self.settings
    }

    /// Render the whole sequence.
    ///
    /// Frames are captured strictly in time order and submitted to the
    /// encoder in that order. Cancellation is reported as
    /// [`RenderOutcome::Cancelled`], never as an error.
    #[instrument(skip_all, fields(duration = self.settings.duration, fps = self.settings.fps))]
    pub async fn render<S, T, E, P>(
        &mut self,
        surface: &mut S,
        timeline: &mut T,
        encoder: &mut E,
        mut on_progress: P,
    ) -> Result<RenderOutcome>
    where
        S: RenderSurface,
        T: Timeline<S>,
        E: VideoEncoder,
        P: FnMut(&SequenceProgress),
    {
        let result = self
            .run(surface, timeline, encoder, &mut on_progress)
            .await;
        if let Err(e) = &result {
            self.phase = SequencePhase::Error;
            warn!(error = %e, "Sequence render failed");
            on_progress(&SequenceProgress::new(
                SequencePhase::Error,
                self.settings.total_frames(),
                e.to_string(),
            ));
        }
        result
    }

    async fn run<S, T, E, P>(
        &mut self,
        surface: &mut S,
        timeline: &mut T,
        encoder: &mut E,
        on_progress: &mut P,
    ) -> Result<RenderOutcome>
    where
        S: RenderSurface,
        T: Timeline<S>,
        E: VideoEncoder,
        P: FnMut(&SequenceProgress),
    {
        self.phase = SequencePhase::Preparing;
        self.settings.validate()?;
        let total = self.settings.total_frames();
        on_progress(&SequenceProgress::new(
            SequencePhase::Preparing,
            total,
            format!("Preparing {total} frames"),
        ));

        self.phase = SequencePhase::Rendering;
        let mut stills: Vec<RgbaImage> = Vec::with_capacity(total as usize);
        let started = Instant::now();

        for index in 0..total {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(index, on_progress));
            }

            let time = self.settings.frame_time(index);
            timeline.seek(surface, time).await?;
            surface.tick().await;
            stills.push(capture_surface(surface, &self.settings.capture)?);

            let done = index + 1;
            let elapsed = started.elapsed().as_secs_f64();
            let rate = if elapsed > 0.0 {
                f64::from(done) / elapsed
            } else {
                0.0
            };
            let percentage = ((f64::from(done) / f64::from(total)) * 100.0).round() as u8;
            on_progress(&SequenceProgress {
                phase: SequencePhase::Rendering,
                current_frame: done,
                total_frames: total,
                percentage: percentage.min(CAPTURE_PERCENT_CAP),
                frames_per_second: rate,
                eta_seconds: (rate > 0.0).then(|| f64::from(total - done) / rate),
                message: format!("Captured frame {done}/{total} at {time:.3}s"),
            });
        }

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled(total, on_progress));
        }

        self.phase = SequencePhase::Encoding;
        let mut encoding = SequenceProgress::new(SequencePhase::Encoding, total, "Encoding");
        encoding.current_frame = total;
        encoding.percentage = CAPTURE_PERCENT_CAP;
        on_progress(&encoding);

        let video = self.encode(encoder, &stills).await?;

        self.phase = SequencePhase::Completed;
        let mut completed = SequenceProgress::new(
            SequencePhase::Completed,
            total,
            format!("Encoded {} bytes of {}", video.bytes.len(), video.media_type),
        );
        completed.current_frame = total;
        completed.percentage = 100;
        on_progress(&completed);
        info!(frames = total, size = video.bytes.len(), "Sequence rendered");
        Ok(RenderOutcome::Completed(video))
    }

    fn cancelled<P: FnMut(&SequenceProgress)>(
        &mut self,
        frames_captured: u32,
        on_progress: &mut P,
    ) -> RenderOutcome {
        self.phase = SequencePhase::Cancelled;
        info!(frames_captured, "Sequence render cancelled");
        let mut progress = SequenceProgress::new(
            SequencePhase::Cancelled,
            self.settings.total_frames(),
            "Cancelled",
        );
        progress.current_frame = frames_captured;
        on_progress(&progress);
        RenderOutcome::Cancelled { frames_captured }
    }

    /// Draw each still onto one shared frame and hand it to the encoder.
    async fn encode<E: VideoEncoder>(
        &self,
        encoder: &mut E,
        stills: &[RgbaImage],
    ) -> Result<EncodedVideo> {
        let Some(first) = stills.first() else {
            return Err(DxError::Encoding("no frames captured".to_string()));
        };
        let (width, height) = first.dimensions();
        let config = EncoderConfig {
            width,
            height,
            fps: self.settings.fps,
        };
        let realtime = encoder.realtime();
        let interval = self.settings.frame_interval();

        let mut session = encoder.open(&config)?;
        let mut shared = RgbaImage::new(width, height);
        for (index, still) in stills.iter().enumerate() {
            if still.dimensions() == (width, height) {
                shared.copy_from_slice(still.as_raw());
            } else {
                debug!(index, "Still size differs from first frame, resizing");
                shared = imageops::resize(still, width, height, FilterType::Triangle);
            }
            encoder.submit_frame(&mut session, &shared)?;
            if realtime {
                tokio::time::sleep(interval).await;
            }
        }
        if realtime {
            tokio::time::sleep(self.settings.settle_delay).await;
        }
        encoder.close(session)
    }
}
