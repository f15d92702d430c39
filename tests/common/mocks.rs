//! Recording collaborators for export tests.
//!
//! Every mock appends to one shared [`EventLog`], so tests can assert the
//! relative order of surface, timeline and encoder calls.

use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};
use tracing::trace;

use dx::error::{DxError, Result};
use dx::model::{Element, ProjectCanvas};
use dx::render::{
    CaptureRequest, OffscreenFraming, OffscreenId, OffscreenMount, RasterSurface, RenderSurface,
    SampledValues, Timeline,
};
use dx::sequence::{EncodedVideo, EncoderConfig, VideoEncoder};

/// One observed call.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Seek(f64),
    Tick,
    CaptureWhole,
    Mount(String),
    CaptureOffscreen,
    Unmount,
    SetOpacity(String, f32),
    EncoderOpen { width: u32, height: u32, fps: u32 },
    Submit,
    EncoderClose,
}

/// Shared, ordered call log.
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        trace!(?event, "Recorded");
        self.0.lock().expect("event log poisoned").push(event);
    }

    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.0.lock().expect("event log poisoned").clone()
    }

    #[must_use]
    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| pred(*e)).count()
    }

    #[must_use]
    pub fn position(&self, pred: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(pred)
    }

    #[must_use]
    pub fn seeks(&self) -> Vec<f64> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Seek(t) => Some(t),
                _ => None,
            })
            .collect()
    }
}

/// Raster surface that records every call and can fail on demand.
pub struct RecordingSurface {
    pub inner: RasterSurface,
    pub log: EventLog,
    captures: usize,
    /// 1-based index of the capture that fails.
    fail_on_capture: Option<usize>,
}

impl RecordingSurface {
    #[must_use]
    pub fn new(canvas: &ProjectCanvas, elements: Vec<Element>, log: EventLog) -> Self {
        Self {
            inner: RasterSurface::new(canvas, elements),
            log,
            captures: 0,
            fail_on_capture: None,
        }
    }

    #[must_use]
    pub fn failing_on_capture(mut self, nth: usize) -> Self {
        self.fail_on_capture = Some(nth);
        self
    }

    fn next_capture(&mut self) -> Result<()> {
        self.captures += 1;
        if self.fail_on_capture == Some(self.captures) {
            return Err(DxError::SurfaceUnavailable(format!(
                "injected failure on capture {}",
                self.captures
            )));
        }
        Ok(())
    }
}

impl RenderSurface for RecordingSurface {
    fn canvas_size(&self) -> (u32, u32) {
        self.inner.canvas_size()
    }

    fn background(&self) -> Option<Rgba<u8>> {
        self.inner.background()
    }

    fn node_ids(&self) -> Vec<String> {
        self.inner.node_ids()
    }

    fn opacity(&self, id: &str) -> Option<f32> {
        self.inner.opacity(id)
    }

    fn set_opacity(&mut self, id: &str, opacity: f32) -> Result<()> {
        self.log.push(Event::SetOpacity(id.to_string(), opacity));
        self.inner.set_opacity(id, opacity)
    }

    fn capture_whole(&mut self, request: &CaptureRequest) -> Result<RgbaImage> {
        self.log.push(Event::CaptureWhole);
        self.next_capture()?;
        self.inner.capture_whole(request)
    }

    fn mount_offscreen(
        &mut self,
        element_id: &str,
        framing: OffscreenFraming,
    ) -> Result<OffscreenMount> {
        self.log.push(Event::Mount(element_id.to_string()));
        self.inner.mount_offscreen(element_id, framing)
    }

    fn capture_offscreen(
        &mut self,
        id: OffscreenId,
        request: &CaptureRequest,
    ) -> Result<RgbaImage> {
        self.log.push(Event::CaptureOffscreen);
        self.next_capture()?;
        self.inner.capture_offscreen(id, request)
    }

    fn unmount_offscreen(&mut self, id: OffscreenId) {
        self.log.push(Event::Unmount);
        self.inner.unmount_offscreen(id);
    }

    async fn tick(&mut self) {
        self.log.push(Event::Tick);
        self.inner.tick().await;
    }
}

/// Timeline that only records the seek times.
pub struct RecordingTimeline {
    pub log: EventLog,
}

impl Timeline<RecordingSurface> for RecordingTimeline {
    type Snapshot = ();

    fn snapshot(&self, _surface: &RecordingSurface) {}

    fn restore(&mut self, _surface: &mut RecordingSurface, _snapshot: ()) {}

    async fn seek(&mut self, _surface: &mut RecordingSurface, time: f64) -> Result<()> {
        self.log.push(Event::Seek(time));
        Ok(())
    }

    fn sample(&self, _element_id: &str, _time: f64) -> SampledValues {
        SampledValues::new()
    }
}

/// Encoder that counts frames and returns them as the container bytes.
pub struct RecordingEncoder {
    pub log: EventLog,
    pub realtime: bool,
    submitted: usize,
    /// 1-based index of the frame whose submission fails.
    fail_on_submit: Option<usize>,
    /// Clock reading at each accepted frame.
    pub submit_times: Vec<tokio::time::Instant>,
}

impl RecordingEncoder {
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            realtime: false,
            submitted: 0,
            fail_on_submit: None,
            submit_times: Vec::new(),
        }
    }

    /// Behave like a recorder that consumes frames at playback pace.
    #[must_use]
    pub fn paced(mut self) -> Self {
        self.realtime = true;
        self
    }

    #[must_use]
    pub fn failing_on_submit(mut self, nth: usize) -> Self {
        self.fail_on_submit = Some(nth);
        self
    }
}

impl VideoEncoder for RecordingEncoder {
    type Session = Vec<u8>;

    fn media_type(&self) -> &str {
        "video/webm"
    }

    fn realtime(&self) -> bool {
        self.realtime
    }

    fn open(&mut self, config: &EncoderConfig) -> Result<Self::Session> {
        self.log.push(Event::EncoderOpen {
            width: config.width,
            height: config.height,
            fps: config.fps,
        });
        Ok(Vec::new())
    }

    fn submit_frame(&mut self, session: &mut Self::Session, frame: &RgbaImage) -> Result<()> {
        self.log.push(Event::Submit);
        self.submitted += 1;
        if self.fail_on_submit == Some(self.submitted) {
            return Err(DxError::Encoding(format!(
                "injected failure on frame {}",
                self.submitted
            )));
        }
        self.submit_times.push(tokio::time::Instant::now());
        session.push(frame.get_pixel(0, 0)[3]);
        Ok(())
    }

    fn close(&mut self, session: Self::Session) -> Result<EncodedVideo> {
        self.log.push(Event::EncoderClose);
        Ok(EncodedVideo {
            bytes: session,
            media_type: self.media_type().to_string(),
        })
    }
}
