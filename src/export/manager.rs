//! One entry point per export mode, serialized over a single render surface.

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument, warn};

use super::artifact::ExportArtifact;
use super::progress::{ExportProgress, Reporter};
use crate::archive::{PackEntry, pack, safe_stem};
use crate::error::{DxError, Result};
use crate::model::{Element, find_element, visible_leaves};
use crate::render::{
    CaptureSettings, LayerIsolationExporter, OffscreenFraming, RenderSurface, StaticTimeline,
    Timeline, capture_element, capture_surface, encode_bitmap,
};
use crate::sequence::{
    CancelHandle, RenderOutcome, SequenceProgress, SequenceRenderer, SequenceSettings,
    VideoEncoder, extension_for_media_type,
};

const ZIP_MEDIA_TYPE: &str = "application/zip";

/// The render surface and its timeline, only ever touched under one lock.
#[derive(Debug)]
pub struct Stage<S, T> {
    pub surface: S,
    pub timeline: T,
}

/// Rewinds whatever the timeline moved once a video render ends, including
/// on error and cancellation.
struct SeekRestore<'a, S: RenderSurface, T: Timeline<S>> {
    stage: &'a mut Stage<S, T>,
    snapshot: Option<T::Snapshot>,
}

impl<'a, S: RenderSurface, T: Timeline<S>> SeekRestore<'a, S, T> {
    fn new(stage: &'a mut Stage<S, T>) -> Self {
        let snapshot = Some(stage.timeline.snapshot(&stage.surface));
        Self { stage, snapshot }
    }
}

impl<S: RenderSurface, T: Timeline<S>> Drop for SeekRestore<'_, S, T> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            let Stage { surface, timeline } = &mut *self.stage;
            timeline.restore(surface, snapshot);
            debug!("Design restored after video render");
        }
    }
}

/// Result of a video export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoExport {
    Ready(ExportArtifact),
    Cancelled { frames_captured: u32 },
}

/// Orchestrates every export mode.
///
/// Exports never run concurrently against the surface: each call holds the
/// stage lock for its whole duration.
#[derive(Debug)]
pub struct ExportManager<S, T = StaticTimeline> {
    stage: Mutex<Stage<S, T>>,
    name: String,
    framing: OffscreenFraming,
}

impl<S: RenderSurface> ExportManager<S, StaticTimeline> {
    /// Manager for a design without animation.
    pub fn still(surface: S) -> Self {
        Self::new(surface, StaticTimeline)
    }
}

impl<S, T> ExportManager<S, T>
where
    S: RenderSurface,
    T: Timeline<S>,
{
    pub fn new(surface: S, timeline: T) -> Self {
        Self {
            stage: Mutex::new(Stage { surface, timeline }),
            name: "design".to_string(),
            framing: OffscreenFraming::Bounds,
        }
    }

    /// Base name used for exported file names.
    #[must_use]
    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = safe_stem(name.as_ref());
        self
    }

    /// Framing of isolated element captures (default: cropped to bounds).
    #[must_use]
    pub fn with_framing(mut self, framing: OffscreenFraming) -> Self {
        self.framing = framing;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access to the stage, waiting for any running export.
    pub async fn stage(&self) -> MutexGuard<'_, Stage<S, T>> {
        self.stage.lock().await
    }

    pub fn into_stage(self) -> Stage<S, T> {
        self.stage.into_inner()
    }

    /// Capture the whole surface as one image.
    #[instrument(skip_all, fields(name = %self.name))]
    pub async fn export_canvas<F>(&self, settings: &CaptureSettings, on_progress: F) -> Result<ExportArtifact>
    where
        F: Fn(&ExportProgress),
    {
        let reporter = Reporter::start(on_progress, 1, "Capturing canvas");
        let result = self.canvas(settings).await;
        reporter.finish(result, "Canvas exported")
    }

    async fn canvas(&self, settings: &CaptureSettings) -> Result<ExportArtifact> {
        let bitmap = {
            let mut stage = self.stage.lock().await;
            capture_surface(&mut stage.surface, settings)?
        };
        let bytes = encode_bitmap(&bitmap, settings.format, settings.quality)?;
        Ok(ExportArtifact::new(
            format!("{}.{}", self.name, settings.format.extension()),
            settings.format.media_type(),
            bytes,
        ))
    }

    /// Capture every visible non-group element on its own and zip them.
    #[instrument(skip_all, fields(name = %self.name))]
    pub async fn export_shapes_as_zip<F>(
        &self,
        elements: &[Element],
        settings: &CaptureSettings,
        on_progress: F,
    ) -> Result<ExportArtifact>
    where
        F: Fn(&ExportProgress),
    {
        let shapes = visible_leaves(elements);
        let reporter = Reporter::start(on_progress, shapes.len(), "Exporting shapes");
        let result = if shapes.is_empty() {
            Err(DxError::NoVisibleShapes)
        } else {
            self.capture_into_zip(&shapes, settings, &reporter)
                .await
                .map(|zip| {
                    ExportArtifact::new(format!("{}-shapes.zip", self.name), ZIP_MEDIA_TYPE, zip)
                })
        };
        reporter.finish(result, "Shapes exported")
    }

    /// One selected element exports as a single image; several as a zip.
    #[instrument(skip_all, fields(name = %self.name, selected = selected_ids.len()))]
    pub async fn export_selection<F, I>(
        &self,
        elements: &[Element],
        selected_ids: &[I],
        settings: &CaptureSettings,
        on_progress: F,
    ) -> Result<ExportArtifact>
    where
        F: Fn(&ExportProgress),
        I: AsRef<str>,
    {
        let reporter = Reporter::start(on_progress, selected_ids.len(), "Exporting selection");
        let result = self.selection(elements, selected_ids, settings, &reporter).await;
        reporter.finish(result, "Selection exported")
    }

    async fn selection<F: Fn(&ExportProgress), I: AsRef<str>>(
        &self,
        elements: &[Element],
        selected_ids: &[I],
        settings: &CaptureSettings,
        reporter: &Reporter<F>,
    ) -> Result<ExportArtifact> {
        let selected = selected_ids
            .iter()
            .map(|id| {
                find_element(elements, id.as_ref()).ok_or_else(|| DxError::NodeNotFound {
                    element_id: id.as_ref().to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        match selected.as_slice() {
            [] => Err(DxError::NothingSelected),
            [single] => {
                let bitmap = {
                    let mut stage = self.stage.lock().await;
                    capture_element(&mut stage.surface, &single.id, self.framing, settings)?
                };
                let bytes = encode_bitmap(&bitmap, settings.format, settings.quality)?;
                reporter.step(1, format!("Captured {}", single.id));
                Ok(ExportArtifact::new(
                    shape_file_name(None, single, settings),
                    settings.format.media_type(),
                    bytes,
                ))
            }
            many => {
                let zip = self.capture_into_zip(many, settings, reporter).await?;
                Ok(ExportArtifact::new(
                    format!("{}-selection.zip", self.name),
                    ZIP_MEDIA_TYPE,
                    zip,
                ))
            }
        }
    }

    /// Capture each visible top-level layer in isolation and zip them in
    /// display order.
    #[instrument(skip_all, fields(name = %self.name, layers = layers.len()))]
    pub async fn export_shapes_stacked<F>(
        &self,
        layers: &[Element],
        settings: &CaptureSettings,
        on_progress: F,
    ) -> Result<ExportArtifact>
    where
        F: Fn(&ExportProgress),
    {
        let total = layers.iter().filter(|e| e.visible).count();
        let reporter = Reporter::start(on_progress, total, "Exporting layers");
        let result = if total == 0 {
            Err(DxError::NoVisibleShapes)
        } else {
            self.stacked(layers, settings, &reporter).await
        };
        reporter.finish(result, "Layers exported")
    }

    async fn stacked<F: Fn(&ExportProgress)>(
        &self,
        layers: &[Element],
        settings: &CaptureSettings,
        reporter: &Reporter<F>,
    ) -> Result<ExportArtifact> {
        let captures = {
            let mut stage = self.stage.lock().await;
            let mut exporter = LayerIsolationExporter::new(settings.clone());
            exporter
                .export(&mut stage.surface, layers, |done, total| {
                    reporter.step(done, format!("Captured layer {done}/{total}"));
                })
                .await?
        };

        let entries = captures
            .iter()
            .map(|capture| {
                let bytes = encode_bitmap(&capture.bitmap, settings.format, settings.quality)?;
                Ok(PackEntry::new(
                    format!(
                        "layer-{:02}-{}.{}",
                        capture.index + 1,
                        safe_stem(&capture.label),
                        settings.format.extension()
                    ),
                    bytes,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        let zip = pack(&entries)?;
        Ok(ExportArtifact::new(
            format!("{}-layers.zip", self.name),
            ZIP_MEDIA_TYPE,
            zip,
        ))
    }

    /// Render a frame sequence and encode it.
    ///
    /// A cancelled render yields [`VideoExport::Cancelled`] and no artifact.
    #[instrument(skip_all, fields(name = %self.name, fps = sequence.fps))]
    pub async fn export_video<E, P>(
        &self,
        encoder: &mut E,
        sequence: SequenceSettings,
        cancel: Option<CancelHandle>,
        on_progress: P,
    ) -> Result<VideoExport>
    where
        E: VideoEncoder,
        P: FnMut(&SequenceProgress),
    {
        let mut renderer = SequenceRenderer::new(sequence);
        if let Some(cancel) = cancel {
            renderer = renderer.with_cancel_handle(cancel);
        }

        let outcome = {
            let mut stage = self.stage.lock().await;
            let mut guard = SeekRestore::new(&mut stage);
            let Stage { surface, timeline } = &mut *guard.stage;
            renderer.render(surface, timeline, encoder, on_progress).await?
        };

        match outcome {
            RenderOutcome::Completed(video) => {
                let ext = extension_for_media_type(&video.media_type);
                info!(size = video.bytes.len(), media_type = %video.media_type, "Video exported");
                Ok(VideoExport::Ready(ExportArtifact::new(
                    format!("{}.{ext}", self.name),
                    video.media_type,
                    video.bytes,
                )))
            }
            RenderOutcome::Cancelled { frames_captured } => {
                warn!(frames_captured, "Video export cancelled");
                Ok(VideoExport::Cancelled { frames_captured })
            }
        }
    }

    /// Isolated-capture each element and package the images.
    ///
    /// The first failing capture aborts the whole batch.
    async fn capture_into_zip<F: Fn(&ExportProgress)>(
        &self,
        elements: &[&Element],
        settings: &CaptureSettings,
        reporter: &Reporter<F>,
    ) -> Result<Vec<u8>> {
        let mut entries = Vec::with_capacity(elements.len());
        {
            let mut stage = self.stage.lock().await;
            for (index, element) in elements.iter().enumerate() {
                let bitmap = capture_element(&mut stage.surface, &element.id, self.framing, settings)
                    .map_err(|e| {
                        warn!(element = %element.id, error = %e, "Capture failed, aborting batch");
                        e
                    })?;
                let bytes = encode_bitmap(&bitmap, settings.format, settings.quality)?;
                entries.push(PackEntry::new(
                    shape_file_name(Some(index + 1), element, settings),
                    bytes,
                ));
                reporter.step(index + 1, format!("Captured {}", element.id));
                debug!(element = %element.id, "Shape captured");
            }
        }
        pack(&entries)
    }
}

/// `<NN>-<name|kind>-<id>.<ext>`, or without the index for single exports.
fn shape_file_name(index: Option<usize>, element: &Element, settings: &CaptureSettings) -> String {
    let label = safe_stem(element.label());
    let id = safe_stem(&element.id);
    let ext = settings.format.extension();
    match index {
        Some(i) => format!("{i:02}-{label}-{id}.{ext}"),
        None => format!("{label}-{id}.{ext}"),
    }
}
