//! Stacked layer export: capture each top-level layer alone on the live
//! surface by forcing every other node transparent.

use std::collections::{HashMap, HashSet};

use image::RgbaImage;
use tracing::{debug, info, instrument, warn};

use super::capture::{CaptureSettings, capture_surface};
use super::surface::RenderSurface;
use crate::error::Result;
use crate::model::Element;

/// Where an isolation pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationState {
    Idle,
    CapturingLayer(usize),
    Restoring,
    Done,
    Failed,
}

/// One isolated layer bitmap.
#[derive(Debug, Clone)]
pub struct LayerCapture {
    /// Zero-based position among the visible layers.
    pub index: usize,
    pub element_id: String,
    pub label: String,
    pub bitmap: RgbaImage,
}

/// Puts every node's opacity back exactly once, including on early return.
struct OpacityRestore<'a, S: RenderSurface + ?Sized> {
    surface: &'a mut S,
    snapshot: HashMap<String, f32>,
    restored: bool,
}

impl<S: RenderSurface + ?Sized> OpacityRestore<'_, S> {
    fn restore(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        for (id, opacity) in &self.snapshot {
            if let Err(e) = self.surface.set_opacity(id, *opacity) {
                warn!(id, error = %e, "Failed to restore node opacity");
            }
        }
        debug!(nodes = self.snapshot.len(), "Opacity restored");
    }
}

impl<S: RenderSurface + ?Sized> Drop for OpacityRestore<'_, S> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Runs one stacked export over a surface.
#[derive(Debug)]
pub struct LayerIsolationExporter {
    settings: CaptureSettings,
    state: IsolationState,
}

impl LayerIsolationExporter {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            settings,
            state: IsolationState::Idle,
        }
    }

    pub const fn state(&self) -> IsolationState {
        self.state
    }

    /// Capture every visible top-level layer in display order.
    ///
    /// `on_layer(done, total)` fires after each capture. Node opacity is
    /// restored before this returns, whether it succeeds or fails.
    #[instrument(skip_all, fields(layers = layers.len()))]
    pub async fn export<S, F>(
        &mut self,
        surface: &mut S,
        layers: &[Element],
        mut on_layer: F,
    ) -> Result<Vec<LayerCapture>>
    where
        S: RenderSurface + ?Sized,
        F: FnMut(usize, usize),
    {
        let visible: Vec<&Element> = layers.iter().filter(|e| e.visible).collect();
        let total = visible.len();

        let snapshot: HashMap<String, f32> = surface
            .node_ids()
            .into_iter()
            .filter_map(|id| surface.opacity(&id).map(|o| (id, o)))
            .collect();

        let mut guard = OpacityRestore {
            surface,
            snapshot,
            restored: false,
        };

        let mut captures = Vec::with_capacity(total);
        for (index, layer) in visible.into_iter().enumerate() {
            self.state = IsolationState::CapturingLayer(index);
            let captured = self.capture_layer(&mut guard, layer).await;
            match captured {
                Ok(bitmap) => {
                    captures.push(LayerCapture {
                        index,
                        element_id: layer.id.clone(),
                        label: layer.name.clone().unwrap_or_else(|| layer.id.clone()),
                        bitmap,
                    });
                    on_layer(index + 1, total);
                }
                Err(e) => {
                    self.state = IsolationState::Failed;
                    warn!(layer = %layer.id, error = %e, "Layer capture failed");
                    return Err(e);
                }
            }
        }

        self.state = IsolationState::Restoring;
        guard.restore();
        self.state = IsolationState::Done;
        info!(captured = captures.len(), "Stacked export captured");
        Ok(captures)
    }

    async fn capture_layer<S: RenderSurface + ?Sized>(
        &self,
        guard: &mut OpacityRestore<'_, S>,
        layer: &Element,
    ) -> Result<RgbaImage> {
        let keep: HashSet<String> = layer.subtree_ids().into_iter().collect();
        for (id, original) in &guard.snapshot {
            let target = if keep.contains(id) { *original } else { 0.0 };
            guard.surface.set_opacity(id, target)?;
        }
        guard.surface.tick().await;
        capture_surface(&mut *guard.surface, &self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ElementKind, ProjectCanvas};
    use crate::render::RasterSurface;

    fn surface() -> RasterSurface {
        let canvas = ProjectCanvas {
            width: 20,
            height: 10,
            ..ProjectCanvas::default()
        };
        let mut half = Element::new("b", ElementKind::Rectangle, 10.0, 0.0, 10.0, 10.0)
            .with_fill("#0000ff");
        half.opacity = 0.5;
        RasterSurface::new(
            &canvas,
            vec![
                Element::new("a", ElementKind::Rectangle, 0.0, 0.0, 10.0, 10.0).with_fill("#ff0000"),
                half,
            ],
        )
    }

    fn settings() -> CaptureSettings {
        CaptureSettings {
            include_background: false,
            ..CaptureSettings::default()
        }
        .with_size(20, 10)
        .with_pixel_ratio(1.0)
    }

    #[tokio::test]
    async fn test_each_layer_isolated() {
        let mut surface = surface();
        let layers = surface.elements().to_vec();
        let mut exporter = LayerIsolationExporter::new(settings());
        let mut progress = Vec::new();

        let captures = exporter
            .export(&mut surface, &layers, |done, total| progress.push((done, total)))
            .await
            .unwrap();

        assert_eq!(captures.len(), 2);
        assert_eq!(progress, vec![(1, 2), (2, 2)]);
        assert_eq!(exporter.state(), IsolationState::Done);

        let first = &captures[0].bitmap;
        assert_eq!(first.get_pixel(5, 5)[0], 255);
        assert_eq!(first.get_pixel(15, 5)[3], 0);

        let second = &captures[1].bitmap;
        assert_eq!(second.get_pixel(5, 5)[3], 0);
        assert_eq!(second.get_pixel(15, 5)[3], 128);

        assert_eq!(surface.opacity("a"), Some(1.0));
        assert_eq!(surface.opacity("b"), Some(0.5));
        assert!(surface.ticks() >= 2);
    }

    #[tokio::test]
    async fn test_hidden_layers_skipped() {
        let mut surface = surface();
        let mut layers = surface.elements().to_vec();
        layers[0].visible = false;
        let mut exporter = LayerIsolationExporter::new(settings());
        let captures = exporter.export(&mut surface, &layers, |_, _| {}).await.unwrap();
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].element_id, "b");
    }

    #[tokio::test]
    async fn test_failure_still_restores() {
        let mut surface = surface();
        let layers = surface.elements().to_vec();
        let bad = CaptureSettings::default().with_size(0, 0);
        let mut exporter = LayerIsolationExporter::new(bad);
        assert!(exporter.export(&mut surface, &layers, |_, _| {}).await.is_err());
        assert_eq!(exporter.state(), IsolationState::Failed);
        assert_eq!(surface.opacity("a"), Some(1.0));
        assert_eq!(surface.opacity("b"), Some(0.5));
    }
}
