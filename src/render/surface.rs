//! Render surface abstraction.
//!
//! The export core never touches a concrete UI tree: the embedding layer
//! supplies a [`RenderSurface`] that can rasterize its whole root, clone one
//! element into an offscreen container, and expose per-node opacity.

use image::{Rgba, RgbaImage};

use crate::error::Result;

/// Pixel request handed to the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureRequest {
    /// Logical output width; pixels = `width * pixel_ratio`.
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    /// Already resolved background (may be fully transparent).
    pub background: Rgba<u8>,
}

impl CaptureRequest {
    /// Output size in device pixels, never zero.
    pub fn pixel_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((v as f32 * self.pixel_ratio).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

/// How an offscreen clone is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffscreenFraming {
    /// Container the size of the canvas; the element keeps its position.
    Canvas,
    /// Container cropped to the element's own bounding box.
    Bounds,
}

/// Handle to a mounted offscreen container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OffscreenId(pub u64);

/// A mounted offscreen clone and its logical size in design units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffscreenMount {
    pub id: OffscreenId,
    pub width: f64,
    pub height: f64,
}

/// Capability supplied by the embedding UI layer.
///
/// Only one export may drive a surface at a time; the export manager
/// enforces that with a lock around the surface.
#[allow(async_fn_in_trait)]
pub trait RenderSurface {
    /// Canvas size in design units.
    fn canvas_size(&self) -> (u32, u32);

    /// Background the surface resolves to, if any.
    fn background(&self) -> Option<Rgba<u8>>;

    /// Ids of every rendered node, descendants included.
    fn node_ids(&self) -> Vec<String>;

    /// Live opacity of one render node.
    fn opacity(&self, id: &str) -> Option<f32>;

    /// Override the live opacity of one render node.
    fn set_opacity(&mut self, id: &str, opacity: f32) -> Result<()>;

    /// Rasterize the whole live surface.
    fn capture_whole(&mut self, request: &CaptureRequest) -> Result<RgbaImage>;

    /// Clone an element's render node into an off-viewport container.
    ///
    /// Fails with `NodeNotFound` when no node exists for `element_id`.
    fn mount_offscreen(&mut self, element_id: &str, framing: OffscreenFraming)
    -> Result<OffscreenMount>;

    /// Rasterize a mounted offscreen container.
    fn capture_offscreen(&mut self, id: OffscreenId, request: &CaptureRequest)
    -> Result<RgbaImage>;

    /// Remove an offscreen container. Unknown ids are ignored.
    fn unmount_offscreen(&mut self, id: OffscreenId);

    /// Wait for one render-frame tick so pending visual changes commit.
    async fn tick(&mut self) {
        tokio::task::yield_now().await;
    }
}
