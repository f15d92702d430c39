//! Rasterization: the render surface seam, frame capture, layer isolation
//! and the built-in software surface and keyframe timeline.

mod capture;
pub mod color;
mod isolation;
mod raster;
mod surface;
mod timeline;

pub use capture::{
    CaptureSettings, ImageFormat, capture_element, capture_surface, encode_bitmap,
};
pub use isolation::{IsolationState, LayerCapture, LayerIsolationExporter};
pub use raster::RasterSurface;
pub use surface::{CaptureRequest, OffscreenFraming, OffscreenId, OffscreenMount, RenderSurface};
pub use timeline::{KeyframeTimeline, PropertyValue, SampledValues, StaticTimeline, Timeline};
