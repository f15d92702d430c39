//! Frame capture: rasterize the live surface or one element, then encode.

use std::io::Cursor;

use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::color::{TRANSPARENT, WHITE};
use super::surface::{CaptureRequest, OffscreenFraming, OffscreenId, RenderSurface};
use crate::error::{DxError, Result};
use crate::model::ProjectCanvas;
use crate::settings::ExportDefaults;

/// Still image output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
        }
    }

    pub const fn media_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
        }
    }

    /// Whether the encoded file keeps an alpha channel.
    pub const fn has_alpha(self) -> bool {
        !matches!(self, Self::Jpeg)
    }
}

/// Options for one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Logical export width; may differ from the canvas width.
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
    pub format: ImageFormat,
    /// JPEG quality, 1-100. WebP is always lossless.
    pub quality: u8,
    /// Explicit background; `None` uses the surface's own.
    pub background: Option<Rgba<u8>>,
    pub include_background: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            pixel_ratio: 2.0,
            format: ImageFormat::Png,
            quality: 92,
            background: None,
            include_background: true,
        }
    }
}

impl CaptureSettings {
    /// Settings at canvas resolution using the user's export defaults.
    pub fn for_canvas(canvas: &ProjectCanvas, defaults: &ExportDefaults) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            pixel_ratio: defaults.pixel_ratio,
            format: defaults.image_format,
            quality: defaults.quality,
            background: None,
            include_background: defaults.include_background,
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: Rgba<u8>) -> Self {
        self.background = Some(background);
        self
    }

    /// Background for this capture.
    ///
    /// Falls back to white for formats without alpha and to transparent
    /// otherwise.
    pub fn resolve_background(&self, surface_background: Option<Rgba<u8>>) -> Rgba<u8> {
        let fallback = if self.format.has_alpha() {
            TRANSPARENT
        } else {
            WHITE
        };
        if !self.include_background {
            return fallback;
        }
        self.background.or(surface_background).unwrap_or(fallback)
    }

    fn validate(&self) -> Result<()> {
        let valid_ratio = self.pixel_ratio.is_finite() && self.pixel_ratio > 0.0;
        if self.width == 0 || self.height == 0 || !valid_ratio {
            return Err(DxError::InvalidCaptureSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    fn request(&self, width: u32, height: u32, background: Rgba<u8>) -> CaptureRequest {
        CaptureRequest {
            width,
            height,
            pixel_ratio: self.pixel_ratio,
            background,
        }
    }
}

/// Rasterize the whole live surface at the export resolution.
#[instrument(skip_all, fields(width = settings.width, height = settings.height))]
pub fn capture_surface<S: RenderSurface + ?Sized>(
    surface: &mut S,
    settings: &CaptureSettings,
) -> Result<RgbaImage> {
    settings.validate()?;
    let background = settings.resolve_background(surface.background());
    let request = settings.request(settings.width, settings.height, background);
    let bitmap = surface.capture_whole(&request)?;
    debug!(w = bitmap.width(), h = bitmap.height(), "Captured surface");
    Ok(bitmap)
}

/// Unmounts an offscreen container when dropped.
struct OffscreenGuard<'a, S: RenderSurface + ?Sized> {
    surface: &'a mut S,
    id: OffscreenId,
}

impl<S: RenderSurface + ?Sized> Drop for OffscreenGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.unmount_offscreen(self.id);
    }
}

/// Rasterize a single element via an offscreen clone.
///
/// The clone is removed whether or not the capture succeeds.
#[instrument(skip(surface, settings))]
pub fn capture_element<S: RenderSurface + ?Sized>(
    surface: &mut S,
    element_id: &str,
    framing: OffscreenFraming,
    settings: &CaptureSettings,
) -> Result<RgbaImage> {
    settings.validate()?;
    let background = settings.resolve_background(surface.background());
    let (canvas_w, canvas_h) = surface.canvas_size();

    let mount = surface.mount_offscreen(element_id, framing)?;
    let mut guard = OffscreenGuard {
        surface,
        id: mount.id,
    };

    let (width, height) = match framing {
        OffscreenFraming::Canvas => (settings.width, settings.height),
        OffscreenFraming::Bounds => {
            let sx = f64::from(settings.width) / f64::from(canvas_w.max(1));
            let sy = f64::from(settings.height) / f64::from(canvas_h.max(1));
            (
                ((mount.width * sx).round() as u32).max(1),
                ((mount.height * sy).round() as u32).max(1),
            )
        }
    };

    let request = settings.request(width, height, background);
    guard.surface.capture_offscreen(guard.id, &request)
}

/// Encode a bitmap into `format`.
pub fn encode_bitmap(bitmap: &RgbaImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let (w, h) = bitmap.dimensions();
    let mut out = Cursor::new(Vec::new());
    let encoded = match format {
        ImageFormat::Png => {
            PngEncoder::new(&mut out).write_image(bitmap.as_raw(), w, h, ExtendedColorType::Rgba8)
        }
        ImageFormat::Webp => WebPEncoder::new_lossless(&mut out).write_image(
            bitmap.as_raw(),
            w,
            h,
            ExtendedColorType::Rgba8,
        ),
        ImageFormat::Jpeg => {
            let quality = quality.clamp(1, 100);
            let rgb = flatten_onto(bitmap, WHITE);
            JpegEncoder::new_with_quality(&mut out, quality).write_image(
                &rgb,
                w,
                h,
                ExtendedColorType::Rgb8,
            )
        }
    };
    encoded.map_err(|e| DxError::ImageProcessing(format!("Failed to encode {format:?}: {e}")))?;
    Ok(out.into_inner())
}

/// Composite onto an opaque color and drop the alpha channel.
fn flatten_onto(bitmap: &RgbaImage, under: Rgba<u8>) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(bitmap.as_raw().len() / 4 * 3);
    for px in bitmap.pixels() {
        let a = u16::from(px[3]);
        for c in 0..3 {
            let v = (u16::from(px[c]) * a + u16::from(under[c]) * (255 - a)) / 255;
            rgb.push(v as u8);
        }
    }
    rgb
}
