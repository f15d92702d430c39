//! Software render surface backed by an in-memory element tree.
//!
//! Paints rectangles, ellipses, triangles, lines and embedded images with
//! nearest-neighbour sampling. Text boxes are drawn as their filled block.
//! Good enough for headless exports and for exercising the pipeline.

use std::collections::HashMap;

use image::{Rgba, RgbaImage};
use tracing::{debug, trace, warn};

use super::color::parse_color;
use super::surface::{CaptureRequest, OffscreenFraming, OffscreenId, OffscreenMount, RenderSurface};
use crate::archive::hasher::decode_payload;
use crate::error::{DxError, Result};
use crate::model::{Element, ElementKind, ProjectCanvas, find_element, walk};

/// Region of design space mapped onto the output bitmap.
#[derive(Debug, Clone, Copy, PartialEq)]
struct View {
    x: f64,
    y: f64,
    w: f64,
    h: f64,
}

#[derive(Debug)]
struct Offscreen {
    element: Element,
    opacity: HashMap<String, f32>,
    view: View,
}

/// In-memory [`RenderSurface`].
#[derive(Debug)]
pub struct RasterSurface {
    width: u32,
    height: u32,
    background: Option<Rgba<u8>>,
    elements: Vec<Element>,
    /// Live per-node opacity, seeded from each element's own opacity.
    opacity: HashMap<String, f32>,
    images: HashMap<String, RgbaImage>,
    offscreen: HashMap<OffscreenId, Offscreen>,
    next_offscreen: u64,
    ticks: u64,
}

impl RasterSurface {
    pub fn new(canvas: &ProjectCanvas, elements: Vec<Element>) -> Self {
        let background = canvas
            .background
            .as_deref()
            .and_then(|spec| match parse_color(spec) {
                Ok(color) => Some(color),
                Err(e) => {
                    warn!(spec, error = %e, "Ignoring unparseable canvas background");
                    None
                }
            });

        let mut surface = Self {
            width: canvas.width,
            height: canvas.height,
            background,
            elements: Vec::new(),
            opacity: HashMap::new(),
            images: HashMap::new(),
            offscreen: HashMap::new(),
            next_offscreen: 1,
            ticks: 0,
        };
        surface.set_elements(elements);
        surface
    }

    /// Replace the rendered tree, resetting live opacity and image caches.
    pub fn set_elements(&mut self, elements: Vec<Element>) {
        self.opacity.clear();
        self.images.clear();
        walk(&elements, &mut |e| {
            self.opacity.insert(e.id.clone(), e.opacity);
            if e.kind == ElementKind::Image {
                if let Some(bitmap) = decode_image(e) {
                    self.images.insert(e.id.clone(), bitmap);
                }
            }
        });
        debug!(nodes = self.opacity.len(), images = self.images.len(), "Surface tree set");
        self.elements = elements;
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Current value of one animatable property; `opacity` reads the live node.
    pub fn property(&self, element_id: &str, property: &str) -> Option<f64> {
        let element = find_element(&self.elements, element_id)?;
        match property {
            "x" => Some(element.x),
            "y" => Some(element.y),
            "width" => Some(element.width),
            "height" => Some(element.height),
            "rotation" => Some(element.rotation),
            "opacity" => self.opacity.get(element_id).map(|o| f64::from(*o)),
            _ => None,
        }
    }

    /// Apply one animated property to a node.
    ///
    /// `opacity` also updates the live node opacity.
    pub fn set_property(&mut self, element_id: &str, property: &str, value: f64) -> Result<()> {
        let element = self
            .elements
            .iter_mut()
            .find_map(|e| e.find_mut(element_id))
            .ok_or_else(|| DxError::NodeNotFound {
                element_id: element_id.to_string(),
            })?;
        match property {
            "x" => element.x = value,
            "y" => element.y = value,
            "width" => element.width = value.max(0.0),
            "height" => element.height = value.max(0.0),
            "rotation" => element.rotation = value,
            "opacity" => {
                let opacity = value.clamp(0.0, 1.0) as f32;
                element.opacity = opacity;
                self.opacity.insert(element_id.to_string(), opacity);
            }
            other => {
                trace!(property = other, "Unsupported animated property ignored");
            }
        }
        Ok(())
    }

    /// Mounted offscreen containers; zero outside a capture.
    pub fn offscreen_count(&self) -> usize {
        self.offscreen.len()
    }

    /// Render ticks awaited so far.
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    fn canvas_view(&self) -> View {
        View {
            x: 0.0,
            y: 0.0,
            w: f64::from(self.width.max(1)),
            h: f64::from(self.height.max(1)),
        }
    }

    fn paint(
        &self,
        target: &mut RgbaImage,
        elements: &[Element],
        opacity: &HashMap<String, f32>,
        view: View,
        parent_alpha: f32,
    ) {
        for element in elements.iter().filter(|e| e.visible) {
            let own = opacity.get(&element.id).copied().unwrap_or(element.opacity);
            let alpha = parent_alpha * own.clamp(0.0, 1.0);
            if alpha <= 0.0 {
                continue;
            }
            if element.is_group() {
                self.paint(target, &element.children, opacity, view, alpha);
            } else {
                self.paint_shape(target, element, alpha, view);
            }
        }
    }

    fn paint_shape(&self, target: &mut RgbaImage, element: &Element, alpha: f32, view: View) {
        if element.width <= 0.0 && element.height <= 0.0 {
            return;
        }
        let paint = Paint::for_element(element, self.images.get(&element.id));
        if paint.is_empty() {
            return;
        }

        let sx = f64::from(target.width()) / view.w;
        let sy = f64::from(target.height()) / view.h;
        let (bx0, by0, bx1, by1) = rotated_bounds(element);
        let clamp_x = |v: f64| v.clamp(0.0, f64::from(target.width())) as u32;
        let clamp_y = |v: f64| v.clamp(0.0, f64::from(target.height())) as u32;
        let (px0, px1) = (clamp_x(((bx0 - view.x) * sx).floor()), clamp_x(((bx1 - view.x) * sx).ceil()));
        let (py0, py1) = (clamp_y(((by0 - view.y) * sy).floor()), clamp_y(((by1 - view.y) * sy).ceil()));

        let (cx, cy) = (element.x + element.width / 2.0, element.y + element.height / 2.0);
        let (sin, cos) = element.rotation.to_radians().sin_cos();

        for py in py0..py1 {
            for px in px0..px1 {
                let dx = view.x + (f64::from(px) + 0.5) / sx - cx;
                let dy = view.y + (f64::from(py) + 0.5) / sy - cy;
                let u = dx * cos + dy * sin + element.width / 2.0;
                let v = -dx * sin + dy * cos + element.height / 2.0;
                if let Some(color) = paint.sample(element, u, v) {
                    blend(target.get_pixel_mut(px, py), color, alpha);
                }
            }
        }
    }
}

impl RenderSurface for RasterSurface {
    fn canvas_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn background(&self) -> Option<Rgba<u8>> {
        self.background
    }

    fn node_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        walk(&self.elements, &mut |e| ids.push(e.id.clone()));
        ids
    }

    fn opacity(&self, id: &str) -> Option<f32> {
        self.opacity.get(id).copied()
    }

    fn set_opacity(&mut self, id: &str, opacity: f32) -> Result<()> {
        let slot = self.opacity.get_mut(id).ok_or_else(|| DxError::NodeNotFound {
            element_id: id.to_string(),
        })?;
        *slot = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    fn capture_whole(&mut self, request: &CaptureRequest) -> Result<RgbaImage> {
        let (w, h) = request.pixel_size();
        let mut target = RgbaImage::from_pixel(w, h, request.background);
        self.paint(&mut target, &self.elements, &self.opacity, self.canvas_view(), 1.0);
        Ok(target)
    }

    fn mount_offscreen(
        &mut self,
        element_id: &str,
        framing: OffscreenFraming,
    ) -> Result<OffscreenMount> {
        let element = find_element(&self.elements, element_id)
            .cloned()
            .ok_or_else(|| DxError::NodeNotFound {
                element_id: element_id.to_string(),
            })?;

        let mut opacity = HashMap::new();
        walk(std::slice::from_ref(&element), &mut |e| {
            if let Some(value) = self.opacity.get(&e.id) {
                opacity.insert(e.id.clone(), *value);
            }
        });

        let view = match framing {
            OffscreenFraming::Canvas => self.canvas_view(),
            OffscreenFraming::Bounds => {
                let (x0, y0, x1, y1) = rotated_bounds(&element);
                View {
                    x: x0,
                    y: y0,
                    w: (x1 - x0).max(1.0),
                    h: (y1 - y0).max(1.0),
                }
            }
        };

        let id = OffscreenId(self.next_offscreen);
        self.next_offscreen += 1;
        self.offscreen.insert(
            id,
            Offscreen {
                element,
                opacity,
                view,
            },
        );
        trace!(?id, element_id, "Offscreen mounted");
        Ok(OffscreenMount {
            id,
            width: view.w,
            height: view.h,
        })
    }

    fn capture_offscreen(&mut self, id: OffscreenId, request: &CaptureRequest) -> Result<RgbaImage> {
        let offscreen = self.offscreen.get(&id).ok_or_else(|| {
            DxError::SurfaceUnavailable(format!("offscreen container {} is not mounted", id.0))
        })?;
        let (w, h) = request.pixel_size();
        let mut target = RgbaImage::from_pixel(w, h, request.background);
        self.paint(
            &mut target,
            std::slice::from_ref(&offscreen.element),
            &offscreen.opacity,
            offscreen.view,
            1.0,
        );
        Ok(target)
    }

    fn unmount_offscreen(&mut self, id: OffscreenId) {
        if self.offscreen.remove(&id).is_some() {
            trace!(?id, "Offscreen unmounted");
        }
    }

    async fn tick(&mut self) {
        self.ticks += 1;
        tokio::task::yield_now().await;
    }
}

/// Resolved colors for one element.
struct Paint<'a> {
    fill: Option<Rgba<u8>>,
    stroke: Option<(Rgba<u8>, f64)>,
    image: Option<&'a RgbaImage>,
}

impl<'a> Paint<'a> {
    fn for_element(element: &Element, image: Option<&'a RgbaImage>) -> Self {
        let color = |spec: Option<&str>| spec.and_then(|s| parse_color(s).ok());
        let mut fill = color(element.fill.as_deref());
        if fill.is_none() && matches!(element.kind, ElementKind::Text | ElementKind::Line) {
            fill = Some(Rgba([0, 0, 0, 255]));
        }
        let stroke = color(element.stroke.as_deref())
            .map(|c| (c, element.stroke_width.unwrap_or(1.0).max(0.0)));
        Self {
            fill,
            stroke,
            image,
        }
    }

    fn is_empty(&self) -> bool {
        self.fill.is_none() && self.stroke.is_none() && self.image.is_none()
    }

    /// Color at local coordinates `(u, v)`, origin at the element's top-left.
    fn sample(&self, element: &Element, u: f64, v: f64) -> Option<Rgba<u8>> {
        let (w, h) = (element.width, element.height);
        match element.kind {
            ElementKind::Rectangle | ElementKind::Text | ElementKind::Group => {
                if !(0.0..=w).contains(&u) || !(0.0..=h).contains(&v) {
                    return None;
                }
                let edge = u.min(w - u).min(v).min(h - v);
                self.stroke_or_fill(edge)
            }
            ElementKind::Ellipse => {
                let (rx, ry) = (w / 2.0, h / 2.0);
                if rx <= 0.0 || ry <= 0.0 {
                    return None;
                }
                let (nx, ny) = ((u - rx) / rx, (v - ry) / ry);
                let d = nx.hypot(ny);
                if d > 1.0 {
                    return None;
                }
                self.stroke_or_fill((1.0 - d) * rx.min(ry))
            }
            ElementKind::Triangle => {
                if !(0.0..=h).contains(&v) || h <= 0.0 {
                    return None;
                }
                let half = (v / h) * (w / 2.0);
                if (u - w / 2.0).abs() > half {
                    return None;
                }
                self.stroke_or_fill(h - v)
            }
            ElementKind::Line => {
                let thickness = self.stroke.map_or(2.0, |(_, sw)| sw.max(1.0));
                if distance_to_segment(u, v, w, h) > thickness / 2.0 {
                    return None;
                }
                self.stroke.map(|(c, _)| c).or(self.fill)
            }
            ElementKind::Image => {
                if !(0.0..w).contains(&u) || !(0.0..h).contains(&v) {
                    return None;
                }
                let Some(bitmap) = self.image else {
                    return self.fill;
                };
                let ix = ((u / w) * f64::from(bitmap.width())) as u32;
                let iy = ((v / h) * f64::from(bitmap.height())) as u32;
                Some(*bitmap.get_pixel(
                    ix.min(bitmap.width() - 1),
                    iy.min(bitmap.height() - 1),
                ))
            }
        }
    }

    fn stroke_or_fill(&self, distance_to_edge: f64) -> Option<Rgba<u8>> {
        match self.stroke {
            Some((color, width)) if distance_to_edge < width => Some(color),
            _ => self.fill,
        }
    }
}

fn decode_image(element: &Element) -> Option<RgbaImage> {
    let src = element.src.as_deref()?;
    let payload = decode_payload(src).ok()?;
    match image::load_from_memory(&payload.bytes) {
        Ok(img) => Some(img.to_rgba8()),
        Err(e) => {
            debug!(id = %element.id, error = %e, "Image element not decodable, painting fill");
            None
        }
    }
}

/// Axis-aligned bounds of an element after rotation about its center.
fn rotated_bounds(element: &Element) -> (f64, f64, f64, f64) {
    let (cx, cy) = (element.x + element.width / 2.0, element.y + element.height / 2.0);
    let (sin, cos) = element.rotation.to_radians().sin_cos();
    let (hw, hh) = (element.width / 2.0, element.height / 2.0);
    let ex = (hw * cos).abs() + (hh * sin).abs();
    let ey = (hw * sin).abs() + (hh * cos).abs();
    (cx - ex, cy - ey, cx + ex, cy + ey)
}

fn distance_to_segment(u: f64, v: f64, w: f64, h: f64) -> f64 {
    let len2 = w.mul_add(w, h * h);
    if len2 == 0.0 {
        return u.hypot(v);
    }
    let t = (u.mul_add(w, v * h) / len2).clamp(0.0, 1.0);
    (u - t * w).hypot(v - t * h)
}

/// Source-over compositing of a straight-alpha color scaled by `alpha`.
fn blend(dst: &mut Rgba<u8>, src: Rgba<u8>, alpha: f32) {
    let sa = f32::from(src[3]) / 255.0 * alpha;
    if sa <= 0.0 {
        return;
    }
    let da = f32::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let sc = f32::from(src[c]);
        let dc = f32::from(dst[c]);
        let value = (sc * sa + dc * da * (1.0 - sa)) / out_a;
        dst[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
