//! Test fixture helpers for elements, image payloads and project archives.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use tempfile::TempDir;

use dx::archive::hasher::data_url;
use dx::archive::{ProjectArchiveCodec, SaveRequest, unpack};
use dx::model::{AnimationTrack, Element, ElementKind, ProjectCanvas};

/// Small canvas so raster captures stay cheap.
#[must_use]
pub fn canvas(width: u32, height: u32) -> ProjectCanvas {
    ProjectCanvas {
        width,
        height,
        fps: 24,
        ..ProjectCanvas::default()
    }
}

#[must_use]
pub fn rect(id: &str, x: f64, y: f64, w: f64, h: f64, fill: &str) -> Element {
    Element::new(id, ElementKind::Rectangle, x, y, w, h).with_fill(fill)
}

/// Encoded PNG of a solid color.
#[must_use]
pub fn png_bytes(color: [u8; 4], width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    out.into_inner()
}

#[must_use]
pub fn png_data_url(color: [u8; 4], width: u32, height: u32) -> String {
    data_url("image/png", &png_bytes(color, width, height))
}

#[must_use]
pub fn image_element(id: &str, x: f64, y: f64, src: String) -> Element {
    let mut element = Element::new(id, ElementKind::Image, x, y, 4.0, 4.0).with_src(src);
    element.natural_width = Some(4);
    element.natural_height = Some(4);
    element
}

/// One `opacity` track from `from` to `to` over `seconds`.
#[must_use]
pub fn opacity_track(element_id: &str, from: f64, to: f64, seconds: f64) -> AnimationTrack {
    let value = json!({
        "elementId": element_id,
        "property": "opacity",
        "keyframes": [
            { "time": 0.0, "value": from },
            { "time": seconds, "value": to },
        ]
    });
    serde_json::from_value(value).expect("Invalid track fixture")
}

/// Three side-by-side layers: red, green (half opacity), blue.
#[must_use]
pub fn three_layers() -> Vec<Element> {
    let mut green = rect("green", 10.0, 0.0, 10.0, 10.0, "#00ff00").with_name("Green");
    green.opacity = 0.5;
    vec![
        rect("red", 0.0, 0.0, 10.0, 10.0, "#ff0000").with_name("Red"),
        green,
        rect("blue", 20.0, 0.0, 10.0, 10.0, "#0000ff").with_name("Blue"),
    ]
}

/// A saved project archive in a temporary directory.
pub struct TestProject {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestProject {
    #[must_use]
    pub fn save(name: &str, elements: &[Element], animations: &[AnimationTrack]) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join("project.dxproj");
        let canvas = canvas(30, 10);
        let request = SaveRequest::new(name, elements, &canvas).with_animations(animations);
        ProjectArchiveCodec::new()
            .save_file(&request, &path)
            .expect("Failed to save project fixture");
        Self { dir, path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn out_dir(&self) -> PathBuf {
        let out = self.dir.path().join("out");
        std::fs::create_dir_all(&out).expect("Failed to create output directory");
        out
    }
}

/// Entry names of a zip, in archive order.
#[must_use]
pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    unpack(bytes)
        .expect("Invalid zip")
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}
