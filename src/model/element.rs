//! Element tree: the visual objects a design is made of.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of visual element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Triangle,
    Line,
    Text,
    Image,
    Group,
}

impl ElementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rectangle => "rectangle",
            Self::Ellipse => "ellipse",
            Self::Triangle => "triangle",
            Self::Line => "line",
            Self::Text => "text",
            Self::Image => "image",
            Self::Group => "group",
        }
    }
}

const fn default_opacity() -> f32 {
    1.0
}

const fn default_true() -> bool {
    true
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde skip_serializing_if signature
fn is_full_opacity(value: &f32) -> bool {
    (*value - 1.0).abs() < f32::EPSILON
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_true(value: &bool) -> bool {
    *value
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &f64) -> bool {
    *value == 0.0
}

/// A node in the design tree.
///
/// Group elements carry `children`; image elements carry an inline
/// `data:` URL in `src`. Properties this crate does not model (text
/// content, fonts, corner radii, ...) round-trip through `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub rotation: f64,

    #[serde(default = "default_opacity", skip_serializing_if = "is_full_opacity")]
    pub opacity: f32,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub locked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,

    /// Image source: an inline `data:` URL, an asset placeholder token
    /// while inside an archive, or an external URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub natural_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Element {
    /// Create an element with default style at the given geometry.
    pub fn new(id: impl Into<String>, kind: ElementKind, x: f64, y: f64, w: f64, h: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            x,
            y,
            width: w,
            height: h,
            rotation: 0.0,
            opacity: 1.0,
            visible: true,
            locked: false,
            fill: None,
            stroke: None,
            stroke_width: None,
            src: None,
            natural_width: None,
            natural_height: None,
            original_name: None,
            children: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Create a group holding `children`.
    pub fn group(id: impl Into<String>, children: Vec<Self>) -> Self {
        let mut group = Self::new(id, ElementKind::Group, 0.0, 0.0, 0.0, 0.0);
        group.children = children;
        group.fit_to_children();
        group
    }

    #[must_use]
    pub fn with_fill(mut self, fill: impl Into<String>) -> Self {
        self.fill = Some(fill.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub const fn is_group(&self) -> bool {
        matches!(self.kind, ElementKind::Group)
    }

    /// True when `src` holds an inline payload that belongs in the asset store.
    pub fn has_embedded_payload(&self) -> bool {
        self.src.as_deref().is_some_and(|s| s.starts_with("data:"))
    }

    /// Display label used in exported file names.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind.as_str())
    }

    /// Resize a group's box to the union of its children's boxes.
    pub fn fit_to_children(&mut self) {
        let Some((x0, y0, x1, y1)) = self.children.iter().fold(None, |acc, c| {
            let (cx0, cy0, cx1, cy1) = (c.x, c.y, c.x + c.width, c.y + c.height);
            Some(match acc {
                None => (cx0, cy0, cx1, cy1),
                Some((ax0, ay0, ax1, ay1)) => (
                    f64::min(ax0, cx0),
                    f64::min(ay0, cy0),
                    f64::max(ax1, cx1),
                    f64::max(ay1, cy1),
                ),
            })
        }) else {
            return;
        };
        self.x = x0;
        self.y = y0;
        self.width = x1 - x0;
        self.height = y1 - y0;
    }

    /// This element's id followed by every descendant id, depth-first.
    pub fn subtree_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids(&self, out: &mut Vec<String>) {
        out.push(self.id.clone());
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    /// Find an element in this subtree by id.
    pub fn find(&self, id: &str) -> Option<&Self> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Mutable lookup in this subtree by id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Self> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter_mut().find_map(|c| c.find_mut(id))
    }
}

/// Depth-first walk over a forest of elements.
pub fn walk<'a>(elements: &'a [Element], f: &mut impl FnMut(&'a Element)) {
    for element in elements {
        f(element);
        walk(&element.children, f);
    }
}

/// Mutable depth-first walk over a forest of elements.
pub fn walk_mut(elements: &mut [Element], f: &mut impl FnMut(&mut Element)) {
    for element in elements {
        f(element);
        walk_mut(&mut element.children, f);
    }
}

/// Find an element anywhere in a forest.
pub fn find_element<'a>(elements: &'a [Element], id: &str) -> Option<&'a Element> {
    elements.iter().find_map(|e| e.find(id))
}

/// Count every element in a forest, descendants included.
pub fn count_elements(elements: &[Element]) -> usize {
    let mut n = 0;
    walk(elements, &mut |_| n += 1);
    n
}

/// Non-group elements whose whole ancestor chain is visible, in paint order.
pub fn visible_leaves(elements: &[Element]) -> Vec<&Element> {
    fn go<'a>(elements: &'a [Element], out: &mut Vec<&'a Element>) {
        for element in elements.iter().filter(|e| e.visible) {
            if element.is_group() {
                go(&element.children, out);
            } else {
                out.push(element);
            }
        }
    }
    let mut out = Vec::new();
    go(elements, &mut out);
    out
}
