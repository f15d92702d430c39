//! Project-level documents stored alongside the element tree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::settings::{EditorDefaults, ExportDefaults};

/// Folder names inside a project archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderLayout {
    pub canvas: String,
    pub properties: String,
    pub shapes: String,
    pub keyframes: String,
    pub assets: String,
}

impl Default for FolderLayout {
    fn default() -> Self {
        Self {
            canvas: "canvas".to_string(),
            properties: "properties".to_string(),
            shapes: "shapes".to_string(),
            keyframes: "keyframes".to_string(),
            assets: "assets".to_string(),
        }
    }
}

/// Item counts recorded in the manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCounts {
    pub elements: usize,
    pub animations: usize,
    pub images: usize,
    pub fonts: usize,
    pub videos: usize,
}

/// Who saved the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// `manifest.json`: identity, schema version and counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub schema_version: u32,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default)]
    pub folder_layout: FolderLayout,
    #[serde(default)]
    pub counts: ProjectCounts,
    /// Top-level element ids in display order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape_order: Vec<String>,
}

/// Canvas measurement unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasUnit {
    #[default]
    Px,
    Mm,
    Cm,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    pub enabled: bool,
    pub size: u32,
    pub snap: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            size: 10,
            snap: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pan {
    pub x: f64,
    pub y: f64,
}

/// `canvas/canvas.json`, round-tripped verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectCanvas {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(default)]
    pub unit: CanvasUnit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pan: Option<Pan>,
}

impl Default for ProjectCanvas {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 30,
            unit: CanvasUnit::Px,
            background: Some("#ffffff".to_string()),
            grid: GridSettings::default(),
            zoom: None,
            pan: None,
        }
    }
}

/// Free-form project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default = "default_version_label")]
    pub version_label: String,
}

fn default_version_label() -> String {
    "1.0.0".to_string()
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            description: None,
            thumbnail: None,
            protected: false,
            version_label: default_version_label(),
        }
    }
}

/// `properties/properties.json`: editor and export defaults plus metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectProperties {
    #[serde(default)]
    pub editor: EditorDefaults,
    #[serde(default)]
    pub export: ExportDefaults,
    #[serde(default)]
    pub metadata: ProjectMetadata,
}

/// One animation track. Only the owning element id is interpreted here;
/// the rest belongs to the animation collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationTrack {
    pub element_id: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

/// `keyframes/<elementId>_keyframes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeKeyframes {
    pub element_id: String,
    pub animations: Vec<AnimationTrack>,
}

/// Group tracks by owning element, keeping each element's track order.
pub fn group_tracks(tracks: &[AnimationTrack]) -> BTreeMap<String, Vec<AnimationTrack>> {
    let mut grouped: BTreeMap<String, Vec<AnimationTrack>> = BTreeMap::new();
    for track in tracks {
        grouped
            .entry(track.element_id.clone())
            .or_default()
            .push(track.clone());
    }
    grouped
}
