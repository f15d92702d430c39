//! Scene documents: a whole design in one JSON or YAML file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::element::Element;
use super::project::{AnimationTrack, Author, ProjectCanvas, ProjectProperties};
use crate::error::{DxError, Result};

/// Editable, single-file form of a design that `dx save` packs into an
/// archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
    #[serde(default)]
    pub canvas: ProjectCanvas,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ProjectProperties>,
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub animations: Vec<AnimationTrack>,
}

impl SceneDocument {
    /// Read a scene file; `.yaml`/`.yml` parse as YAML, everything else as JSON.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DxError::ProjectNotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        debug!(path = %path.display(), yaml = is_yaml, "Parsing scene document");
        if is_yaml {
            Self::from_yaml(&text)
        } else {
            Self::from_json(&text)
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| DxError::SceneParse(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| DxError::SceneParse(e.to_string()))
    }
}
