//! Output mode abstraction for robot and human output.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::{LoadWarning, LoadedProject, SavedProject};
use crate::cli::Cli;
use crate::error::DxError;
use crate::export::ExportArtifact;
use crate::model::{Element, ElementKind, ProjectCounts, count_elements};

pub mod human;
pub mod robot;

pub use human::HumanOutput;
pub use robot::RobotOutput;

// === Result Types ===

/// Canvas dimensions as reported by `dx info`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CanvasSummary {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// One top-level element in a project listing.
#[derive(Debug, Clone, Serialize)]
pub struct ElementSummary {
    pub id: String,
    pub kind: ElementKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub visible: bool,
    /// Elements in this subtree, including this one.
    pub nodes: usize,
}

impl ElementSummary {
    #[must_use]
    pub fn from_element(element: &Element) -> Self {
        Self {
            id: element.id.clone(),
            kind: element.kind,
            name: element.name.clone(),
            visible: element.visible,
            nodes: count_elements(std::slice::from_ref(element)),
        }
    }
}

/// Everything `dx info` reports about an archive.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub path: String,
    pub name: String,
    pub project_id: String,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub canvas: CanvasSummary,
    pub counts: ProjectCounts,
    /// Elements whose payload lives in the asset store.
    pub asset_refs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elements: Option<Vec<ElementSummary>>,
    pub warnings: Vec<LoadWarning>,
}

impl ProjectSummary {
    /// Summarise a loaded project; `list_elements` adds the top-level listing.
    #[must_use]
    pub fn new(path: &Path, project: &LoadedProject, list_elements: bool) -> Self {
        let manifest = &project.manifest;
        Self {
            path: path.display().to_string(),
            name: manifest.name.clone(),
            project_id: manifest.project_id.clone(),
            schema_version: manifest.schema_version,
            created_at: manifest.created_at,
            updated_at: manifest.updated_at,
            canvas: CanvasSummary {
                width: project.canvas.width,
                height: project.canvas.height,
                fps: project.canvas.fps,
            },
            counts: manifest.counts,
            asset_refs: project.assets.images.len()
                + project.assets.fonts.len()
                + project.assets.videos.len(),
            elements: list_elements.then(|| {
                project
                    .elements
                    .iter()
                    .map(ElementSummary::from_element)
                    .collect()
            }),
            warnings: project.warnings.clone(),
        }
    }
}

/// Result of `dx save`.
#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub path: String,
    pub name: String,
    pub project_id: String,
    pub size: usize,
    pub counts: ProjectCounts,
    pub warnings: Vec<LoadWarning>,
}

impl SaveSummary {
    #[must_use]
    pub fn new(path: &Path, saved: &SavedProject) -> Self {
        Self {
            path: path.display().to_string(),
            name: saved.manifest.name.clone(),
            project_id: saved.manifest.project_id.clone(),
            size: saved.bytes.len(),
            counts: saved.manifest.counts,
            warnings: saved.warnings.clone(),
        }
    }
}

/// Result of any export written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub mode: &'static str,
    pub path: String,
    pub file_name: String,
    pub media_type: String,
    pub size: usize,
}

impl ExportSummary {
    #[must_use]
    pub fn new(mode: &'static str, path: &Path, artifact: &ExportArtifact) -> Self {
        Self {
            mode,
            path: path.display().to_string(),
            file_name: artifact.file_name.clone(),
            media_type: artifact.media_type.clone(),
            size: artifact.size(),
        }
    }
}

/// JSON formatting options for robot mode.
#[derive(Debug, Clone, Copy)]
pub enum RobotFormat {
    /// Pretty-printed JSON (default for --robot).
    Json,
    /// Single-line JSON (--format=json-compact).
    JsonCompact,
}

/// Determines how command output is rendered.
#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    /// JSON output for AI agents and scripting.
    Robot(RobotFormat),
    /// Styled terminal output for human users.
    Human { color: bool },
}

impl OutputMode {
    /// Create OutputMode from CLI arguments.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.use_json() {
            let format = if cli.use_compact_json() {
                RobotFormat::JsonCompact
            } else {
                RobotFormat::Json
            };
            Self::Robot(format)
        } else {
            Self::Human {
                color: !cli.no_color,
            }
        }
    }

    /// Returns true if output should be JSON.
    #[must_use]
    pub const fn is_robot(&self) -> bool {
        matches!(self, Self::Robot(_))
    }

    /// Convert into the appropriate Output implementation.
    #[must_use]
    pub fn into_output(self) -> Box<dyn Output> {
        match self {
            Self::Robot(format) => Box::new(RobotOutput::new(format)),
            Self::Human { color } => Box::new(HumanOutput::new(color)),
        }
    }
}

/// Trait for all output operations.
///
/// Commands call these methods without knowing the output mode.
pub trait Output {
    fn error(&self, error: &DxError);

    // Projects
    fn project_saved(&self, summary: &SaveSummary);
    fn project_info(&self, summary: &ProjectSummary);

    // Exports
    fn export_written(&self, summary: &ExportSummary);
    fn video_cancelled(&self, frames_captured: u32);

    // Metadata
    fn version_info(&self, version: &str, git_sha: Option<&str>, build_time: Option<&str>);
}
