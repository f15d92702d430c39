//! In-memory design model.
//!
//! The element tree is owned by the editing layer; this crate only reads it
//! (or returns rewritten copies). The project documents mirror the files
//! stored in a `.dxproj` archive.

mod element;
mod project;
mod scene;

pub use element::{
    Element, ElementKind, count_elements, find_element, visible_leaves, walk, walk_mut,
};
pub use project::{
    AnimationTrack, Author, CanvasUnit, FolderLayout, GridSettings, Pan, ProjectCanvas,
    ProjectCounts, ProjectManifest, ProjectMetadata, ProjectProperties, ShapeKeyframes,
    group_tracks,
};
pub use scene::SceneDocument;
