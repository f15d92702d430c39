//! Design export library - project archives and multi-mode export for
//! canvas designs.
//!
//! This library exposes the core functionality of the `dx` CLI for use in
//! tests and embedding editors.
//!
//! # Modules
//!
//! - `archive`: `.dxproj` codec with content-addressed, deduplicated assets
//! - `model`: Element tree, project documents and scene files
//! - `render`: Render-surface abstraction, capture and layer isolation
//! - `sequence`: Frame-sequence rendering and video encoders
//! - `export`: Export orchestration over one serialized surface
//! - `settings`: Editor/export defaults behind an injectable store
//! - `error`: Error types with user-recoverable hints
//! - `output`: Output mode abstraction (robot/human)
#![forbid(unsafe_code)]

pub mod archive;
pub mod cli;
pub mod error;
pub mod export;
pub mod logging;
pub mod model;
pub mod output;
pub mod render;
pub mod sequence;
pub mod settings;

pub use error::{DxError, Result};
