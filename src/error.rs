//! Error types for project archive and export operations.

use thiserror::Error;

/// Primary error type for archive and export operations.
#[derive(Error, Debug)]
pub enum DxError {
    // Archive errors
    #[error("Project archive has no manifest.json")]
    MissingManifest,

    #[error(
        "Project schema version {found} is newer than supported version {supported}; upgrade required"
    )]
    SchemaTooNew { found: u32, supported: u32 },

    #[error("Project archive has no canvas/canvas.json")]
    MissingCanvas,

    #[error("Corrupt project archive: {0}")]
    CorruptArchive(String),

    #[error("Project file not found: {path}")]
    ProjectNotFound { path: String },

    #[error("Scene document parse error: {0}")]
    SceneParse(String),

    // Packaging errors
    #[error("Nothing to package: export produced no files")]
    EmptyPackage,

    #[error("Duplicate entry '{name}' in package")]
    DuplicateEntry { name: String },

    // Capture errors
    #[error("Render node not found for element '{element_id}'")]
    NodeNotFound { element_id: String },

    #[error("Render surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Invalid capture size {width}x{height}")]
    InvalidCaptureSize { width: u32, height: u32 },

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    // Export errors
    #[error("No visible shapes to export")]
    NoVisibleShapes,

    #[error("No elements selected")]
    NothingSelected,

    #[error("Invalid sequence settings: {0}")]
    InvalidSequence(String),

    #[error("Time seek to {time:.3}s failed: {reason}")]
    SeekFailed { time: f64, reason: String },

    #[error("Video encoding failed: {0}")]
    Encoding(String),

    // Settings errors
    #[error("Settings store error: {0}")]
    Settings(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl DxError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::SchemaTooNew { .. }
                | Self::ProjectNotFound { .. }
                | Self::SceneParse(_)
                | Self::NoVisibleShapes
                | Self::NothingSelected
                | Self::NodeNotFound { .. }
                | Self::InvalidCaptureSize { .. }
                | Self::InvalidSequence(_)
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::SchemaTooNew { .. } => Some("Update dx to a newer release to open this project"),
            Self::ProjectNotFound { .. } => Some("Check the project path"),
            Self::NoVisibleShapes => Some("Make at least one non-group element visible"),
            Self::NothingSelected => Some("Pass one or more --id flags"),
            Self::NodeNotFound { .. } => Some("Check the element id with: dx info <project>"),
            Self::Encoding(_) => Some("Try --encoder gif, or ensure ffmpeg is on PATH"),
            _ => None,
        }
    }

    /// Returns true if this error aborts an archive load as a whole.
    pub const fn is_archive_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingManifest
                | Self::SchemaTooNew { .. }
                | Self::MissingCanvas
                | Self::CorruptArchive(_)
        )
    }
}

/// Convenience type alias for Results using DxError.
pub type Result<T> = std::result::Result<T, DxError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| DxError::Other(format!("{}: {e}", f().into())))
    }
}
