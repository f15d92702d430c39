//! Export orchestration: canvas image, shape zip, selection, stacked layers
//! and video.

mod artifact;
mod estimate;
mod manager;
mod progress;

pub use artifact::ExportArtifact;
pub use estimate::{ExportMode, estimate_duration};
pub use manager::{ExportManager, Stage, VideoExport};
pub use progress::{ExportProgress, ExportStatus};
