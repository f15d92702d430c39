//! Robot mode JSON output implementation.

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::error::DxError;

use super::{ExportSummary, Output, ProjectSummary, RobotFormat, SaveSummary};

/// JSON output implementation for AI agents and scripting.
pub struct RobotOutput {
    format: RobotFormat,
}

impl RobotOutput {
    #[instrument]
    pub fn new(format: RobotFormat) -> Self {
        debug!(?format, "Creating RobotOutput");
        Self { format }
    }

    fn render<T: Serialize + ?Sized>(&self, data: &T) -> Option<String> {
        let json = match self.format {
            RobotFormat::Json => serde_json::to_string_pretty(data),
            RobotFormat::JsonCompact => serde_json::to_string(data),
        };
        match json {
            Ok(json) => {
                trace!(json_len = json.len(), "JSON serialized");
                Some(json)
            }
            Err(e) => {
                warn!(error = %e, "JSON serialization failed");
                None
            }
        }
    }

    /// Output any serializable data as JSON to stdout.
    fn output_json<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(json) = self.render(data) {
            println!("{json}");
        }
    }

    /// Errors go to stderr so stdout stays a clean result stream.
    fn output_json_stderr<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(json) = self.render(data) {
            eprintln!("{json}");
        }
    }
}

impl Output for RobotOutput {
    #[instrument(skip(self))]
    fn error(&self, error: &DxError) {
        debug!(error = %error, "Robot: error");
        self.output_json_stderr(&serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        }));
    }

    #[instrument(skip(self, summary), fields(path = %summary.path))]
    fn project_saved(&self, summary: &SaveSummary) {
        debug!("Robot: project_saved");
        self.output_json(summary);
    }

    #[instrument(skip(self, summary), fields(path = %summary.path))]
    fn project_info(&self, summary: &ProjectSummary) {
        debug!("Robot: project_info");
        self.output_json(summary);
    }

    #[instrument(skip(self, summary), fields(mode = summary.mode))]
    fn export_written(&self, summary: &ExportSummary) {
        debug!("Robot: export_written");
        self.output_json(summary);
    }

    #[instrument(skip(self))]
    fn video_cancelled(&self, frames_captured: u32) {
        self.output_json(&serde_json::json!({
            "cancelled": true,
            "frames_captured": frames_captured
        }));
    }

    #[instrument(skip(self))]
    fn version_info(&self, version: &str, git_sha: Option<&str>, build_time: Option<&str>) {
        self.output_json(&serde_json::json!({
            "version": version,
            "git_sha": git_sha,
            "build_time": build_time,
        }));
    }
}
