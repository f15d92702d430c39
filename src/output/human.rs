//! Human-friendly output implementation using console styling.

use console::{Style, style};
use tracing::{debug, instrument, trace};

use crate::error::DxError;

use super::{ExportSummary, Output, ProjectSummary, SaveSummary};

/// Styles shared by every human-facing message.
#[derive(Debug, Clone)]
struct Theme {
    success: Style,
    error: Style,
    warning: Style,
    accent: Style,
    label: Style,
    muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warning: Style::new().yellow().bold(),
            accent: Style::new().cyan().bold(),
            label: Style::new().cyan(),
            muted: Style::new().dim(),
        }
    }
}

/// Styled terminal output implementation for human users.
pub struct HumanOutput {
    theme: Theme,
}

impl HumanOutput {
    #[instrument]
    pub fn new(color: bool) -> Self {
        debug!("Creating HumanOutput");
        if !color {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        Self {
            theme: Theme::default(),
        }
    }

    fn success(&self, message: &str) {
        println!("{} {message}", self.theme.success.apply_to("[OK]"));
    }

    fn warning(&self, message: &str) {
        println!("{} {message}", self.theme.warning.apply_to("[WARN]"));
    }

    fn field(&self, name: &str, value: impl std::fmt::Display) {
        println!("  {} {value}", self.theme.label.apply_to(format!("{name:<10}")));
    }
}

/// `1536` -> `1.5 KiB`.
fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

impl Output for HumanOutput {
    #[instrument(skip(self))]
    fn error(&self, error: &DxError) {
        debug!(
            error = %error,
            recoverable = error.is_user_recoverable(),
            "Outputting error"
        );
        eprintln!(
            "{} {}",
            self.theme.error.apply_to("[ERR]"),
            style(error.to_string()).bold()
        );
        if let Some(suggestion) = error.suggestion() {
            trace!(suggestion, "Adding suggestion");
            eprintln!(
                "  {} {}",
                self.theme.label.apply_to("Suggestion:"),
                self.theme.muted.apply_to(suggestion)
            );
        }
    }

    #[instrument(skip(self, summary), fields(path = %summary.path))]
    fn project_saved(&self, summary: &SaveSummary) {
        self.success(&format!(
            "Saved '{}' to {} ({})",
            summary.name,
            summary.path,
            human_size(summary.size)
        ));
        let c = &summary.counts;
        self.field(
            "Contents",
            format!(
                "{} elements, {} animations, {} images, {} fonts, {} videos",
                c.elements, c.animations, c.images, c.fonts, c.videos
            ),
        );
        for warning in &summary.warnings {
            self.warning(&warning.message);
        }
    }

    #[instrument(skip(self, summary), fields(path = %summary.path))]
    fn project_info(&self, summary: &ProjectSummary) {
        println!("{}", self.theme.accent.apply_to(&summary.name));
        self.field("Id", &summary.project_id);
        self.field("Schema", summary.schema_version);
        self.field(
            "Canvas",
            format!(
                "{}x{} @ {} fps",
                summary.canvas.width, summary.canvas.height, summary.canvas.fps
            ),
        );
        self.field("Created", summary.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
        self.field("Updated", summary.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
        let c = &summary.counts;
        self.field(
            "Contents",
            format!(
                "{} elements, {} animations, {} images, {} fonts, {} videos",
                c.elements, c.animations, c.images, c.fonts, c.videos
            ),
        );

        if let Some(elements) = &summary.elements {
            println!();
            for element in elements {
                let hidden = if element.visible { "" } else { " (hidden)" };
                println!(
                    "  {} {} {}{}",
                    style(format!("{:<10}", element.kind.as_str())).dim(),
                    element.id,
                    element.name.as_deref().unwrap_or(""),
                    self.theme.muted.apply_to(hidden)
                );
            }
        }

        for warning in &summary.warnings {
            self.warning(&warning.message);
        }
    }

    #[instrument(skip(self, summary), fields(mode = summary.mode))]
    fn export_written(&self, summary: &ExportSummary) {
        self.success(&format!(
            "Exported {} to {} ({}, {})",
            summary.mode,
            summary.path,
            summary.media_type,
            human_size(summary.size)
        ));
    }

    #[instrument(skip(self))]
    fn video_cancelled(&self, frames_captured: u32) {
        self.warning(&format!(
            "Video export cancelled after {frames_captured} frames; nothing written"
        ));
    }

    #[instrument(skip(self))]
    fn version_info(&self, version: &str, git_sha: Option<&str>, build_time: Option<&str>) {
        println!("{} {}", self.theme.accent.apply_to("dx"), version);
        if let Some(sha) = git_sha {
            let dirty = matches!(option_env!("VERGEN_GIT_DIRTY"), Some("true"));
            if dirty {
                self.field("Git SHA", format!("{sha} {}", self.theme.warning.apply_to("(dirty)")));
            } else {
                self.field("Git SHA", sha);
            }
        }
        if let Some(time) = build_time {
            self.field("Built", self.theme.muted.apply_to(time));
        }
        if let Some(rustc) = option_env!("VERGEN_RUSTC_SEMVER") {
            self.field("Rust", self.theme.muted.apply_to(rustc));
        }
        if let Some(target) = option_env!("VERGEN_CARGO_TARGET_TRIPLE") {
            self.field("Target", self.theme.muted.apply_to(target));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1023), "1023 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
