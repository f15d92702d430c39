//! CLI argument definitions and command dispatch.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::render::ImageFormat;
use crate::sequence::EncoderKind;

/// dx - Project archives and image/layer/video export for canvas designs.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "dx", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)] // CLI flags naturally use multiple bools
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "DX_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Directory holding editor/export settings (default: platform config dir)
    #[arg(long, global = true, env = "DX_SETTINGS_DIR", value_name = "DIR")]
    pub settings_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Project Archives ===
    /// Pack a scene document (JSON or YAML) into a project archive
    Save(SaveArgs),

    /// Load a project archive and summarise it
    Info(InfoArgs),

    // === Still Exports ===
    /// Export the whole canvas as one image
    Canvas(ImageExportArgs),

    /// Export every visible shape as its own image, zipped
    Shapes(ShapesArgs),

    /// Export selected elements (one image, or a zip for several)
    Selection(SelectionArgs),

    /// Export each top-level layer in isolation, zipped in display order
    Stacked(ImageExportArgs),

    // === Video ===
    /// Render the animated design to a video
    Video(VideoArgs),

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct SaveArgs {
    /// Scene document (.json, .yaml or .yml)
    #[arg(value_name = "SCENE")]
    pub scene: PathBuf,

    /// Output archive path (defaults to the scene path with a .dxproj extension)
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Author name recorded in the manifest
    #[arg(long)]
    pub author: Option<String>,
}

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Project archive
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// List every top-level element
    #[arg(long, short = 'l')]
    pub long: bool,
}

/// Options shared by the still-image exports.
#[derive(Args, Debug, Clone)]
pub struct ImageExportArgs {
    /// Project archive
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Output file or existing directory
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Export width in design units (defaults to the canvas width)
    #[arg(long)]
    pub width: Option<u32>,

    /// Export height in design units (defaults to the canvas height)
    #[arg(long)]
    pub height: Option<u32>,

    /// Pixel density multiplier (defaults to the export settings, 2x)
    #[arg(long)]
    pub scale: Option<f32>,

    /// Image format (defaults to the export settings)
    #[arg(long, value_enum)]
    pub image_format: Option<ImageFormat>,

    /// JPEG quality 1-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Background color override (#RRGGBB, #RRGGBBAA or a name)
    #[arg(long, conflicts_with = "transparent")]
    pub background: Option<String>,

    /// Leave the background out entirely
    #[arg(long)]
    pub transparent: bool,
}

#[derive(Parser, Debug)]
pub struct ShapesArgs {
    #[command(flatten)]
    pub export: ImageExportArgs,

    /// Keep each shape at its canvas position instead of cropping to it
    #[arg(long)]
    pub full_canvas: bool,
}

#[derive(Parser, Debug)]
pub struct SelectionArgs {
    #[command(flatten)]
    pub export: ImageExportArgs,

    /// Element id to export (repeatable)
    #[arg(long = "id", value_name = "ID")]
    pub ids: Vec<String>,

    /// Keep each element at its canvas position instead of cropping to it
    #[arg(long)]
    pub full_canvas: bool,
}

#[derive(Parser, Debug)]
pub struct VideoArgs {
    /// Project archive
    #[arg(value_name = "PROJECT")]
    pub project: PathBuf,

    /// Output file or existing directory
    #[arg(long, short = 'o')]
    pub output: PathBuf,

    /// Frames per second (defaults to the canvas fps)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=240))]
    pub fps: Option<u32>,

    /// Duration in seconds (defaults to the last keyframe, or 1s)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<f64>,

    /// Export width in design units
    #[arg(long)]
    pub width: Option<u32>,

    /// Export height in design units
    #[arg(long)]
    pub height: Option<u32>,

    /// Pixel density multiplier (defaults to 1x for video)
    #[arg(long)]
    pub scale: Option<f32>,

    /// Encoder (defaults to the export settings)
    #[arg(long, value_enum)]
    pub encoder: Option<EncoderKind>,
}

/// Longest `--duration` accepted, in seconds.
pub const MAX_DURATION_SECS: f64 = 600.0;

fn parse_duration(value: &str) -> Result<f64, String> {
    let secs: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number of seconds"))?;
    if !secs.is_finite() || secs <= 0.0 || secs > MAX_DURATION_SECS {
        return Err(format!(
            "duration must be greater than 0 and at most {MAX_DURATION_SECS} seconds"
        ));
    }
    Ok(secs)
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
