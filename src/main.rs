//! dx - Project archives and multi-mode export for canvas designs.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::path::Path;

use clap::{CommandFactory, Parser};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, info, warn};

use dx::archive::{PROJECT_EXTENSION, ProjectArchiveCodec, SaveRequest};
use dx::cli::{self, Cli, Commands};
use dx::export::{ExportArtifact, ExportManager, VideoExport};
use dx::logging::init_logging;
use dx::model::{Author, SceneDocument};
use dx::output::{ExportSummary, Output, OutputMode, ProjectSummary, SaveSummary};
use dx::render::color::parse_color;
use dx::render::{
    CaptureSettings, KeyframeTimeline, OffscreenFraming, RasterSurface, Timeline,
};
use dx::sequence::{
    CancelHandle, EncoderKind, FfmpegEncoder, GifEncoder, SequencePhase, SequenceProgress,
    SequenceSettings, VideoEncoder,
};
use dx::settings::{FileSettingsStore, Settings};
use dx::Result;

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> Option<&'static str> {
        option_env!("VERGEN_GIT_SHA")
    }

    pub fn build_timestamp() -> Option<&'static str> {
        option_env!("VERGEN_BUILD_TIMESTAMP")
    }
}

/// Video duration when neither the flag nor the timeline supplies one.
const FALLBACK_VIDEO_SECONDS: f64 = 1.0;

type Manager = ExportManager<RasterSurface, KeyframeTimeline>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.use_json(), cli.verbose, cli.quiet);

    let output = OutputMode::from_cli(&cli).into_output();
    if let Err(e) = run(&cli, output.as_ref()).await {
        output.error(&e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli, output: &dyn Output) -> Result<()> {
    match &cli.command {
        None => {
            print_quick_start(cli);
            Ok(())
        }
        Some(Commands::Save(args)) => cmd_save(cli, args, output),
        Some(Commands::Info(args)) => cmd_info(args, output),
        Some(Commands::Canvas(args)) => cmd_canvas(cli, args, output).await,
        Some(Commands::Shapes(args)) => cmd_shapes(cli, args, output).await,
        Some(Commands::Selection(args)) => cmd_selection(cli, args, output).await,
        Some(Commands::Stacked(args)) => cmd_stacked(cli, args, output).await,
        Some(Commands::Video(args)) => cmd_video(cli, args, output).await,
        Some(Commands::Version) => {
            output.version_info(
                build_info::VERSION,
                build_info::git_sha(),
                build_info::build_timestamp(),
            );
            Ok(())
        }
        Some(Commands::Completions(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "dx", &mut std::io::stdout());
            Ok(())
        }
    }
}

// === Quick Start ===

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    commands: Vec<(&'static str, &'static str)>,
    output_modes: [&'static str; 3],
}

const QUICK_START: &[(&str, &str)] = &[
    ("dx save <SCENE> -o <PROJECT>", "Pack a JSON/YAML scene into a project archive"),
    ("dx info <PROJECT> --long", "Summarise a project archive"),
    ("dx canvas <PROJECT> -o out.png", "Export the whole canvas"),
    ("dx shapes <PROJECT> -o out/", "Export every visible shape, zipped"),
    ("dx selection <PROJECT> --id <ID> -o out/", "Export selected elements"),
    ("dx stacked <PROJECT> -o out/", "Export each layer in isolation, zipped"),
    ("dx video <PROJECT> -o out/ --encoder gif", "Render the animation to a video"),
];

fn print_quick_start(cli: &Cli) {
    if cli.use_json() {
        let help = RobotQuickStart {
            tool: "dx",
            version: build_info::VERSION,
            description: "Project archives and image/layer/video export for canvas designs",
            commands: QUICK_START.to_vec(),
            output_modes: [
                "--format=text (default)",
                "--robot or --format=json",
                "--format=json-compact",
            ],
        };
        match serde_json::to_string_pretty(&help) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!(error = %e, "Quick start serialization failed"),
        }
    } else {
        println!(
            "{} {} - design archive and export tool\n",
            style("dx").bold().cyan(),
            build_info::VERSION
        );
        for (command, what) in QUICK_START {
            println!("  {:<44} {}", style(command).green(), style(what).dim());
        }
        println!("\nRun {} for all options.", style("dx --help").bold());
    }
}

// === Settings & Projects ===

fn load_settings(cli: &Cli) -> Settings {
    let store = match &cli.settings_dir {
        Some(dir) => FileSettingsStore::new(dir.clone()),
        None => match FileSettingsStore::open_default() {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "No settings directory, using defaults");
                return Settings::default();
            }
        },
    };
    debug!(dir = %store.dir().display(), "Loading settings");
    Settings::load_from(&store)
}

/// Load an archive and stage its design on a fresh raster surface.
fn open_project(path: &Path) -> Result<(dx::archive::LoadedProject, Manager)> {
    let project = ProjectArchiveCodec::new().load_file(path)?;
    let surface = RasterSurface::new(&project.canvas, project.elements.clone());
    let timeline = KeyframeTimeline::from_tracks(&project.animations());
    let manager = ExportManager::new(surface, timeline).with_name(&project.manifest.name);
    info!(
        project = %project.manifest.name,
        elements = project.elements.len(),
        "Project opened"
    );
    Ok((project, manager))
}

fn capture_settings(
    args: &cli::ImageExportArgs,
    canvas: &dx::model::ProjectCanvas,
    settings: &Settings,
) -> Result<CaptureSettings> {
    let mut capture = CaptureSettings::for_canvas(canvas, &settings.export).with_size(
        args.width.unwrap_or(canvas.width),
        args.height.unwrap_or(canvas.height),
    );
    if let Some(scale) = args.scale {
        capture = capture.with_pixel_ratio(scale);
    }
    if let Some(format) = args.image_format {
        capture = capture.with_format(format);
    }
    if let Some(quality) = args.quality {
        capture.quality = quality;
    }
    if let Some(background) = &args.background {
        capture = capture.with_background(parse_color(background)?);
        capture.include_background = true;
    }
    if args.transparent {
        capture.include_background = false;
    }
    Ok(capture)
}

fn write_artifact(
    mode: &'static str,
    artifact: &ExportArtifact,
    target: &Path,
    output: &dyn Output,
) -> Result<()> {
    let path = artifact.write_to(target)?;
    output.export_written(&ExportSummary::new(mode, &path, artifact));
    Ok(())
}

fn log_progress(progress: &dx::export::ExportProgress) {
    debug!(
        current = progress.current,
        total = progress.total,
        status = ?progress.status,
        message = %progress.message,
        "Export progress"
    );
}

// === Commands ===

fn cmd_save(cli: &Cli, args: &cli::SaveArgs, output: &dyn Output) -> Result<()> {
    let scene = SceneDocument::from_path(&args.scene)?;
    let settings = load_settings(cli);
    let target = args
        .output
        .clone()
        .unwrap_or_else(|| args.scene.with_extension(PROJECT_EXTENSION));

    let fallback_properties = dx::model::ProjectProperties {
        editor: settings.editor,
        export: settings.export,
        ..Default::default()
    };
    let mut request = SaveRequest::new(&scene.name, &scene.elements, &scene.canvas)
        .with_animations(&scene.animations)
        .with_properties(scene.properties.as_ref().unwrap_or(&fallback_properties));
    let author = args
        .author
        .as_ref()
        .map(|name| Author {
            name: name.clone(),
            email: None,
        })
        .or_else(|| scene.author.clone());
    if let Some(author) = author {
        request = request.with_author(author);
    }

    let saved = ProjectArchiveCodec::new().save_file(&request, &target)?;
    output.project_saved(&SaveSummary::new(&target, &saved));
    Ok(())
}

fn cmd_info(args: &cli::InfoArgs, output: &dyn Output) -> Result<()> {
    let project = ProjectArchiveCodec::new().load_file(&args.project)?;
    output.project_info(&ProjectSummary::new(&args.project, &project, args.long));
    Ok(())
}

async fn cmd_canvas(cli: &Cli, args: &cli::ImageExportArgs, output: &dyn Output) -> Result<()> {
    let settings = load_settings(cli);
    let (project, manager) = open_project(&args.project)?;
    let capture = capture_settings(args, &project.canvas, &settings)?;
    let artifact = manager.export_canvas(&capture, log_progress).await?;
    write_artifact("canvas", &artifact, &args.output, output)
}

async fn cmd_shapes(cli: &Cli, args: &cli::ShapesArgs, output: &dyn Output) -> Result<()> {
    let settings = load_settings(cli);
    let (project, manager) = open_project(&args.export.project)?;
    let manager = manager.with_framing(framing(args.full_canvas));
    let capture = capture_settings(&args.export, &project.canvas, &settings)?;
    let artifact = manager
        .export_shapes_as_zip(&project.elements, &capture, log_progress)
        .await?;
    write_artifact("shapes", &artifact, &args.export.output, output)
}

async fn cmd_selection(cli: &Cli, args: &cli::SelectionArgs, output: &dyn Output) -> Result<()> {
    let settings = load_settings(cli);
    let (project, manager) = open_project(&args.export.project)?;
    let manager = manager.with_framing(framing(args.full_canvas));
    let capture = capture_settings(&args.export, &project.canvas, &settings)?;
    let artifact = manager
        .export_selection(&project.elements, &args.ids, &capture, log_progress)
        .await?;
    write_artifact("selection", &artifact, &args.export.output, output)
}

async fn cmd_stacked(cli: &Cli, args: &cli::ImageExportArgs, output: &dyn Output) -> Result<()> {
    let settings = load_settings(cli);
    let (project, manager) = open_project(&args.project)?;
    let capture = capture_settings(args, &project.canvas, &settings)?;
    let artifact = manager
        .export_shapes_stacked(&project.elements, &capture, log_progress)
        .await?;
    write_artifact("stacked", &artifact, &args.output, output)
}

const fn framing(full_canvas: bool) -> OffscreenFraming {
    if full_canvas {
        OffscreenFraming::Canvas
    } else {
        OffscreenFraming::Bounds
    }
}

async fn cmd_video(cli: &Cli, args: &cli::VideoArgs, output: &dyn Output) -> Result<()> {
    let settings = load_settings(cli);
    let (project, manager) = open_project(&args.project)?;

    let timeline_duration = manager.stage().await.timeline.duration();
    let duration = args
        .duration
        .or(timeline_duration)
        .unwrap_or(FALLBACK_VIDEO_SECONDS);
    let fps = args.fps.unwrap_or(project.canvas.fps);
    let capture = CaptureSettings::for_canvas(&project.canvas, &settings.export)
        .with_size(
            args.width.unwrap_or(project.canvas.width),
            args.height.unwrap_or(project.canvas.height),
        )
        .with_pixel_ratio(args.scale.unwrap_or(1.0));
    let sequence = SequenceSettings::new(duration, fps, capture);

    let kind = args.encoder.unwrap_or(settings.export.video_encoder);
    info!(duration, fps, encoder = ?kind, "Starting video export");

    let cancel = CancelHandle::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling video export");
            on_interrupt.cancel();
        }
    });

    let bar = if cli.use_json() || cli.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(u64::from(sequence.total_frames()));
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} frames {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar
    };

    let result = match kind {
        EncoderKind::Gif => {
            render_video(&manager, &mut GifEncoder::new(), sequence, cancel, &bar).await
        }
        EncoderKind::Ffmpeg => {
            let background = project
                .canvas
                .background
                .as_deref()
                .and_then(|spec| parse_color(spec).ok())
                .map_or([255, 255, 255, 255], |c| c.0);
            let mut encoder = FfmpegEncoder::new().with_background(background);
            render_video(&manager, &mut encoder, sequence, cancel, &bar).await
        }
    };
    bar.finish_and_clear();

    match result? {
        VideoExport::Ready(artifact) => write_artifact("video", &artifact, &args.output, output),
        VideoExport::Cancelled { frames_captured } => {
            output.video_cancelled(frames_captured);
            Ok(())
        }
    }
}

async fn render_video<E: VideoEncoder>(
    manager: &Manager,
    encoder: &mut E,
    sequence: SequenceSettings,
    cancel: CancelHandle,
    bar: &ProgressBar,
) -> Result<VideoExport> {
    manager
        .export_video(encoder, sequence, Some(cancel), |progress: &SequenceProgress| {
            bar.set_position(u64::from(progress.current_frame));
            match progress.phase {
                SequencePhase::Encoding => bar.set_message("encoding"),
                SequencePhase::Rendering => bar.set_message(format!("{}%", progress.percentage)),
                _ => {}
            }
            debug!(
                phase = ?progress.phase,
                frame = progress.current_frame,
                total = progress.total_frames,
                percentage = progress.percentage,
                "Video progress"
            );
        })
        .await
}
