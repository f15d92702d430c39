//! Integration tests for the export manager, layer isolation and the
//! sequence renderer, driven through recording collaborators.

use std::sync::Mutex;
use std::time::Duration;

use dx::error::DxError;
use dx::export::{ExportManager, ExportProgress, ExportStatus, VideoExport};
use dx::model::AnimationTrack;
use dx::render::{
    CaptureSettings, IsolationState, KeyframeTimeline, LayerIsolationExporter, RasterSurface,
    RenderSurface,
};
use dx::sequence::{
    CancelHandle, GifEncoder, RenderOutcome, SequencePhase, SequenceProgress, SequenceRenderer,
    SequenceSettings,
};

use crate::common::fixtures::{canvas, opacity_track, rect, three_layers, zip_names};
use crate::common::init_test_logging;
use crate::common::mocks::{
    Event, EventLog, RecordingEncoder, RecordingSurface, RecordingTimeline,
};

type Manager = ExportManager<RecordingSurface, RecordingTimeline>;

fn settings() -> CaptureSettings {
    CaptureSettings::default()
        .with_size(30, 10)
        .with_pixel_ratio(1.0)
}

fn manager(log: &EventLog) -> Manager {
    let surface = RecordingSurface::new(&canvas(30, 10), three_layers(), log.clone());
    ExportManager::new(surface, RecordingTimeline { log: log.clone() }).with_name("Fixture")
}

fn record(sink: &Mutex<Vec<ExportProgress>>, progress: &ExportProgress) {
    sink.lock().unwrap().push(progress.clone());
}

// === Still exports ===

#[tokio::test]
async fn test_canvas_export_is_single_image() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);

    let artifact = manager.export_canvas(&settings(), |_| {}).await.unwrap();
    assert_eq!(artifact.file_name, "Fixture.png");
    assert_eq!(artifact.media_type, "image/png");

    let image = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
    assert_eq!(image.dimensions(), (30, 10));
    assert_eq!(image.get_pixel(5, 5).0, [255, 0, 0, 255]);
    assert_eq!(log.count(|e| *e == Event::CaptureWhole), 1);
}

/// Three visible layers: three images in layer order, opacities restored.
#[tokio::test]
async fn test_stacked_export_names_layers_in_order_and_restores() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let layers = three_layers();

    let sink = Mutex::new(Vec::new());
    let artifact = manager
        .export_shapes_stacked(&layers, &settings(), |p| record(&sink, p))
        .await
        .unwrap();

    assert_eq!(artifact.file_name, "Fixture-layers.zip");
    assert_eq!(
        zip_names(&artifact.bytes),
        vec!["layer-01-Red.png", "layer-02-Green.png", "layer-03-Blue.png"]
    );

    let stage = manager.stage().await;
    assert_eq!(stage.surface.opacity("red"), Some(1.0));
    assert_eq!(stage.surface.opacity("green"), Some(0.5));
    assert_eq!(stage.surface.opacity("blue"), Some(1.0));

    let progress = sink.into_inner().unwrap();
    let last = progress.last().unwrap();
    assert_eq!(last.status, ExportStatus::Completed);
    assert_eq!((last.current, last.total), (3, 3));
}

/// A failing layer capture still puts every opacity back.
#[tokio::test]
async fn test_isolation_failure_restores_opacity() {
    init_test_logging();
    let log = EventLog::default();
    let mut surface =
        RecordingSurface::new(&canvas(30, 10), three_layers(), log.clone()).failing_on_capture(2);
    let layers = three_layers();
    let mut exporter = LayerIsolationExporter::new(settings());

    let err = exporter
        .export(&mut surface, &layers, |_, _| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::SurfaceUnavailable(_)));
    assert_eq!(exporter.state(), IsolationState::Failed);

    assert_eq!(surface.opacity("red"), Some(1.0));
    assert_eq!(surface.opacity("green"), Some(0.5));
    assert_eq!(surface.opacity("blue"), Some(1.0));

    // The last opacity writes are the restore pass, one per node.
    let events = log.events();
    let tail: Vec<_> = events[events.len() - 3..].to_vec();
    assert!(tail.contains(&Event::SetOpacity("green".to_string(), 0.5)));
}

#[tokio::test]
async fn test_shapes_zip_skips_groups_and_hidden() {
    init_test_logging();
    let log = EventLog::default();
    let mut hidden = rect("hidden", 0.0, 0.0, 5.0, 5.0, "#000000");
    hidden.visible = false;
    let elements = vec![
        rect("a", 0.0, 0.0, 5.0, 5.0, "#ff0000"),
        dx::model::Element::group("g", vec![rect("b", 10.0, 0.0, 5.0, 5.0, "#00ff00")]),
        hidden,
    ];
    let surface = RecordingSurface::new(&canvas(30, 10), elements.clone(), log.clone());
    let manager = ExportManager::still(surface).with_name("Shapes");

    let artifact = manager
        .export_shapes_as_zip(&elements, &settings(), |_| {})
        .await
        .unwrap();
    assert_eq!(artifact.file_name, "Shapes-shapes.zip");
    assert_eq!(
        zip_names(&artifact.bytes),
        vec!["01-rectangle-a.png", "02-rectangle-b.png"]
    );
    assert_eq!(manager.stage().await.surface.inner.offscreen_count(), 0);
}

/// The first failing element aborts the batch, and nothing stays mounted.
#[tokio::test]
async fn test_shape_batch_aborts_on_first_failure() {
    init_test_logging();
    let log = EventLog::default();
    let surface =
        RecordingSurface::new(&canvas(30, 10), three_layers(), log.clone()).failing_on_capture(2);
    let manager = ExportManager::still(surface);

    let sink = Mutex::new(Vec::new());
    let result = manager
        .export_shapes_as_zip(&three_layers(), &settings(), |p| record(&sink, p))
        .await;
    assert!(matches!(result, Err(DxError::SurfaceUnavailable(_))));

    assert_eq!(log.count(|e| matches!(e, Event::Mount(_))), 2);
    assert_eq!(log.count(|e| *e == Event::Unmount), 2);
    assert_eq!(manager.stage().await.surface.inner.offscreen_count(), 0);

    let progress = sink.into_inner().unwrap();
    let last = progress.last().unwrap();
    assert_eq!(last.status, ExportStatus::Error);
    assert!(last.error.is_some());
}

#[tokio::test]
async fn test_selection_single_and_many() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let layers = three_layers();

    let single = manager
        .export_selection(&layers, &["red"], &settings(), |_| {})
        .await
        .unwrap();
    assert_eq!(single.file_name, "Red-red.png");
    let bitmap = image::load_from_memory(&single.bytes).unwrap().to_rgba8();
    assert_eq!(bitmap.get_pixel(0, 0).0, [255, 0, 0, 255]);

    let many = manager
        .export_selection(&layers, &["red", "blue"], &settings(), |_| {})
        .await
        .unwrap();
    assert_eq!(many.file_name, "Fixture-selection.zip");
    assert_eq!(
        zip_names(&many.bytes),
        vec!["01-Red-red.png", "02-Blue-blue.png"]
    );
}

#[tokio::test]
async fn test_selection_errors() {
    let log = EventLog::default();
    let manager = manager(&log);
    let layers = three_layers();

    let none: [&str; 0] = [];
    let err = manager
        .export_selection(&layers, &none, &settings(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::NothingSelected));

    let err = manager
        .export_selection(&layers, &["ghost"], &settings(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::NodeNotFound { ref element_id } if element_id == "ghost"));
    assert_eq!(log.count(|e| matches!(e, Event::Mount(_))), 0);
}

#[tokio::test]
async fn test_stacked_without_visible_layers() {
    let log = EventLog::default();
    let manager = manager(&log);
    let mut layers = three_layers();
    for layer in &mut layers {
        layer.visible = false;
    }
    let err = manager
        .export_shapes_stacked(&layers, &settings(), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::NoVisibleShapes));
}

/// Concurrent exports never interleave on the surface.
#[tokio::test]
async fn test_concurrent_exports_are_serialized() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let layers = three_layers();
    let settings = settings();

    let (shapes, canvas, stacked) = tokio::join!(
        manager.export_shapes_as_zip(&layers, &settings, |_| {}),
        manager.export_canvas(&settings, |_| {}),
        manager.export_shapes_stacked(&layers, &settings, |_| {}),
    );
    shapes.unwrap();
    canvas.unwrap();
    stacked.unwrap();

    // Between the first mount and the last unmount only offscreen work happens.
    let events = log.events();
    let first_mount = log.position(|e| matches!(e, Event::Mount(_))).unwrap();
    let last_unmount = events.iter().rposition(|e| *e == Event::Unmount).unwrap();
    assert!(
        events[first_mount..=last_unmount]
            .iter()
            .all(|e| matches!(e, Event::Mount(_) | Event::CaptureOffscreen | Event::Unmount)),
        "export calls interleaved: {events:?}"
    );
}

// === Sequences ===

#[tokio::test]
async fn test_sequence_frame_count_and_times() {
    init_test_logging();
    let log = EventLog::default();
    let mut surface = RecordingSurface::new(&canvas(30, 10), three_layers(), log.clone());
    let mut timeline = RecordingTimeline { log: log.clone() };
    let mut encoder = RecordingEncoder::new(log.clone());
    let mut renderer = SequenceRenderer::new(SequenceSettings::new(2.0, 30, settings()));

    let outcome = renderer
        .render(&mut surface, &mut timeline, &mut encoder, |_| {})
        .await
        .unwrap();
    let RenderOutcome::Completed(video) = outcome else {
        panic!("expected a completed render");
    };
    assert_eq!(video.bytes.len(), 60);

    let seeks = log.seeks();
    assert_eq!(seeks.len(), 60);
    for (i, t) in seeks.iter().enumerate() {
        assert!((t - i as f64 / 30.0).abs() < 1e-9, "frame {i} seeked to {t}");
    }

    // Per frame: seek, tick, capture.
    assert_eq!(
        log.events()[..3],
        [Event::Seek(0.0), Event::Tick, Event::CaptureWhole]
    );
}

/// Every capture lands before the encoder opens, and 100% only after
/// encoding finishes.
#[tokio::test]
async fn test_sequence_captures_before_encoding() {
    init_test_logging();
    let log = EventLog::default();
    let mut surface = RecordingSurface::new(&canvas(30, 10), three_layers(), log.clone());
    let mut timeline = RecordingTimeline { log: log.clone() };
    let mut encoder = RecordingEncoder::new(log.clone());
    let mut renderer = SequenceRenderer::new(SequenceSettings::new(1.0, 24, settings()));

    let mut progress: Vec<SequenceProgress> = Vec::new();
    renderer
        .render(&mut surface, &mut timeline, &mut encoder, |p| {
            progress.push(p.clone());
        })
        .await
        .unwrap();

    let open = log
        .position(|e| matches!(e, Event::EncoderOpen { .. }))
        .unwrap();
    let captures_before_open = log.events()[..open]
        .iter()
        .filter(|e| **e == Event::CaptureWhole)
        .count();
    assert_eq!(captures_before_open, 24);
    assert_eq!(log.count(|e| *e == Event::Submit), 24);
    assert_eq!(
        log.events().last(),
        Some(&Event::EncoderClose),
        "encoder must close last"
    );

    let (last, rest) = progress.split_last().unwrap();
    assert_eq!(last.phase, SequencePhase::Completed);
    assert_eq!(last.percentage, 100);
    assert!(rest.iter().all(|p| p.percentage < 100));
    assert!(rest.iter().any(|p| p.phase == SequencePhase::Encoding));
}

#[tokio::test]
async fn test_video_export_cancelled_mid_render() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let mut encoder = RecordingEncoder::new(log.clone());
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();

    let result = manager
        .export_video(
            &mut encoder,
            SequenceSettings::new(1.0, 24, settings()),
            Some(cancel),
            |p| {
                if p.current_frame == 5 {
                    trigger.cancel();
                }
            },
        )
        .await
        .unwrap();

    assert_eq!(result, VideoExport::Cancelled { frames_captured: 5 });
    assert_eq!(log.count(|e| *e == Event::CaptureWhole), 5);
    assert_eq!(log.position(|e| matches!(e, Event::EncoderOpen { .. })), None);
}

#[tokio::test]
async fn test_video_export_artifact() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let mut encoder = RecordingEncoder::new(log.clone());

    let result = manager
        .export_video(
            &mut encoder,
            SequenceSettings::new(0.5, 10, settings()),
            None,
            |_| {},
        )
        .await
        .unwrap();
    let VideoExport::Ready(artifact) = result else {
        panic!("expected a finished video");
    };
    assert_eq!(artifact.file_name, "Fixture.webm");
    assert_eq!(artifact.media_type, "video/webm");
    assert_eq!(artifact.size(), 5);
    assert!(log.events().contains(&Event::EncoderOpen {
        width: 30,
        height: 10,
        fps: 10
    }));
}

#[tokio::test]
async fn test_invalid_sequence_rejected_before_capture() {
    let log = EventLog::default();
    let manager = manager(&log);
    let mut encoder = RecordingEncoder::new(log.clone());
    let err = manager
        .export_video(
            &mut encoder,
            SequenceSettings::new(1.0, 0, settings()),
            None,
            |_| {},
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::InvalidSequence(_)));
    assert!(log.events().is_empty());
}

// === Design state after video ===

type AnimatedManager = ExportManager<RasterSurface, KeyframeTimeline>;

/// Red fades out and slides right over one second.
fn animated_manager() -> AnimatedManager {
    let slide: AnimationTrack = serde_json::from_value(serde_json::json!({
        "elementId": "red",
        "property": "x",
        "keyframes": [{ "time": 0.0, "value": 0.0 }, { "time": 1.0, "value": 20.0 }]
    }))
    .unwrap();
    let tracks = [opacity_track("red", 1.0, 0.0, 1.0), slide];
    ExportManager::new(
        RasterSurface::new(&canvas(30, 10), three_layers()),
        KeyframeTimeline::from_tracks(&tracks),
    )
    .with_name("Fixture")
}

async fn assert_design_untouched(manager: &AnimatedManager) {
    let stage = manager.stage().await;
    assert_eq!(stage.surface.opacity("red"), Some(1.0));
    assert_eq!(stage.surface.opacity("green"), Some(0.5));
    assert_eq!(stage.surface.property("red", "x"), Some(0.0));
}

#[tokio::test]
async fn test_video_export_restores_animated_state() {
    init_test_logging();
    let manager = animated_manager();
    let result = manager
        .export_video(
            &mut GifEncoder::new(),
            SequenceSettings::new(1.0, 10, settings()),
            None,
            |_| {},
        )
        .await
        .unwrap();
    assert!(matches!(result, VideoExport::Ready(_)));
    assert_design_untouched(&manager).await;

    // A following stacked export sees the original opacities.
    let zip = manager
        .export_shapes_stacked(&three_layers(), &settings(), |_| {})
        .await
        .unwrap();
    assert_eq!(zip_names(&zip.bytes).len(), 3);
    assert_design_untouched(&manager).await;
}

#[tokio::test]
async fn test_cancelled_video_restores_animated_state() {
    init_test_logging();
    let manager = animated_manager();
    let cancel = CancelHandle::new();
    let trigger = cancel.clone();
    let result = manager
        .export_video(
            &mut GifEncoder::new(),
            SequenceSettings::new(1.0, 10, settings()),
            Some(cancel),
            |p| {
                if p.current_frame == 7 {
                    trigger.cancel();
                }
            },
        )
        .await
        .unwrap();
    assert_eq!(result, VideoExport::Cancelled { frames_captured: 7 });
    assert_design_untouched(&manager).await;
}

// === Encoding ===

#[tokio::test]
async fn test_encoder_failure_yields_no_video() {
    init_test_logging();
    let log = EventLog::default();
    let manager = animated_manager();
    let mut encoder = RecordingEncoder::new(log.clone()).failing_on_submit(3);
    let mut phases = Vec::new();

    let err = manager
        .export_video(
            &mut encoder,
            SequenceSettings::new(0.5, 10, settings()),
            None,
            |p| phases.push(p.phase),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DxError::Encoding(_)));
    assert_eq!(log.count(|e| *e == Event::Submit), 3);
    assert_eq!(log.position(|e| *e == Event::EncoderClose), None);
    assert_eq!(phases.last(), Some(&SequencePhase::Error));
    assert!(!phases.contains(&SequencePhase::Completed));
    assert_design_untouched(&manager).await;
}

/// Realtime encoders get one frame per `1000/fps` ms, then the settle delay.
#[tokio::test(start_paused = true)]
async fn test_realtime_encoder_is_paced() {
    init_test_logging();
    let log = EventLog::default();
    let manager = manager(&log);
    let mut encoder = RecordingEncoder::new(log.clone()).paced();
    let mut sequence = SequenceSettings::new(0.5, 10, settings());
    sequence.settle_delay = Duration::from_millis(250);

    let start = tokio::time::Instant::now();
    let result = manager
        .export_video(&mut encoder, sequence, None, |_| {})
        .await
        .unwrap();
    assert!(matches!(result, VideoExport::Ready(_)));

    let interval = Duration::from_millis(100);
    assert_eq!(encoder.submit_times.len(), 5);
    for pair in encoder.submit_times.windows(2) {
        assert!(pair[1] - pair[0] >= interval);
    }
    assert!(start.elapsed() >= interval * 5 + Duration::from_millis(250));
}

#[tokio::test]
async fn test_oversized_sequence_rejected_before_capture() {
    let log = EventLog::default();
    let manager = manager(&log);
    let mut encoder = RecordingEncoder::new(log.clone());
    let err = manager
        .export_video(
            &mut encoder,
            SequenceSettings::new(1.0e9, 240, settings()),
            None,
            |_| {},
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DxError::InvalidSequence(_)));
    assert!(log.events().is_empty());
}
