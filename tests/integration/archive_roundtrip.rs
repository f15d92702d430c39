//! Integration tests for saving and loading project archives.

use serde_json::Value;

use dx::archive::{PackEntry, ProjectArchiveCodec, SaveRequest, WarningKind, pack, unpack};
use dx::error::DxError;
use dx::model::Element;

use crate::common::fixtures::{canvas, image_element, opacity_track, png_data_url, rect};
use crate::common::init_test_logging;

fn entry<'a>(entries: &'a [PackEntry], name: &str) -> &'a PackEntry {
    entries
        .iter()
        .find(|e| e.name == name)
        .unwrap_or_else(|| panic!("missing archive entry {name}"))
}

fn save(elements: &[Element]) -> Vec<u8> {
    let canvas = canvas(30, 10);
    let request = SaveRequest::new("Fixture", elements, &canvas);
    ProjectArchiveCodec::new().save(&request).unwrap().bytes
}

/// Two plain rectangles: counted, and no assets anywhere.
#[test]
fn test_plain_shapes_have_empty_asset_manifest() {
    init_test_logging();
    let elements = vec![
        rect("a", 0.0, 0.0, 5.0, 5.0, "#ff0000"),
        rect("b", 5.0, 0.0, 5.0, 5.0, "#00ff00"),
    ];
    let canvas = canvas(30, 10);
    let saved = ProjectArchiveCodec::new()
        .save(&SaveRequest::new("Plain", &elements, &canvas))
        .unwrap();
    assert_eq!(saved.manifest.counts.elements, 2);

    let entries = unpack(&saved.bytes).unwrap();
    let assets: Value = serde_json::from_slice(&entry(&entries, "assets/manifest.json").bytes).unwrap();
    for category in ["images", "fonts", "videos"] {
        assert_eq!(
            assets[category].as_object().map(serde_json::Map::len),
            Some(0),
            "{category} should be empty"
        );
    }
    assert!(!entries.iter().any(|e| e.name.starts_with("assets/images/")));
}

/// Two images with identical bytes share one stored file.
#[test]
fn test_identical_images_stored_once() {
    init_test_logging();
    let src = png_data_url([10, 20, 30, 255], 4, 4);
    let elements = vec![
        image_element("img-1", 0.0, 0.0, src.clone()),
        image_element("img-2", 10.0, 0.0, src),
    ];
    let entries = unpack(&save(&elements)).unwrap();

    let stored: Vec<_> = entries
        .iter()
        .filter(|e| e.name.starts_with("assets/images/") && !e.name.ends_with('/'))
        .collect();
    assert_eq!(stored.len(), 1);

    let assets: Value = serde_json::from_slice(&entry(&entries, "assets/manifest.json").bytes).unwrap();
    assert_eq!(
        assets["images"]["img-1"]["hash"],
        assets["images"]["img-2"]["hash"]
    );
}

/// Shapes, payloads and keyframes all survive a round trip.
#[test]
fn test_round_trip_restores_design() {
    init_test_logging();
    let src = png_data_url([200, 0, 0, 255], 4, 4);
    let elements = vec![
        rect("bg", 0.0, 0.0, 30.0, 10.0, "#ffffff").with_name("Background"),
        Element::group(
            "grp",
            vec![
                image_element("pic", 2.0, 2.0, src.clone()),
                rect("inner", 20.0, 2.0, 4.0, 4.0, "#0000ff"),
            ],
        ),
    ];
    let tracks = vec![opacity_track("inner", 0.0, 1.0, 2.0)];
    let canvas = canvas(30, 10);
    let codec = ProjectArchiveCodec::new();
    let saved = codec
        .save(&SaveRequest::new("Round trip", &elements, &canvas).with_animations(&tracks))
        .unwrap();

    let loaded = codec.load(&saved.bytes).unwrap();
    assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
    assert_eq!(loaded.manifest.project_id, saved.manifest.project_id);
    assert_eq!(loaded.canvas, canvas);

    let ids: Vec<_> = loaded.elements.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["bg", "grp"]);
    let pic = loaded.elements[1].find("pic").unwrap();
    assert_eq!(pic.src.as_deref(), Some(src.as_str()));
    assert_eq!(loaded.animations(), tracks);
}

/// A newer schema is refused outright, naming both versions.
#[test]
fn test_newer_schema_refused() {
    init_test_logging();
    let bytes = save(&[rect("a", 0.0, 0.0, 5.0, 5.0, "#ff0000")]);
    let entries: Vec<PackEntry> = unpack(&bytes)
        .unwrap()
        .into_iter()
        .map(|mut e| {
            if e.name == "manifest.json" {
                let mut manifest: Value = serde_json::from_slice(&e.bytes).unwrap();
                manifest["schemaVersion"] = Value::from(99);
                e.bytes = serde_json::to_vec(&manifest).unwrap();
            }
            e
        })
        .collect();
    let future = pack(&entries).unwrap();

    let err = ProjectArchiveCodec::with_supported_version(1)
        .load(&future)
        .unwrap_err();
    assert!(matches!(err, DxError::SchemaTooNew { found: 99, supported: 1 }));
    assert!(err.to_string().contains("upgrade required"));
    assert!(err.is_user_recoverable());
}

/// A broken shape file is skipped with a warning; the rest still loads.
#[test]
fn test_malformed_shape_skipped_with_warning() {
    init_test_logging();
    let bytes = save(&[
        rect("a", 0.0, 0.0, 5.0, 5.0, "#ff0000"),
        rect("b", 5.0, 0.0, 5.0, 5.0, "#00ff00"),
    ]);
    let entries: Vec<PackEntry> = unpack(&bytes)
        .unwrap()
        .into_iter()
        .map(|mut e| {
            if e.name == "shapes/b.json" {
                e.bytes = b"{ not json".to_vec();
            }
            e
        })
        .collect();

    let loaded = ProjectArchiveCodec::new().load(&pack(&entries).unwrap()).unwrap();
    assert_eq!(loaded.elements.len(), 1);
    assert_eq!(loaded.elements[0].id, "a");
    assert!(
        loaded
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::InvalidShape)
    );
}

/// A broken keyframe file drops only that element's animation.
#[test]
fn test_malformed_keyframes_skipped_with_warning() {
    init_test_logging();
    let elements = vec![
        rect("a", 0.0, 0.0, 5.0, 5.0, "#ff0000"),
        rect("b", 5.0, 0.0, 5.0, 5.0, "#00ff00"),
    ];
    let tracks = vec![opacity_track("a", 1.0, 0.0, 1.0), opacity_track("b", 0.0, 1.0, 1.0)];
    let canvas = canvas(30, 10);
    let saved = ProjectArchiveCodec::new()
        .save(&SaveRequest::new("Keyframes", &elements, &canvas).with_animations(&tracks))
        .unwrap();
    let entries: Vec<PackEntry> = unpack(&saved.bytes)
        .unwrap()
        .into_iter()
        .map(|mut e| {
            if e.name == "keyframes/a_keyframes.json" {
                e.bytes = b"[1, 2".to_vec();
            }
            e
        })
        .collect();

    let loaded = ProjectArchiveCodec::new().load(&pack(&entries).unwrap()).unwrap();
    assert_eq!(loaded.elements.len(), 2);
    assert_eq!(loaded.animations(), vec![tracks[1].clone()]);
    let warning = loaded
        .warnings
        .iter()
        .find(|w| w.kind == WarningKind::InvalidKeyframes)
        .expect("keyframe warning");
    assert_eq!(warning.path.as_deref(), Some("keyframes/a_keyframes.json"));
}

#[test]
fn test_archive_without_manifest_is_fatal() {
    let entries = vec![PackEntry::new("canvas/canvas.json", b"{}".to_vec())];
    let err = ProjectArchiveCodec::new()
        .load(&pack(&entries).unwrap())
        .unwrap_err();
    assert!(matches!(err, DxError::MissingManifest));
    assert!(err.is_archive_fatal());
}
