//! `.dxproj` project archive codec.
//!
//! Archive layout:
//!
//! ```text
//! manifest.json
//! canvas/canvas.json
//! properties/properties.json
//! shapes/<elementId>.json                 one per top-level element
//! keyframes/<elementId>_keyframes.json    animated elements only
//! assets/manifest.json
//! assets/{images,fonts,videos}/<hash>.<ext>
//! ```
//!
//! Element JSON never contains asset bytes; payloads are swapped for
//! `@asset:<category>/<filename>` tokens on save and restored on load.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

use super::assets::{
    self, AssetCategory, AssetManifest, AssetStore, build_assets, replace_payloads,
};
use super::packager::{PackEntry, pack};
use crate::error::{DxError, Result};
use crate::model::{
    AnimationTrack, Author, Element, FolderLayout, ProjectCanvas, ProjectCounts, ProjectManifest,
    ProjectProperties, ShapeKeyframes, count_elements, group_tracks,
};

/// Highest schema version this build reads and the version it writes.
pub const SCHEMA_VERSION: u32 = 1;

/// File extension for project archives.
pub const PROJECT_EXTENSION: &str = "dxproj";

const MANIFEST_PATH: &str = "manifest.json";
const CANVAS_PATH: &str = "canvas/canvas.json";
const PROPERTIES_PATH: &str = "properties/properties.json";
const ASSET_MANIFEST_PATH: &str = "assets/manifest.json";
const KEYFRAMES_SUFFIX: &str = "_keyframes.json";

/// Category of a non-fatal load problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MissingProperties,
    InvalidProperties,
    MissingAssetManifest,
    InvalidAssetManifest,
    MissingAsset,
    InvalidShape,
    InvalidKeyframes,
    UnresolvedPlaceholder,
    InlinePayload,
}

/// Recoverable problem collected while saving or loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub kind: WarningKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl LoadWarning {
    fn new(kind: WarningKind, path: Option<&str>, message: impl Into<String>) -> Self {
        let warning = Self {
            kind,
            path: path.map(str::to_string),
            message: message.into(),
        };
        warn!(kind = ?warning.kind, path = ?warning.path, message = %warning.message, "Project warning");
        warning
    }
}

/// Everything a save needs. Borrowed: the caller's tree is never modified.
#[derive(Debug, Clone)]
pub struct SaveRequest<'a> {
    pub name: &'a str,
    pub elements: &'a [Element],
    pub canvas: &'a ProjectCanvas,
    pub properties: Option<&'a ProjectProperties>,
    pub animations: &'a [AnimationTrack],
    pub author: Option<Author>,
    /// Keep the identity of a previously loaded project.
    pub project_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl<'a> SaveRequest<'a> {
    pub fn new(name: &'a str, elements: &'a [Element], canvas: &'a ProjectCanvas) -> Self {
        Self {
            name,
            elements,
            canvas,
            properties: None,
            animations: &[],
            author: None,
            project_id: None,
            created_at: None,
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: &'a ProjectProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    #[must_use]
    pub fn with_animations(mut self, animations: &'a [AnimationTrack]) -> Self {
        self.animations = animations;
        self
    }

    #[must_use]
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// Re-save under the identity of `manifest`.
    #[must_use]
    pub fn preserving(mut self, manifest: &ProjectManifest) -> Self {
        self.project_id = Some(manifest.project_id.clone());
        self.created_at = Some(manifest.created_at);
        self
    }
}

/// Result of a successful save.
#[derive(Debug, Clone)]
pub struct SavedProject {
    pub bytes: Vec<u8>,
    pub manifest: ProjectManifest,
    pub warnings: Vec<LoadWarning>,
}

/// Everything reconstructed from an archive.
#[derive(Debug, Clone)]
pub struct LoadedProject {
    pub manifest: ProjectManifest,
    pub canvas: ProjectCanvas,
    pub properties: ProjectProperties,
    /// Top-level elements in display order, payloads inlined.
    pub elements: Vec<Element>,
    pub keyframes: Vec<ShapeKeyframes>,
    pub assets: AssetManifest,
    pub warnings: Vec<LoadWarning>,
}

impl LoadedProject {
    /// All animation tracks, flattened in keyframe-file order.
    pub fn animations(&self) -> Vec<AnimationTrack> {
        self.keyframes
            .iter()
            .flat_map(|k| k.animations.iter().cloned())
            .collect()
    }
}

/// Saves and loads project archives.
#[derive(Debug, Clone, Copy)]
pub struct ProjectArchiveCodec {
    supported_version: u32,
}

impl Default for ProjectArchiveCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectArchiveCodec {
    pub const fn new() -> Self {
        Self {
            supported_version: SCHEMA_VERSION,
        }
    }

    /// Codec gating at a different version (compatibility testing).
    pub const fn with_supported_version(version: u32) -> Self {
        Self {
            supported_version: version,
        }
    }

    pub const fn supported_version(&self) -> u32 {
        self.supported_version
    }

    /// Serialize a design into archive bytes.
    #[instrument(skip_all, fields(name = request.name, elements = request.elements.len()))]
    pub fn save(&self, request: &SaveRequest<'_>) -> Result<SavedProject> {
        let bundle = build_assets(request.elements);
        let warnings: Vec<LoadWarning> = bundle
            .skipped
            .iter()
            .map(|s| {
                LoadWarning::new(
                    WarningKind::InlinePayload,
                    None,
                    format!("Element '{}' payload kept inline: {}", s.element_id, s.warning),
                )
            })
            .collect();

        let grouped = group_tracks(request.animations);
        let now = Utc::now();
        let manifest = ProjectManifest {
            schema_version: self.supported_version,
            project_id: request
                .project_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            name: request.name.to_string(),
            created_at: request.created_at.unwrap_or(now),
            updated_at: now,
            author: request.author.clone(),
            folder_layout: FolderLayout::default(),
            counts: ProjectCounts {
                elements: count_elements(request.elements),
                animations: request.animations.len(),
                images: bundle.store.count(AssetCategory::Images),
                fonts: bundle.store.count(AssetCategory::Fonts),
                videos: bundle.store.count(AssetCategory::Videos),
            },
            shape_order: request.elements.iter().map(|e| e.id.clone()).collect(),
        };

        let default_properties = ProjectProperties::default();
        let properties = request.properties.unwrap_or(&default_properties);

        let mut entries = vec![
            PackEntry::json(MANIFEST_PATH, &manifest)?,
            PackEntry::json(CANVAS_PATH, request.canvas)?,
            PackEntry::json(PROPERTIES_PATH, properties)?,
        ];

        let save_ready = replace_payloads(request.elements, &bundle.manifest);
        let mut shape_names = FileNames::default();
        for element in &save_ready {
            let stem = shape_names.claim(&element.id);
            entries.push(PackEntry::json(format!("shapes/{stem}.json"), element)?);
        }

        let mut keyframe_names = FileNames::default();
        for (element_id, animations) in grouped {
            let stem = keyframe_names.claim(&element_id);
            let doc = ShapeKeyframes {
                element_id,
                animations,
            };
            entries.push(PackEntry::json(
                format!("keyframes/{stem}{KEYFRAMES_SUFFIX}"),
                &doc,
            )?);
        }

        entries.push(PackEntry::json(ASSET_MANIFEST_PATH, &bundle.manifest)?);
        for (category, filename, bytes) in bundle.store.iter() {
            entries.push(PackEntry::new(
                format!("assets/{}/{filename}", category.dir_name()),
                bytes.to_vec(),
            ));
        }

        let bytes = pack(&entries)?;
        info!(
            project_id = %manifest.project_id,
            size = bytes.len(),
            assets = bundle.store.len(),
            "Project saved"
        );
        Ok(SavedProject {
            bytes,
            manifest,
            warnings,
        })
    }

    /// Save straight to a file.
    pub fn save_file<P: AsRef<Path>>(
        &self,
        request: &SaveRequest<'_>,
        path: P,
    ) -> Result<SavedProject> {
        let saved = self.save(request)?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &saved.bytes)?;
        Ok(saved)
    }

    /// Load a project archive from a file.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<LoadedProject> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DxError::ProjectNotFound {
                    path: path.display().to_string(),
                }
            } else {
                DxError::Io(e)
            }
        })?;
        self.load(&bytes)
    }

    /// Rebuild a design from archive bytes.
    ///
    /// Fatal problems return `Err` with nothing partial; recoverable ones are
    /// collected in [`LoadedProject::warnings`].
    #[instrument(skip_all, fields(size = bytes.len()))]
    pub fn load(&self, bytes: &[u8]) -> Result<LoadedProject> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DxError::CorruptArchive(format!("Invalid ZIP archive: {e}")))?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        let mut warnings = Vec::new();

        let manifest = self.read_manifest(&mut archive)?;
        let canvas: ProjectCanvas = match read_entry(&mut archive, CANVAS_PATH)? {
            None => return Err(DxError::MissingCanvas),
            Some(data) => parse_json(&data)
                .map_err(|e| DxError::CorruptArchive(format!("Invalid {CANVAS_PATH}: {e}")))?,
        };

        let properties = match read_entry(&mut archive, PROPERTIES_PATH)? {
            None => {
                warnings.push(LoadWarning::new(
                    WarningKind::MissingProperties,
                    Some(PROPERTIES_PATH),
                    "Project has no properties file, using defaults",
                ));
                ProjectProperties::default()
            }
            Some(data) => parse_json(&data).unwrap_or_else(|e| {
                warnings.push(LoadWarning::new(
                    WarningKind::InvalidProperties,
                    Some(PROPERTIES_PATH),
                    format!("Unreadable properties, using defaults: {e}"),
                ));
                ProjectProperties::default()
            }),
        };

        let asset_manifest = match read_entry(&mut archive, ASSET_MANIFEST_PATH)? {
            None => {
                warnings.push(LoadWarning::new(
                    WarningKind::MissingAssetManifest,
                    Some(ASSET_MANIFEST_PATH),
                    "Project has no asset manifest, loading without assets",
                ));
                AssetManifest::default()
            }
            Some(data) => parse_json(&data).unwrap_or_else(|e| {
                warnings.push(LoadWarning::new(
                    WarningKind::InvalidAssetManifest,
                    Some(ASSET_MANIFEST_PATH),
                    format!("Unreadable asset manifest, loading without assets: {e}"),
                ));
                AssetManifest::default()
            }),
        };
        let store = materialize_assets(&mut archive, &asset_manifest, &mut warnings)?;

        let elements = read_shapes(
            &mut archive,
            &names,
            &manifest,
            &asset_manifest,
            &store,
            &mut warnings,
        )?;
        let keyframes = read_keyframes(&mut archive, &names, &mut warnings)?;

        info!(
            project_id = %manifest.project_id,
            elements = elements.len(),
            warnings = warnings.len(),
            "Project loaded"
        );
        Ok(LoadedProject {
            manifest,
            canvas,
            properties,
            elements,
            keyframes,
            assets: asset_manifest,
            warnings,
        })
    }

    /// Parse `manifest.json`, gating on schema version before full parsing so
    /// a newer layout reports "upgrade required" rather than a parse error.
    fn read_manifest<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<ProjectManifest> {
        let data = read_entry(archive, MANIFEST_PATH)?.ok_or(DxError::MissingManifest)?;
        let raw: serde_json::Value = parse_json(&data)
            .map_err(|e| DxError::CorruptArchive(format!("Invalid {MANIFEST_PATH}: {e}")))?;

        let found = raw
            .get("schemaVersion")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                DxError::CorruptArchive(format!("{MANIFEST_PATH} has no schemaVersion"))
            })?;
        if found > u64::from(self.supported_version) {
            return Err(DxError::SchemaTooNew {
                found: u32::try_from(found).unwrap_or(u32::MAX),
                supported: self.supported_version,
            });
        }

        let manifest: ProjectManifest = serde_json::from_value(raw)
            .map_err(|e| DxError::CorruptArchive(format!("Invalid {MANIFEST_PATH}: {e}")))?;
        debug!(schema = manifest.schema_version, name = %manifest.name, "Manifest read");
        Ok(manifest)
    }
}

/// Reads one entry; `Ok(None)` when absent.
fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Option<Vec<u8>>> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(DxError::CorruptArchive(format!(
                "Failed to open {path}: {e}"
            )));
        }
    };
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .map_err(|e| DxError::CorruptArchive(format!("Failed to read {path}: {e}")))?;
    Ok(Some(data))
}

fn parse_json<T: DeserializeOwned>(data: &[u8]) -> std::result::Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

fn materialize_assets<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    manifest: &AssetManifest,
    warnings: &mut Vec<LoadWarning>,
) -> Result<AssetStore> {
    let mut store = AssetStore::default();
    for category in AssetCategory::ALL {
        for reference in manifest.entries(category).values() {
            if store.contains(category, &reference.filename) {
                continue;
            }
            let path = format!("assets/{}/{}", category.dir_name(), reference.filename);
            match read_entry(archive, &path)? {
                Some(bytes) => store.insert(category, reference.filename.clone(), bytes),
                None => warnings.push(LoadWarning::new(
                    WarningKind::MissingAsset,
                    Some(&path),
                    format!("Asset file {} is missing", reference.filename),
                )),
            }
        }
    }
    Ok(store)
}

fn read_shapes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    names: &[String],
    manifest: &ProjectManifest,
    asset_manifest: &AssetManifest,
    store: &AssetStore,
    warnings: &mut Vec<LoadWarning>,
) -> Result<Vec<Element>> {
    let mut parsed: Vec<Element> = Vec::new();
    for name in names
        .iter()
        .filter(|n| n.starts_with("shapes/") && n.ends_with(".json"))
    {
        let Some(data) = read_entry(archive, name)? else {
            continue;
        };
        let mut element: Element = match parse_json(&data) {
            Ok(element) => element,
            Err(e) => {
                warnings.push(LoadWarning::new(
                    WarningKind::InvalidShape,
                    Some(name),
                    format!("Skipping unreadable shape: {e}"),
                ));
                continue;
            }
        };
        for missing in assets::resolve_payloads(&mut element, asset_manifest, store) {
            warnings.push(LoadWarning::new(
                WarningKind::UnresolvedPlaceholder,
                Some(name),
                format!(
                    "Element '{}' references missing asset {}",
                    missing.element_id, missing.token
                ),
            ));
        }
        parsed.push(element);
    }
    Ok(order_shapes(parsed, &manifest.shape_order))
}

/// Put shapes in manifest display order; unlisted shapes keep archive order
/// after the listed ones.
fn order_shapes(parsed: Vec<Element>, order: &[String]) -> Vec<Element> {
    if order.is_empty() {
        return parsed;
    }
    let rank: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    let mut indexed: Vec<(usize, Element)> = parsed
        .into_iter()
        .enumerate()
        .map(|(i, e)| (rank.get(e.id.as_str()).copied().unwrap_or(order.len() + i), e))
        .collect();
    indexed.sort_by_key(|(r, _)| *r);
    indexed.into_iter().map(|(_, e)| e).collect()
}

fn read_keyframes<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    names: &[String],
    warnings: &mut Vec<LoadWarning>,
) -> Result<Vec<ShapeKeyframes>> {
    let mut keyframes = Vec::new();
    for name in names
        .iter()
        .filter(|n| n.starts_with("keyframes/") && n.ends_with(KEYFRAMES_SUFFIX))
    {
        let Some(data) = read_entry(archive, name)? else {
            continue;
        };
        match parse_json::<ShapeKeyframes>(&data) {
            Ok(doc) => keyframes.push(doc),
            Err(e) => warnings.push(LoadWarning::new(
                WarningKind::InvalidKeyframes,
                Some(name),
                format!("Skipping unreadable keyframes: {e}"),
            )),
        }
    }
    Ok(keyframes)
}

/// Hands out unique, path-safe file stems for element ids.
#[derive(Debug, Default)]
struct FileNames {
    used: HashSet<String>,
}

impl FileNames {
    fn claim(&mut self, id: &str) -> String {
        let base = safe_stem(id);
        let mut stem = base.clone();
        let mut n = 2;
        while !self.used.insert(stem.clone()) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        stem
    }
}

/// Reduce an id to `[A-Za-z0-9_-]` so it is usable as an archive file name.
pub fn safe_stem(id: &str) -> String {
    let stem: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "element".to_string()
    } else {
        stem
    }
}
