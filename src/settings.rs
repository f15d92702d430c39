//! User-editable shape and export defaults.
//!
//! Settings are an explicit value handed to export and creation calls. The
//! small key/value persistence behind them is injected through
//! [`SettingsStore`], so nothing reads ambient global state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, warn};

use crate::error::{DxError, Result};
use crate::render::ImageFormat;
use crate::sequence::EncoderKind;

/// Store key for [`EditorDefaults`].
pub const EDITOR_KEY: &str = "editor";
/// Store key for [`ExportDefaults`].
pub const EXPORT_KEY: &str = "export";

/// Defaults applied to newly created shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorDefaults {
    pub fill: String,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub font_family: String,
    pub font_size: f64,
    pub snap_to_grid: bool,
}

impl Default for EditorDefaults {
    fn default() -> Self {
        Self {
            fill: "#4f46e5".to_string(),
            stroke: None,
            stroke_width: 0.0,
            font_family: "Inter".to_string(),
            font_size: 16.0,
            snap_to_grid: false,
        }
    }
}

/// Defaults for export calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportDefaults {
    pub image_format: ImageFormat,
    /// JPEG/WebP quality, 1-100.
    pub quality: u8,
    pub pixel_ratio: f32,
    pub include_background: bool,
    pub video_fps: u32,
    pub video_encoder: EncoderKind,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            image_format: ImageFormat::Png,
            quality: 92,
            pixel_ratio: 2.0,
            include_background: true,
            video_fps: 30,
            video_encoder: EncoderKind::Gif,
        }
    }
}

/// Settings bundle passed explicitly into export/creation calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub editor: EditorDefaults,
    pub export: ExportDefaults,
}

impl Settings {
    /// Load settings, falling back to defaults for missing or unreadable blobs.
    #[instrument(skip(store))]
    pub fn load_from(store: &dyn SettingsStore) -> Self {
        Self {
            editor: load_or_default(store, EDITOR_KEY),
            export: load_or_default(store, EXPORT_KEY),
        }
    }

    /// Persist both settings blobs.
    #[instrument(skip(self, store))]
    pub fn save_to(&self, store: &dyn SettingsStore) -> Result<()> {
        store.save(EDITOR_KEY, &to_blob(&self.editor)?)?;
        store.save(EXPORT_KEY, &to_blob(&self.export)?)?;
        debug!("Settings saved");
        Ok(())
    }
}

fn to_blob<T: Serialize>(value: &T) -> Result<String> {
    toml::to_string_pretty(value).map_err(|e| DxError::Settings(e.to_string()))
}

fn load_or_default<T: DeserializeOwned + Default>(store: &dyn SettingsStore, key: &str) -> T {
    match store.load(key) {
        Ok(Some(blob)) => toml::from_str(&blob).unwrap_or_else(|e| {
            warn!(key, error = %e, "Ignoring unreadable settings blob");
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            warn!(key, error = %e, "Settings store read failed, using defaults");
            T::default()
        }
    }
}

/// Read/write contract for small keyed settings blobs.
pub trait SettingsStore {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Settings kept in memory (tests and embedding hosts).
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|_| DxError::Settings("settings lock poisoned".to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|_| DxError::Settings("settings lock poisoned".to_string()))?;
        blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.toml` file per blob inside a directory.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform config directory (`~/.config/dx` on Linux).
    pub fn open_default() -> Result<Self> {
        let base = dirs::config_dir().ok_or_else(|| {
            DxError::Settings("Could not determine config directory".to_string())
        })?;
        Ok(Self::new(base.join("dx")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.toml"))
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DxError::Settings(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            DxError::Settings(format!(
                "Failed to create directory {}: {e}",
                self.dir.display()
            ))
        })?;
        let path = self.path_for(key);
        std::fs::write(&path, value)
            .map_err(|e| DxError::Settings(format!("Failed to write {}: {e}", path.display())))
    }
}
