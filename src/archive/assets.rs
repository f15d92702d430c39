//! Content-addressed asset extraction for project saves.
//!
//! Every element carrying an inline `data:` payload is hashed; each distinct
//! hash is stored once under `assets/<category>/<hash>.<ext>`, while the
//! manifest maps every owning element id to its (possibly shared) file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::hasher::{self, DecodedPayload, PayloadWarning};
use crate::model::{Element, walk, walk_mut};

/// Prefix of placeholder tokens stored in element JSON instead of payloads.
pub const PLACEHOLDER_PREFIX: &str = "@asset:";

/// Asset folder a payload is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetCategory {
    Images,
    Fonts,
    Videos,
}

impl AssetCategory {
    pub const ALL: [Self; 3] = [Self::Images, Self::Fonts, Self::Videos];

    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Images => "images",
            Self::Fonts => "fonts",
            Self::Videos => "videos",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.dir_name() == name)
    }

    /// Category for a MIME type; anything unrecognised is an image.
    pub fn for_mime(mime: &str) -> Self {
        if mime.starts_with("font/") || mime.contains("font-") {
            Self::Fonts
        } else if mime.starts_with("video/") {
            Self::Videos
        } else {
            Self::Images
        }
    }
}

/// Where one element's payload lives in the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReference {
    pub hash: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// MIME type the owning element embedded the payload with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// `assets/manifest.json`: element id -> asset reference, per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub images: BTreeMap<String, AssetReference>,
    #[serde(default)]
    pub fonts: BTreeMap<String, AssetReference>,
    #[serde(default)]
    pub videos: BTreeMap<String, AssetReference>,
}

impl AssetManifest {
    pub const fn entries(&self, category: AssetCategory) -> &BTreeMap<String, AssetReference> {
        match category {
            AssetCategory::Images => &self.images,
            AssetCategory::Fonts => &self.fonts,
            AssetCategory::Videos => &self.videos,
        }
    }

    fn entries_mut(&mut self, category: AssetCategory) -> &mut BTreeMap<String, AssetReference> {
        match category {
            AssetCategory::Images => &mut self.images,
            AssetCategory::Fonts => &mut self.fonts,
            AssetCategory::Videos => &mut self.videos,
        }
    }

    /// Reference owned by `element_id`, searching every category.
    pub fn find(&self, element_id: &str) -> Option<(AssetCategory, &AssetReference)> {
        AssetCategory::ALL
            .into_iter()
            .find_map(|c| self.entries(c).get(element_id).map(|r| (c, r)))
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.fonts.is_empty() && self.videos.is_empty()
    }
}

/// Deduplicated binary payloads keyed by category and file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetStore {
    files: BTreeMap<(AssetCategory, String), Vec<u8>>,
}

impl AssetStore {
    pub fn insert(&mut self, category: AssetCategory, filename: String, bytes: Vec<u8>) {
        self.files.insert((category, filename), bytes);
    }

    pub fn get(&self, category: AssetCategory, filename: &str) -> Option<&[u8]> {
        self.files
            .get(&(category, filename.to_string()))
            .map(Vec::as_slice)
    }

    pub fn contains(&self, category: AssetCategory, filename: &str) -> bool {
        self.files.contains_key(&(category, filename.to_string()))
    }

    /// Number of stored files in one category.
    pub fn count(&self, category: AssetCategory) -> usize {
        self.files.keys().filter(|(c, _)| *c == category).count()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// `(category, filename, bytes)` in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (AssetCategory, &str, &[u8])> {
        self.files
            .iter()
            .map(|((c, name), bytes)| (*c, name.as_str(), bytes.as_slice()))
    }
}

/// Payload that stayed inline because it could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPayload {
    pub element_id: String,
    pub warning: PayloadWarning,
}

/// Output of [`build_assets`].
#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
    pub manifest: AssetManifest,
    pub store: AssetStore,
    pub skipped: Vec<SkippedPayload>,
}

/// Canonical stored file name: a function of hash and extension only.
pub fn asset_filename(hash: &str, extension: &str) -> String {
    format!("{hash}.{extension}")
}

/// Token written into element JSON in place of the payload.
pub fn placeholder_token(category: AssetCategory, filename: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{}/{filename}", category.dir_name())
}

/// Split a placeholder token into category and file name.
pub fn parse_placeholder(token: &str) -> Option<(AssetCategory, &str)> {
    let rest = token.strip_prefix(PLACEHOLDER_PREFIX)?;
    let (dir, filename) = rest.split_once('/')?;
    if filename.is_empty() || filename.contains('/') {
        return None;
    }
    Some((AssetCategory::from_dir_name(dir)?, filename))
}

/// Walk the tree (children included) and extract every inline payload.
pub fn build_assets(elements: &[Element]) -> AssetBundle {
    let mut bundle = AssetBundle::default();
    // hash -> (category, filename) for payloads registered in this save
    let mut registered: BTreeMap<String, (AssetCategory, String)> = BTreeMap::new();

    walk(elements, &mut |element| {
        if !element.has_embedded_payload() {
            return;
        }
        let Some(src) = element.src.as_deref() else {
            return;
        };

        let payload = match hasher::decode_payload(src) {
            Ok(p) => p,
            Err(warning) => {
                warn!(element_id = %element.id, %warning, "Leaving payload inline");
                bundle.skipped.push(SkippedPayload {
                    element_id: element.id.clone(),
                    warning,
                });
                return;
            }
        };

        let hash = hasher::hash_bytes(&payload.bytes);
        let mime = payload.mime_type();
        let (category, filename) = registered
            .entry(hash.clone())
            .or_insert_with(|| {
                let category = AssetCategory::for_mime(&mime);
                let ext = hasher::extension_for_mime(&mime)
                    .unwrap_or_else(|| hasher::extension_from_bytes(&payload.bytes));
                let filename = asset_filename(&hash, ext);
                debug!(%hash, %filename, "Registered new asset");
                bundle
                    .store
                    .insert(category, filename.clone(), payload.bytes.clone());
                (category, filename)
            })
            .clone();

        let (width, height) = dimensions(element, category, &payload);
        trace!(element_id = %element.id, %filename, "Asset reference");
        bundle.manifest.entries_mut(category).insert(
            element.id.clone(),
            AssetReference {
                hash,
                filename,
                original_name: element.original_name.clone(),
                width,
                height,
                format: Some(mime),
            },
        );
    });

    bundle
}

fn dimensions(
    element: &Element,
    category: AssetCategory,
    payload: &DecodedPayload,
) -> (Option<u32>, Option<u32>) {
    if element.natural_width.is_some() || element.natural_height.is_some() {
        return (element.natural_width, element.natural_height);
    }
    if category != AssetCategory::Images {
        return (None, None);
    }
    image::ImageReader::new(std::io::Cursor::new(&payload.bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .map_or((None, None), |(w, h)| (Some(w), Some(h)))
}

/// Save-ready copy of the tree with registered payloads replaced by tokens.
///
/// The caller's tree is not touched.
pub fn replace_payloads(elements: &[Element], manifest: &AssetManifest) -> Vec<Element> {
    let mut copy = elements.to_vec();
    walk_mut(&mut copy, &mut |element| {
        if let Some((category, reference)) = manifest.find(&element.id) {
            if element.has_embedded_payload() {
                element.src = Some(placeholder_token(category, &reference.filename));
            }
        }
    });
    copy
}

/// Placeholder tokens that could not be resolved during a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedToken {
    pub element_id: String,
    pub token: String,
}

/// Resolve placeholder tokens in-place back into inline `data:` URLs.
///
/// Tokens whose file is missing stay as they are and are reported.
pub fn resolve_payloads(
    element: &mut Element,
    manifest: &AssetManifest,
    store: &AssetStore,
) -> Vec<UnresolvedToken> {
    let mut unresolved = Vec::new();
    walk_mut(std::slice::from_mut(element), &mut |el| {
        let Some(src) = el.src.as_deref() else {
            return;
        };
        let Some((category, filename)) = parse_placeholder(src) else {
            return;
        };
        match store.get(category, filename) {
            Some(bytes) => {
                let mime = manifest
                    .find(&el.id)
                    .and_then(|(_, r)| r.format.clone())
                    .unwrap_or_else(|| {
                        let ext = filename.rsplit('.').next().unwrap_or_default();
                        hasher::mime_for_extension(ext).to_string()
                    });
                el.src = Some(hasher::data_url(&mime, bytes));
            }
            None => unresolved.push(UnresolvedToken {
                element_id: el.id.clone(),
                token: src.to_string(),
            }),
        }
    });
    unresolved
}
