//! Project persistence: content hashing, asset extraction, ZIP packaging
//! and the `.dxproj` archive codec.

pub mod assets;
mod codec;
pub mod hasher;
mod packager;

pub use assets::{
    AssetBundle, AssetCategory, AssetManifest, AssetReference, AssetStore, build_assets,
    parse_placeholder, placeholder_token,
};
pub use codec::{
    LoadWarning, LoadedProject, PROJECT_EXTENSION, ProjectArchiveCodec, SCHEMA_VERSION,
    SaveRequest, SavedProject, WarningKind, safe_stem,
};
pub use packager::{PackEntry, pack, unpack};
