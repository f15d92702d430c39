//! Content hashing and payload sniffing for embedded assets.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

/// Extension used when nothing better can be inferred.
pub const DEFAULT_EXTENSION: &str = "png";

/// An inline payload that could not be decoded.
///
/// Callers treat this as a warning: the element keeps its inline data and
/// the save carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadWarning {
    pub message: String,
}

impl std::fmt::Display for PayloadWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl PayloadWarning {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Decoded inline payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub bytes: Vec<u8>,
    /// MIME type from the data URL header, if there was one.
    pub mime: Option<String>,
}

impl DecodedPayload {
    /// MIME type, sniffed from the bytes when the header did not carry one.
    pub fn mime_type(&self) -> String {
        self.mime
            .clone()
            .unwrap_or_else(|| mime_for_extension(extension_from_bytes(&self.bytes)).to_string())
    }
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash the bytes behind a base64 string or `data:` URL.
///
/// The header is ignored, so identical bytes hash identically whatever MIME
/// label they were embedded with.
pub fn hash_base64(encoded: &str) -> Result<String, PayloadWarning> {
    decode_payload(encoded).map(|p| hash_bytes(&p.bytes))
}

/// Decode a `data:<mime>;base64,<data>` URL or a bare base64 string.
pub fn decode_payload(encoded: &str) -> Result<DecodedPayload, PayloadWarning> {
    let (mime, data) = match encoded.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| PayloadWarning::new("data URL has no ',' separator"))?;
            let Some(mime) = header.strip_suffix(";base64") else {
                return Err(PayloadWarning::new(format!(
                    "unsupported data URL encoding '{header}' (only base64 is stored as an asset)"
                )));
            };
            let mime = (!mime.is_empty()).then(|| mime.to_ascii_lowercase());
            (mime, data)
        }
        None => (None, encoded),
    };

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| PayloadWarning::new(format!("invalid base64 payload: {e}")))?;
    if bytes.is_empty() {
        return Err(PayloadWarning::new("empty payload"));
    }
    Ok(DecodedPayload { bytes, mime })
}

/// Build a `data:` URL for `bytes`.
pub fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

/// Best-effort file extension for a MIME type, `data:` URL or bare base64.
///
/// Falls back to [`DEFAULT_EXTENSION`].
pub fn infer_extension(base64_or_mime: &str) -> &'static str {
    let input = base64_or_mime.trim();
    if let Some(rest) = input.strip_prefix("data:") {
        let header = rest.split([';', ',']).next().unwrap_or_default();
        if let Some(ext) = extension_for_mime(header) {
            return ext;
        }
        return decode_payload(input)
            .map_or(DEFAULT_EXTENSION, |p| extension_from_bytes(&p.bytes));
    }
    if let Some(ext) = extension_for_mime(input) {
        return ext;
    }
    // Sniff from the first few decoded bytes only.
    let head: String = input.chars().take(64).collect();
    STANDARD
        .decode(head)
        .map_or(DEFAULT_EXTENSION, |bytes| extension_from_bytes(&bytes))
}

/// Extension for a known MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime.trim().to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/bmp" => "bmp",
        "image/avif" => "avif",
        "font/woff2" => "woff2",
        "font/woff" => "woff",
        "font/ttf" | "application/x-font-ttf" => "ttf",
        "font/otf" => "otf",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        _ => return None,
    };
    Some(ext)
}

/// MIME type for a file extension; `application/octet-stream` when unknown.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        "woff2" => "font/woff2",
        "woff" => "font/woff",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// Sniff an extension from magic bytes.
pub fn extension_from_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "png",
        Ok(image::ImageFormat::Jpeg) => "jpg",
        Ok(image::ImageFormat::WebP) => "webp",
        Ok(image::ImageFormat::Gif) => "gif",
        Ok(image::ImageFormat::Bmp) => "bmp",
        Ok(image::ImageFormat::Avif) => "avif",
        _ if bytes.starts_with(b"<svg") || bytes.starts_with(b"<?xml") => "svg",
        _ if bytes.starts_with(b"wOF2") => "woff2",
        _ if bytes.starts_with(b"wOFF") => "woff",
        _ if bytes.len() > 8 && &bytes[4..8] == b"ftyp" => "mp4",
        _ if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) => "webm",
        _ => DEFAULT_EXTENSION,
    }
}
