//! Video export: per-frame capture driven by a timeline, then encoding.

mod encoder;
mod renderer;

pub use encoder::{
    EncodedVideo, EncoderConfig, EncoderKind, FfmpegEncoder, FfmpegSession, GifEncoder,
    GifSession, VideoEncoder, is_ffmpeg_on_path,
};
pub use renderer::{
    CancelHandle, DEFAULT_SETTLE_DELAY, MAX_FRAMES, RenderOutcome, SequencePhase, SequenceProgress,
    SequenceRenderer, SequenceSettings,
};

/// File extension for a container media type; parameters are ignored.
pub fn extension_for_media_type(media_type: &str) -> &'static str {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence.to_ascii_lowercase().as_str() {
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "image/gif" => "gif",
        "video/quicktime" => "mov",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_media_type() {
        assert_eq!(extension_for_media_type("video/mp4"), "mp4");
        assert_eq!(extension_for_media_type("video/webm;codecs=vp9"), "webm");
        assert_eq!(extension_for_media_type("image/gif"), "gif");
        assert_eq!(extension_for_media_type("application/x-unknown"), "bin");
    }
}
