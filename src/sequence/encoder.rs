//! Video encoders fed with ordered still frames.

use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use clap::ValueEnum;
use image::codecs::gif::{GifEncoder as GifWriter, Repeat};
use image::{Delay, Frame, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{DxError, Result};

/// Built-in encoder choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncoderKind {
    /// Animated GIF, no external tools.
    #[default]
    Gif,
    /// System `ffmpeg` producing MP4.
    Ffmpeg,
}

/// Parameters of one encoding session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DxError::Encoding(
                "encode width/height must be non-zero".to_string(),
            ));
        }
        if self.fps == 0 {
            return Err(DxError::Encoding("encode fps must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Bytes in one raw RGBA frame, or an error when that overflows `usize`.
    pub fn frame_byte_len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                DxError::Encoding(format!(
                    "frame {}x{} is too large to buffer",
                    self.width, self.height
                ))
            })
    }
}

/// A finished container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVideo {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// Encoding capability: open a session, submit frames in order, close.
pub trait VideoEncoder {
    type Session;

    /// Media type of the produced container.
    fn media_type(&self) -> &str;

    /// Realtime encoders consume frames at playback pace and need a
    /// settle delay before closing.
    fn realtime(&self) -> bool {
        false
    }

    fn open(&mut self, config: &EncoderConfig) -> Result<Self::Session>;

    fn submit_frame(&mut self, session: &mut Self::Session, frame: &RgbaImage) -> Result<()>;

    fn close(&mut self, session: Self::Session) -> Result<EncodedVideo>;
}

/// Animated GIF encoder on top of `image`.
#[derive(Debug, Clone, Copy)]
pub struct GifEncoder {
    /// NeuQuant speed, 1 (best) to 30 (fastest).
    speed: i32,
}

impl Default for GifEncoder {
    fn default() -> Self {
        Self { speed: 10 }
    }
}

impl GifEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed.clamp(1, 30);
        self
    }
}

pub struct GifSession {
    config: EncoderConfig,
    frames: Vec<Frame>,
}

impl VideoEncoder for GifEncoder {
    type Session = GifSession;

    fn media_type(&self) -> &str {
        "image/gif"
    }

    fn open(&mut self, config: &EncoderConfig) -> Result<GifSession> {
        config.validate()?;
        Ok(GifSession {
            config: *config,
            frames: Vec::new(),
        })
    }

    fn submit_frame(&mut self, session: &mut GifSession, frame: &RgbaImage) -> Result<()> {
        check_frame_size(&session.config, frame)?;
        let delay = Delay::from_numer_denom_ms(1000, session.config.fps);
        session
            .frames
            .push(Frame::from_parts(frame.clone(), 0, 0, delay));
        Ok(())
    }

    #[instrument(skip_all, fields(frames = session.frames.len()))]
    fn close(&mut self, session: GifSession) -> Result<EncodedVideo> {
        if session.frames.is_empty() {
            return Err(DxError::Encoding("no frames submitted".to_string()));
        }
        let mut bytes = Vec::new();
        {
            let mut writer = GifWriter::new_with_speed(&mut bytes, self.speed);
            writer
                .set_repeat(Repeat::Infinite)
                .map_err(|e| DxError::Encoding(format!("gif: {e}")))?;
            writer
                .encode_frames(session.frames)
                .map_err(|e| DxError::Encoding(format!("gif: {e}")))?;
        }
        debug!(size = bytes.len(), "GIF encoded");
        Ok(EncodedVideo {
            bytes,
            media_type: self.media_type().to_string(),
        })
    }
}

/// Whether a usable `ffmpeg` binary is on `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Encodes through the system `ffmpeg` binary.
///
/// Raw RGBA frames go to stdin; a fragmented MP4 comes back on stdout, so
/// nothing touches the filesystem.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
    /// Background that translucent pixels are flattened onto.
    background: [u8; 4],
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            background: [255, 255, 255, 255],
        }
    }
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: [u8; 4]) -> Self {
        self.background = background;
        self
    }
}

/// A running `ffmpeg` child. Dropping an unclosed session kills and reaps it.
#[derive(Debug)]
pub struct FfmpegSession {
    config: EncoderConfig,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    scratch: Vec<u8>,
}

impl VideoEncoder for FfmpegEncoder {
    type Session = FfmpegSession;

    fn media_type(&self) -> &str {
        "video/mp4"
    }

    #[instrument(skip(self))]
    fn open(&mut self, config: &EncoderConfig) -> Result<FfmpegSession> {
        config.validate()?;
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(DxError::Encoding(
                "encode width/height must be even (required for yuv420p mp4 output)".to_string(),
            ));
        }
        let frame_len = config.frame_byte_len()?;

        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd.args([
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", config.width, config.height),
            "-r",
            &config.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "frag_keyframe+empty_moov",
            "-f",
            "mp4",
            "pipe:1",
        ]);

        let mut child = cmd.spawn().map_err(|e| {
            DxError::Encoding(format!(
                "failed to spawn {} (is it installed and on PATH?): {e}",
                self.program
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DxError::Encoding("failed to open ffmpeg stdin".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DxError::Encoding("failed to open ffmpeg stdout".to_string()))?;

        // Drain stdout concurrently so ffmpeg never blocks on a full pipe.
        let reader = std::thread::spawn(move || {
            let mut out = Vec::new();
            stdout.read_to_end(&mut out)?;
            Ok(out)
        });

        Ok(FfmpegSession {
            scratch: vec![0u8; frame_len],
            config: *config,
            child: Some(child),
            stdin: Some(stdin),
            reader: Some(reader),
        })
    }

    fn submit_frame(&mut self, session: &mut FfmpegSession, frame: &RgbaImage) -> Result<()> {
        check_frame_size(&session.config, frame)?;
        flatten_to_opaque(&mut session.scratch, frame.as_raw(), self.background);

        let Some(stdin) = session.stdin.as_mut() else {
            return Err(DxError::Encoding(
                "ffmpeg session is already closed".to_string(),
            ));
        };
        stdin.write_all(&session.scratch).map_err(|e| {
            DxError::Encoding(format!("failed to write frame to ffmpeg stdin: {e}"))
        })
    }

    #[instrument(skip_all)]
    fn close(&mut self, mut session: FfmpegSession) -> Result<EncodedVideo> {
        drop(session.stdin.take());

        let child = session
            .child
            .take()
            .ok_or_else(|| DxError::Encoding("ffmpeg session is already closed".to_string()))?;
        let output = child
            .wait_with_output()
            .map_err(|e| DxError::Encoding(format!("failed to wait for ffmpeg: {e}")))?;

        let bytes = match session.reader.take().map(JoinHandle::join) {
            Some(Ok(Ok(bytes))) => bytes,
            Some(Ok(Err(e))) => {
                return Err(DxError::Encoding(format!("failed to read ffmpeg output: {e}")));
            }
            Some(Err(_)) => {
                return Err(DxError::Encoding("ffmpeg reader thread panicked".to_string()));
            }
            None => Vec::new(),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DxError::Encoding(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if bytes.is_empty() {
            return Err(DxError::Encoding("ffmpeg produced no output".to_string()));
        }

        debug!(size = bytes.len(), "MP4 encoded");
        Ok(EncodedVideo {
            bytes,
            media_type: self.media_type().to_string(),
        })
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "ffmpeg already exited");
            }
            match child.wait() {
                Ok(status) => debug!(%status, "Abandoned ffmpeg session reaped"),
                Err(e) => warn!(error = %e, "Failed to reap ffmpeg"),
            }
        }
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("ffmpeg reader thread panicked");
            }
        }
    }
}

fn check_frame_size(config: &EncoderConfig, frame: &RgbaImage) -> Result<()> {
    if frame.dimensions() != (config.width, config.height) {
        return Err(DxError::Encoding(format!(
            "frame size mismatch: got {}x{}, expected {}x{}",
            frame.width(),
            frame.height(),
            config.width,
            config.height
        )));
    }
    Ok(())
}

/// Composite straight-alpha RGBA onto an opaque background.
fn flatten_to_opaque(dst: &mut [u8], src: &[u8], bg: [u8; 4]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let a = u16::from(s[3]);
        if a == 255 {
            d.copy_from_slice(s);
            continue;
        }
        let inv = 255 - a;
        for c in 0..3 {
            let v = mul_div255(u16::from(s[c]), a) + mul_div255(u16::from(bg[c]), inv);
            d[c] = v.min(255) as u8;
        }
        d[3] = 255;
    }
}

fn mul_div255(x: u16, y: u16) -> u16 {
    ((u32::from(x) * u32::from(y) + 127) / 255) as u16
}
