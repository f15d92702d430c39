//! Rough duration estimates shown before an export starts.

use std::time::Duration;

use crate::sequence::DEFAULT_SETTLE_DELAY;

/// Typical wall time of one whole-surface or element capture.
const PER_CAPTURE: Duration = Duration::from_millis(150);
/// One render tick between isolation passes.
const PER_TICK: Duration = Duration::from_millis(16);
/// Zip packaging and hand-off.
const PACKAGE_OVERHEAD: Duration = Duration::from_millis(200);

/// Export mode with the sizes that drive its cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExportMode {
    Canvas,
    Shapes { count: usize },
    Stacked { layers: usize },
    Video { duration: f64, fps: u32, realtime: bool },
}

/// Heuristic wall-clock estimate for `mode`.
pub fn estimate_duration(mode: ExportMode) -> Duration {
    match mode {
        ExportMode::Canvas => PER_CAPTURE,
        ExportMode::Shapes { count } => PER_CAPTURE * count as u32 + PACKAGE_OVERHEAD,
        ExportMode::Stacked { layers } => {
            (PER_CAPTURE + PER_TICK) * layers as u32 + PACKAGE_OVERHEAD
        }
        ExportMode::Video {
            duration,
            fps,
            realtime,
        } => {
            let frames = (duration.max(0.0) * f64::from(fps)).ceil() as u32;
            let capture = (PER_CAPTURE + PER_TICK) * frames;
            if realtime && fps > 0 {
                capture + Duration::from_secs_f64(f64::from(frames) / f64::from(fps)) + DEFAULT_SETTLE_DELAY
            } else {
                capture
            }
        }
    }
}
