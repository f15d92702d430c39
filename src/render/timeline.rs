//! Time-seek collaborators.
//!
//! Animation math is opaque to the export pipeline: it only asks a
//! [`Timeline`] to move the design to a point in time and waits for that to
//! resolve.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, instrument, trace, warn};

use super::raster::RasterSurface;
use super::surface::RenderSurface;
use crate::error::{DxError, Result};
use crate::model::AnimationTrack;

/// Property name to sampled value.
pub type SampledValues = BTreeMap<String, f64>;

/// Seek-to-time capability driven by the sequence renderer.
#[allow(async_fn_in_trait)]
pub trait Timeline<S: RenderSurface> {
    /// Whatever `seek` may change on a surface, recorded before a render.
    type Snapshot;

    /// Record the surface state that seeking would overwrite.
    fn snapshot(&self, surface: &S) -> Self::Snapshot;

    /// Put a recorded state back. Failures are logged, not returned.
    fn restore(&mut self, surface: &mut S, snapshot: Self::Snapshot);

    /// Move the design on `surface` to `time` seconds; resolves once applied.
    async fn seek(&mut self, surface: &mut S, time: f64) -> Result<()>;

    /// Animated property values of one element at `time`.
    fn sample(&self, element_id: &str, time: f64) -> SampledValues;

    /// Time of the last keyframe, when the timeline knows it.
    fn duration(&self) -> Option<f64> {
        None
    }
}

/// Timeline for designs without animation. Seeking is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticTimeline;

impl<S: RenderSurface> Timeline<S> for StaticTimeline {
    type Snapshot = ();

    fn snapshot(&self, _surface: &S) {}

    fn restore(&mut self, _surface: &mut S, _snapshot: ()) {}

    async fn seek(&mut self, _surface: &mut S, _time: f64) -> Result<()> {
        Ok(())
    }

    fn sample(&self, _element_id: &str, _time: f64) -> SampledValues {
        SampledValues::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
struct Keyframe {
    time: f64,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct TrackData {
    property: String,
    keyframes: Vec<Keyframe>,
}

#[derive(Debug, Clone, PartialEq)]
struct Track {
    element_id: String,
    property: String,
    /// Sorted by time, never empty.
    keyframes: Vec<Keyframe>,
}

impl Track {
    fn value_at(&self, time: f64) -> f64 {
        let first = self.keyframes[0];
        if time <= first.time {
            return first.value;
        }
        for pair in self.keyframes.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let span = b.time - a.time;
                if span <= 0.0 {
                    return b.value;
                }
                let t = (time - a.time) / span;
                return (b.value - a.value).mul_add(t, a.value);
            }
        }
        self.keyframes[self.keyframes.len() - 1].value
    }
}

/// Linear keyframe interpolation over numeric tracks.
///
/// Tracks are `{ "property": "x", "keyframes": [{ "time": 0, "value": 10 }] }`.
/// Anything else (easing curves, non-numeric values) is skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeTimeline {
    tracks: Vec<Track>,
}

impl KeyframeTimeline {
    pub fn from_tracks(tracks: &[AnimationTrack]) -> Self {
        let mut parsed = Vec::with_capacity(tracks.len());
        for track in tracks {
            let data = serde_json::Value::Object(track.data.clone());
            match serde_json::from_value::<TrackData>(data) {
                Ok(data) if !data.keyframes.is_empty() => {
                    let mut keyframes = data.keyframes;
                    keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));
                    parsed.push(Track {
                        element_id: track.element_id.clone(),
                        property: data.property,
                        keyframes,
                    });
                }
                Ok(_) => trace!(element = %track.element_id, "Track without keyframes skipped"),
                Err(e) => debug!(element = %track.element_id, error = %e, "Unsupported track skipped"),
            }
        }
        Self { tracks: parsed }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn end_time(&self) -> Option<f64> {
        self.tracks
            .iter()
            .filter_map(|t| t.keyframes.last().map(|k| k.time))
            .reduce(f64::max)
    }
}

/// One animated property as it was before a render.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyValue {
    pub element_id: String,
    pub property: String,
    pub value: f64,
}

impl Timeline<RasterSurface> for KeyframeTimeline {
    type Snapshot = Vec<PropertyValue>;

    fn snapshot(&self, surface: &RasterSurface) -> Vec<PropertyValue> {
        self.tracks
            .iter()
            .filter_map(|t| {
                surface
                    .property(&t.element_id, &t.property)
                    .map(|value| PropertyValue {
                        element_id: t.element_id.clone(),
                        property: t.property.clone(),
                        value,
                    })
            })
            .collect()
    }

    fn restore(&mut self, surface: &mut RasterSurface, snapshot: Vec<PropertyValue>) {
        // Reverse order so the first recorded value wins for repeated tracks.
        for saved in snapshot.iter().rev() {
            if let Err(e) = surface.set_property(&saved.element_id, &saved.property, saved.value) {
                warn!(element = %saved.element_id, property = %saved.property, error = %e, "Failed to restore animated property");
            }
        }
        debug!(properties = snapshot.len(), "Animated properties restored");
    }

    #[instrument(skip(self, surface), fields(tracks = self.tracks.len()))]
    async fn seek(&mut self, surface: &mut RasterSurface, time: f64) -> Result<()> {
        for track in &self.tracks {
            let value = track.value_at(time);
            surface
                .set_property(&track.element_id, &track.property, value)
                .map_err(|e| DxError::SeekFailed {
                    time,
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn sample(&self, element_id: &str, time: f64) -> SampledValues {
        self.tracks
            .iter()
            .filter(|t| t.element_id == element_id)
            .map(|t| (t.property.clone(), t.value_at(time)))
            .collect()
    }

    fn duration(&self) -> Option<f64> {
        self.end_time()
    }
}
