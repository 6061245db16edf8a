//! Core ski session metrics library implemented in Rust.
//!
//! Turns a stream of noisy GPS fixes into stable session metrics: distance,
//! smoothed current speed, top speed, and cumulative vertical drop. The engine
//! is a synchronous per-sample fold; platform glue (or the GPX replayer below)
//! pushes fixes in timestamp order.

use std::io::Cursor;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod baro;
pub mod metrics;
pub mod recorder;
pub mod session;

pub use baro::BarometricAltimeter;
pub use metrics::{MetricsComputer, MetricsConfig};
pub use recorder::{
    LocationSource, RecordingState, ReplaySource, SamplingMode, SessionRecorder,
};
pub use session::{FileSessionStore, SessionStore, SkiSession};

#[derive(Error, Debug)]
pub enum SnowError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("insufficient data for session metrics")]
    InsufficientData,
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("session store failure: {0}")]
    Store(String),
}

/// A single position fix from the sampling subsystem.
///
/// Latitude/longitude are only ever consumed through [`distance_to`]. The
/// accuracy radius, device speed, and altitude are each independently
/// optional; absent fields degrade to fallback estimates inside the engine.
///
/// [`distance_to`]: LocationSample::distance_to
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Monotonic timestamp in milliseconds. Fixes must arrive in
    /// non-decreasing timestamp order.
    pub timestamp_ms: u64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters, if reported.
    pub accuracy_m: Option<f64>,
    /// Device-reported speed in m/s, if reported.
    pub speed_mps: Option<f64>,
    /// Altitude in meters, if reported.
    pub altitude_m: Option<f64>,
}

impl LocationSample {
    pub fn new(timestamp_ms: u64, latitude: f64, longitude: f64) -> Self {
        Self {
            timestamp_ms,
            latitude,
            longitude,
            accuracy_m: None,
            speed_mps: None,
            altitude_m: None,
        }
    }

    pub fn with_details(
        timestamp_ms: u64,
        latitude: f64,
        longitude: f64,
        accuracy_m: Option<f64>,
        speed_mps: Option<f64>,
        altitude_m: Option<f64>,
    ) -> Self {
        Self {
            timestamp_ms,
            latitude,
            longitude,
            accuracy_m,
            speed_mps,
            altitude_m,
        }
    }

    /// Great-circle distance to another fix, in meters.
    pub fn distance_to(&self, other: &LocationSample) -> f64 {
        haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let r = 6_371_000.0_f64;
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    r * c
}

/// A stretch of track with no fixes for longer than the gap threshold.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Gap {
    /// Timestamp of the last fix before the gap (ms).
    pub start_ms: u64,
    /// Length of the gap in seconds.
    pub duration_sec: f64,
}

/// Find inter-sample gaps longer than `gap_sec` in a timestamp-ordered track.
pub fn detect_gaps(samples: &[LocationSample], gap_sec: f64) -> Vec<Gap> {
    let mut gaps = Vec::new();
    for pair in samples.windows(2) {
        let dt = (pair[1].timestamp_ms.saturating_sub(pair[0].timestamp_ms)) as f64 / 1000.0;
        if dt > gap_sec {
            gaps.push(Gap {
                start_ms: pair[0].timestamp_ms,
                duration_sec: dt,
            });
        }
    }
    gaps
}

/// Parse GPX bytes into location samples.
///
/// Only timestamped track points are kept. Elevation and device speed map to
/// the optional sample fields when present; GPX carries no accuracy radius,
/// so `accuracy_m` is always `None`.
pub fn parse_gpx_samples(input: &[u8]) -> Result<Vec<LocationSample>, SnowError> {
    use gpx::read;

    let mut cursor = Cursor::new(input);
    let gpx = read(&mut cursor).map_err(|e| SnowError::GpxParse(e.to_string()))?;
    let mut out = Vec::new();

    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                if let Some(time) = point.time {
                    let iso = time
                        .format()
                        .map_err(|e| SnowError::GpxParse(e.to_string()))?;
                    let utc: DateTime<Utc> = DateTime::parse_from_rfc3339(&iso)
                        .map_err(|e| SnowError::GpxParse(e.to_string()))?
                        .with_timezone(&Utc);
                    let point_geo = point.point();
                    let mut sample = LocationSample::new(
                        utc.timestamp_millis().max(0) as u64,
                        point_geo.y(),
                        point_geo.x(),
                    );
                    sample.altitude_m = point.elevation;
                    sample.speed_mps = point.speed;
                    out.push(sample);
                }
            }
        }
    }
    Ok(out)
}

/// Run a full recorded track through the engine and return the session.
///
/// The session clock is driven by the track's own time axis: recording
/// "starts" at the first fix and "stops" at the last, so duration and average
/// speed come out as they would have live.
pub fn replay_samples(
    samples: &[LocationSample],
    config: MetricsConfig,
) -> Result<SkiSession, SnowError> {
    let first = samples.first().ok_or(SnowError::InsufficientData)?;
    let last = samples.last().ok_or(SnowError::InsufficientData)?;

    let mut recorder = SessionRecorder::new(ReplaySource, MetricsComputer::new(config));
    recorder.start_at(first.timestamp_ms);
    for sample in samples {
        recorder.push_sample(*sample);
    }
    recorder.stop_at(last.timestamp_ms).ok_or(SnowError::InsufficientData)
}
