//! Streaming metrics over a sequence of GPS fixes.
//!
//! [`MetricsComputer`] folds one [`LocationSample`] at a time into running
//! distance, smoothed current speed, top speed, and cumulative vertical drop.
//! Sensor anomalies are treated as filterable noise and rejected at the input
//! boundary; nothing here raises, logs, or does I/O.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::LocationSample;

/// Tuning parameters for the metrics engine.
///
/// Each threshold is independently adjustable; the defaults are the values
/// the engine ships with.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Fixes with a reported accuracy radius above this are discarded (m).
    pub max_horizontal_accuracy_m: f64,
    /// Device-reported speeds above this are treated as absent (km/h).
    pub max_speed_kmh: f64,
    /// Minimum interval between accepted fixes (s); closer fixes are dropped.
    pub min_dt_sec: f64,
    /// Sliding median window over observed speeds. Forced odd, minimum 3.
    pub median_window: usize,
    /// Low-pass coefficient; higher is smoother.
    pub low_pass_alpha: f64,
    /// Relative difference between device and geometric speed above which
    /// the pair is considered inconsistent.
    pub consistency_tolerance: f64,
    /// Multiplier bounding per-step distance against the trusted speed.
    pub clamp_overshoot_ratio: f64,
    /// Below this smoothed speed the device is assumed stationary and no
    /// distance accrues (km/h).
    pub min_speed_for_distance_kmh: f64,
    /// Altitude changes smaller than this are noise (m).
    pub min_vertical_change_m: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_horizontal_accuracy_m: 30.0,
            max_speed_kmh: 120.0,
            min_dt_sec: 0.2,
            median_window: 5,
            low_pass_alpha: 0.80,
            consistency_tolerance: 0.35,
            clamp_overshoot_ratio: 1.5,
            min_speed_for_distance_kmh: 0.8,
            min_vertical_change_m: 2.0,
        }
    }
}

/// Stateful filter turning raw fixes into session metrics.
///
/// Exclusively owned by one recorder at a time; all mutation goes through
/// [`consume_sample`] and [`reset`].
///
/// [`consume_sample`]: MetricsComputer::consume_sample
/// [`reset`]: MetricsComputer::reset
#[derive(Clone, Debug)]
pub struct MetricsComputer {
    cfg: MetricsConfig,

    distance_km: f64,
    current_speed_kmh: f64,
    top_speed_kmh: f64,
    vertical_drop_m: u32,
    vertical_drop_accum: f64,

    last_location: Option<LocationSample>,
    last_smooth_speed: f64,
    speed_window: VecDeque<f64>,
    last_altitude: Option<f64>,
}

impl MetricsComputer {
    pub fn new(cfg: MetricsConfig) -> Self {
        Self {
            cfg,
            distance_km: 0.0,
            current_speed_kmh: 0.0,
            top_speed_kmh: 0.0,
            vertical_drop_m: 0,
            vertical_drop_accum: 0.0,
            last_location: None,
            last_smooth_speed: 0.0,
            speed_window: VecDeque::new(),
            last_altitude: None,
        }
    }

    /// Accumulated distance in kilometers. Non-decreasing within a session.
    pub fn distance_km(&self) -> f64 {
        self.distance_km
    }

    /// Most recent smoothed speed estimate in km/h.
    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    /// Running maximum of the smoothed speed in km/h.
    pub fn top_speed_kmh(&self) -> f64 {
        self.top_speed_kmh
    }

    /// Cumulative descent in whole meters. Non-decreasing within a session.
    pub fn vertical_drop_m(&self) -> u32 {
        self.vertical_drop_m
    }

    /// Clear all accumulators and smoothing state. Must run before the first
    /// fix of a new session.
    pub fn reset(&mut self) {
        self.distance_km = 0.0;
        self.current_speed_kmh = 0.0;
        self.top_speed_kmh = 0.0;
        self.vertical_drop_m = 0;
        self.vertical_drop_accum = 0.0;

        self.last_location = None;
        self.last_smooth_speed = 0.0;
        self.speed_window.clear();
        self.last_altitude = None;
    }

    /// Fold one fix into the running metrics.
    ///
    /// Fixes with a poor accuracy radius, or arriving closer than
    /// `min_dt_sec` after the previous accepted fix, are discarded without
    /// touching any state.
    pub fn consume_sample(&mut self, sample: LocationSample) {
        if let Some(accuracy) = sample.accuracy_m {
            if accuracy <= 0.0 || accuracy > self.cfg.max_horizontal_accuracy_m {
                return;
            }
        }

        let prev = self.last_location;
        let mut dt = 0.0;
        if let Some(prev) = prev {
            dt = sample.timestamp_ms.saturating_sub(prev.timestamp_ms) as f64 / 1000.0;
            if dt < self.cfg.min_dt_sec {
                return;
            }
        }

        // Device speed, m/s to km/h. Out-of-range readings count as absent.
        let mut raw_speed_kmh: Option<f64> = None;
        if let Some(v) = sample.speed_mps {
            if v.is_finite() && v >= 0.0 {
                let kmh = v * 3.6;
                if kmh <= self.cfg.max_speed_kmh {
                    raw_speed_kmh = Some(kmh);
                }
            }
        }

        // Second estimate from displacement over time.
        let mut delta_km = 0.0;
        let mut v_delta_kmh: Option<f64> = None;
        if let Some(prev) = prev {
            delta_km = prev.distance_to(&sample) / 1000.0;
            if dt > 0.0 {
                v_delta_kmh = Some(delta_km / (dt / 3600.0));
            }
        }

        let observed_speed_kmh = raw_speed_kmh.or(v_delta_kmh).unwrap_or(0.0).max(0.0);

        // When the two estimates disagree, trust the smaller one and bound
        // the distance this step may contribute.
        let mut distance_to_accumulate_km = delta_km;
        if let (Some(raw), Some(v_delta)) = (raw_speed_kmh, v_delta_kmh) {
            if v_delta > 0.0 {
                let rel_diff = (raw - v_delta).abs() / v_delta;
                if rel_diff > self.cfg.consistency_tolerance {
                    let trusted = raw.min(v_delta);
                    let max_allowed_km = (trusted / 3600.0) * dt * self.cfg.clamp_overshoot_ratio;
                    distance_to_accumulate_km = distance_to_accumulate_km.min(max_allowed_km);
                }
            }
        }

        // Median rejects single-sample spikes, the low pass keeps the rest
        // responsive.
        let median = self.push_and_median(observed_speed_kmh);
        let smooth = low_pass(self.last_smooth_speed, median, self.cfg.low_pass_alpha);
        self.last_smooth_speed = smooth;
        self.current_speed_kmh = smooth;

        self.top_speed_kmh = self.top_speed_kmh.max(smooth);

        // Only downward altitude changes past the noise floor count.
        if let Some(alt) = sample.altitude_m.filter(|a| a.is_finite()) {
            if let Some(last_alt) = self.last_altitude {
                let delta_alt = alt - last_alt;
                if delta_alt < -self.cfg.min_vertical_change_m {
                    self.vertical_drop_accum += -delta_alt;
                    self.vertical_drop_m = self.vertical_drop_accum.round() as u32;
                }
            }
            self.last_altitude = Some(alt);
        }

        // Below the stationary threshold, positional jitter must not accrue
        // distance. Above it, the smoothed speed bounds the step a second
        // time.
        if smooth >= self.cfg.min_speed_for_distance_kmh && dt > 0.0 {
            let max_by_smooth_km = (smooth / 3600.0) * dt * self.cfg.clamp_overshoot_ratio;
            self.distance_km += distance_to_accumulate_km.min(max_by_smooth_km);
        }

        self.last_location = Some(sample);
    }

    fn push_and_median(&mut self, value: f64) -> f64 {
        let window = (self.cfg.median_window | 1).max(3);
        self.speed_window.push_back(value);
        while self.speed_window.len() > window {
            self.speed_window.pop_front();
        }
        let mut sorted: Vec<f64> = self.speed_window.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        sorted[sorted.len() / 2]
    }
}

impl Default for MetricsComputer {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

fn low_pass(prev: f64, current: f64, alpha: f64) -> f64 {
    alpha * prev + (1.0 - alpha) * current
}
