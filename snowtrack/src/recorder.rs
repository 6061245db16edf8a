//! Session recording lifecycle around the metrics engine.

use chrono::Utc;
use uuid::Uuid;

use crate::metrics::MetricsComputer;
use crate::session::SkiSession;
use crate::LocationSample;

/// Sampling cadence hint for the location source. Active while skiing,
/// Idle on a lift or during a break; switching does not change the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingMode {
    Active,
    Idle,
}

/// Recorder lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// Seam to the platform positioning subsystem.
///
/// Implementations own the actual update subscription; delivery happens by
/// pushing fixes into [`SessionRecorder::push_sample`] while started.
pub trait LocationSource {
    fn start(&mut self);
    fn stop(&mut self);
    fn set_sampling_mode(&mut self, mode: SamplingMode);
}

/// No-op source for replaying prerecorded tracks, where fixes are pushed
/// by the caller rather than a live subscription.
pub struct ReplaySource;

impl LocationSource for ReplaySource {
    fn start(&mut self) {}
    fn stop(&mut self) {}
    fn set_sampling_mode(&mut self, _mode: SamplingMode) {}
}

/// Two-state session recorder owning the sampling source and the metrics
/// engine.
///
/// `start` and `stop` in the wrong state are deliberate no-ops rather than
/// errors; a stop in `Idle` simply yields no session.
pub struct SessionRecorder<S: LocationSource> {
    source: S,
    metrics: MetricsComputer,
    state: RecordingState,
    session_start_ms: u64,
}

impl<S: LocationSource> SessionRecorder<S> {
    pub fn new(source: S, metrics: MetricsComputer) -> Self {
        Self {
            source,
            metrics,
            state: RecordingState::Idle,
            session_start_ms: 0,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.metrics.current_speed_kmh()
    }

    pub fn distance_km(&self) -> f64 {
        self.metrics.distance_km()
    }

    pub fn top_speed_kmh(&self) -> f64 {
        self.metrics.top_speed_kmh()
    }

    pub fn vertical_drop_m(&self) -> u32 {
        self.metrics.vertical_drop_m()
    }

    /// Begin a session at the current wall clock.
    pub fn start(&mut self) {
        self.start_at(now_ms());
    }

    /// Begin a session with an explicit start time in epoch milliseconds.
    /// Resets the engine, switches the source to the active cadence, and
    /// starts it. No-op unless idle.
    pub fn start_at(&mut self, start_ms: u64) {
        if self.state != RecordingState::Idle {
            return;
        }
        self.metrics.reset();
        self.session_start_ms = start_ms;
        self.source.set_sampling_mode(SamplingMode::Active);
        self.source.start();
        self.state = RecordingState::Recording;
    }

    /// Deliver one fix. Ignored unless recording, so nothing is processed
    /// between the stop snapshot and the transition to idle.
    pub fn push_sample(&mut self, sample: LocationSample) {
        if self.state != RecordingState::Recording {
            return;
        }
        self.metrics.consume_sample(sample);
    }

    /// Forward a cadence hint to the source. Ignored unless recording.
    pub fn set_sampling_mode(&mut self, mode: SamplingMode) {
        if self.state != RecordingState::Recording {
            return;
        }
        self.source.set_sampling_mode(mode);
    }

    /// End the session at the current wall clock.
    pub fn stop(&mut self) -> Option<SkiSession> {
        self.stop_at(now_ms())
    }

    /// End the session with an explicit end time in epoch milliseconds,
    /// returning the completed record. Returns `None` unless recording.
    ///
    /// The source is stopped before the metrics snapshot is taken. Engine
    /// state is left intact until the next `start`, so final values remain
    /// readable afterwards.
    pub fn stop_at(&mut self, end_ms: u64) -> Option<SkiSession> {
        if self.state != RecordingState::Recording {
            return None;
        }

        self.source.stop();
        self.state = RecordingState::Idle;

        let duration_sec = (end_ms.saturating_sub(self.session_start_ms) / 1000) as u32;
        let distance_km = self.metrics.distance_km();
        let top_speed_kmh = self.metrics.top_speed_kmh();
        let avg_speed_kmh = if duration_sec > 0 {
            distance_km / (duration_sec as f64 / 3600.0)
        } else {
            0.0
        };

        Some(SkiSession {
            id: Uuid::new_v4().to_string(),
            start_at_ms: self.session_start_ms,
            end_at_ms: end_ms,
            duration_sec,
            distance_km,
            top_speed_kmh,
            avg_speed_kmh,
            vertical_drop_m: self.metrics.vertical_drop_m(),
            resort_id: None,
        })
    }
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::metrics::MetricsConfig;

    #[derive(Default)]
    struct FakeSourceState {
        start_calls: usize,
        stop_calls: usize,
        modes: Vec<SamplingMode>,
    }

    struct FakeSource {
        state: Rc<RefCell<FakeSourceState>>,
    }

    impl FakeSource {
        fn new() -> (Self, Rc<RefCell<FakeSourceState>>) {
            let state = Rc::new(RefCell::new(FakeSourceState::default()));
            (
                Self {
                    state: Rc::clone(&state),
                },
                state,
            )
        }
    }

    impl LocationSource for FakeSource {
        fn start(&mut self) {
            self.state.borrow_mut().start_calls += 1;
        }

        fn stop(&mut self) {
            self.state.borrow_mut().stop_calls += 1;
        }

        fn set_sampling_mode(&mut self, mode: SamplingMode) {
            self.state.borrow_mut().modes.push(mode);
        }
    }

    const DEG_PER_M: f64 = 1.0 / 111_194.93;

    fn fix(t_ms: u64, north_m: f64, speed_mps: f64) -> LocationSample {
        LocationSample::with_details(
            t_ms,
            46.0 + north_m * DEG_PER_M,
            7.0,
            Some(5.0),
            Some(speed_mps),
            None,
        )
    }

    fn recorder_with_fake() -> (SessionRecorder<FakeSource>, Rc<RefCell<FakeSourceState>>) {
        let (source, state) = FakeSource::new();
        (
            SessionRecorder::new(source, MetricsComputer::new(MetricsConfig::default())),
            state,
        )
    }

    #[test]
    fn test_stop_while_idle_returns_nothing() {
        let (mut recorder, state) = recorder_with_fake();
        assert!(recorder.stop_at(1_000).is_none());
        assert_eq!(recorder.state(), RecordingState::Idle);
        assert_eq!(state.borrow().stop_calls, 0);
    }

    #[test]
    fn test_double_start_is_a_noop() {
        let (mut recorder, state) = recorder_with_fake();
        recorder.start_at(0);
        recorder.push_sample(fix(0, 0.0, 8.0));
        recorder.push_sample(fix(1_000, 8.0, 8.0));
        let distance = recorder.distance_km();
        assert!(distance > 0.0);

        // The second start neither resets the engine nor restarts the source.
        recorder.start_at(5_000);
        assert_eq!(recorder.distance_km(), distance);
        assert_eq!(state.borrow().start_calls, 1);
    }

    #[test]
    fn test_start_selects_active_cadence() {
        let (mut recorder, state) = recorder_with_fake();
        recorder.start_at(0);
        assert_eq!(state.borrow().modes, vec![SamplingMode::Active]);
        recorder.set_sampling_mode(SamplingMode::Idle);
        assert_eq!(
            state.borrow().modes,
            vec![SamplingMode::Active, SamplingMode::Idle]
        );
    }

    #[test]
    fn test_cadence_hint_ignored_while_idle() {
        let (mut recorder, state) = recorder_with_fake();
        recorder.set_sampling_mode(SamplingMode::Idle);
        assert!(state.borrow().modes.is_empty());
    }

    #[test]
    fn test_samples_ignored_while_idle() {
        let (mut recorder, _state) = recorder_with_fake();
        recorder.push_sample(fix(0, 0.0, 8.0));
        assert_eq!(recorder.distance_km(), 0.0);
        assert_eq!(recorder.current_speed_kmh(), 0.0);
    }

    #[test]
    fn test_stop_packages_session_and_keeps_metrics_readable() {
        let (mut recorder, state) = recorder_with_fake();
        recorder.start_at(10_000);
        for i in 0..30u64 {
            recorder.push_sample(fix(10_000 + i * 1000, i as f64 * 6.0, 6.0));
        }
        let session = recorder.stop_at(10_000 + 29_500).expect("session");

        assert_eq!(state.borrow().stop_calls, 1);
        assert_eq!(recorder.state(), RecordingState::Idle);

        // Floor of 29.5 s elapsed.
        assert_eq!(session.duration_sec, 29);
        assert_eq!(session.start_at_ms, 10_000);
        assert_eq!(session.end_at_ms, 39_500);
        assert!(session.distance_km > 0.0);
        assert!(session.top_speed_kmh > 0.0);
        let expected_avg = session.distance_km / (29.0 / 3600.0);
        assert!((session.avg_speed_kmh - expected_avg).abs() < 1e-9);
        assert!(session.resort_id.is_none());

        // Final values stay readable until the next start.
        assert_eq!(recorder.distance_km(), session.distance_km);
        assert_eq!(recorder.top_speed_kmh(), session.top_speed_kmh);

        // A second stop yields nothing.
        assert!(recorder.stop_at(50_000).is_none());
    }

    #[test]
    fn test_zero_duration_session_has_zero_average() {
        let (mut recorder, _state) = recorder_with_fake();
        recorder.start_at(1_000);
        let session = recorder.stop_at(1_000).expect("session");
        assert_eq!(session.duration_sec, 0);
        assert_eq!(session.avg_speed_kmh, 0.0);
    }

    #[test]
    fn test_samples_after_stop_do_not_leak_into_metrics() {
        let (mut recorder, _state) = recorder_with_fake();
        recorder.start_at(0);
        recorder.push_sample(fix(0, 0.0, 6.0));
        recorder.push_sample(fix(1_000, 6.0, 6.0));
        let session = recorder.stop_at(2_000).expect("session");

        recorder.push_sample(fix(2_000, 12.0, 6.0));
        assert_eq!(recorder.distance_km(), session.distance_km);
    }

    #[test]
    fn test_restart_resets_engine_once() {
        let (mut recorder, state) = recorder_with_fake();
        recorder.start_at(0);
        recorder.push_sample(fix(0, 0.0, 8.0));
        recorder.push_sample(fix(1_000, 8.0, 8.0));
        recorder.stop_at(2_000);

        recorder.start_at(60_000);
        assert_eq!(recorder.distance_km(), 0.0);
        assert_eq!(recorder.top_speed_kmh(), 0.0);
        assert_eq!(state.borrow().start_calls, 2);
    }

    #[test]
    fn test_end_to_end_steady_descent() {
        let (mut recorder, _state) = recorder_with_fake();
        recorder.start_at(0);

        // Sixty fixes at 1 Hz, 5 m/s device speed matching a 5 m stride,
        // 3 m of altitude lost per fix, accuracy 5 m throughout.
        for i in 0..60u64 {
            let mut s = fix(i * 1000, i as f64 * 5.0, 5.0);
            s.altitude_m = Some(2400.0 - i as f64 * 3.0);
            recorder.push_sample(s);
        }
        let session = recorder.stop_at(59_000).expect("session");

        assert_eq!(session.duration_sec, 59);
        // 59 strides of 5 m, shaved slightly by the smoothing-lag clamp on
        // the first few steps.
        assert!(session.distance_km > 0.28);
        assert!(session.distance_km <= 0.295 + 1e-9);
        // Smoothed speed settles just under the true 18 km/h.
        assert!(session.top_speed_kmh > 17.5);
        assert!(session.top_speed_kmh <= 18.0 + 1e-9);
        // 59 descents of 3 m, each past the 2 m noise floor.
        assert_eq!(session.vertical_drop_m, 177);
        assert!(session.avg_speed_kmh > 17.0);
    }
}
