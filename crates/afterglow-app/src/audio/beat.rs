//! Volume-peak tempo estimation: adaptive threshold → refractory peak gate → interval averaging.

use std::collections::VecDeque;

/// Minimum gap between two peaks (seconds).
pub const REFRACTORY_SECS: f64 = 0.3;
/// Keep this many inter-peak intervals for averaging.
pub const MAX_INTERVALS: usize = 10;
/// Intervals required before a tempo is reported.
pub const MIN_INTERVALS: usize = 3;

const THRESHOLD_MIN: f32 = 0.3;
const THRESHOLD_MAX: f32 = 0.8;
const THRESHOLD_GAIN: f32 = 0.8;
const INITIAL_THRESHOLD: f32 = 0.7;

/// Mutable detector state. Lives for one audio session.
#[derive(Debug, Clone, PartialEq)]
pub struct BeatState {
    /// Time of the last accepted peak (seconds since stream start).
    pub last_peak: Option<f64>,
    /// Most recent inter-peak durations, oldest first.
    pub recent_intervals: VecDeque<f64>,
    pub threshold: f32,
    /// 0 = not yet determined.
    pub current_bpm: u32,
}

impl Default for BeatState {
    fn default() -> Self {
        Self {
            last_peak: None,
            recent_intervals: VecDeque::with_capacity(MAX_INTERVALS + 1),
            threshold: INITIAL_THRESHOLD,
            current_bpm: 0,
        }
    }
}

/// Result of one estimator step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatUpdate {
    /// A peak was accepted on this tick.
    pub peak: bool,
    /// Tempo estimate, 0 while fewer than `MIN_INTERVALS` intervals are known.
    pub bpm: u32,
}

/// Tracks beat onsets in the volume stream and derives BPM from their spacing.
///
/// Advanced once per tick. Has no failure path: silence just keeps reporting 0.
#[derive(Debug, Default)]
pub struct BpmEstimator {
    state: BeatState,
}

impl BpmEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one volume sample taken at `now` (seconds, non-decreasing).
    pub fn update(&mut self, volume: f32, now: f64) -> BeatUpdate {
        let volume = if volume.is_finite() { volume } else { 0.0 };
        // Threshold adapts every tick, before the peak test
        self.state.threshold = (volume * THRESHOLD_GAIN).clamp(THRESHOLD_MIN, THRESHOLD_MAX);

        let peak = self.detect_peak(volume, now);

        let bpm = if self.state.recent_intervals.len() >= MIN_INTERVALS {
            let sum: f64 = self.state.recent_intervals.iter().sum();
            let avg = sum / self.state.recent_intervals.len() as f64;
            self.state.current_bpm = (60.0 / avg).round() as u32;
            self.state.current_bpm
        } else {
            0
        };

        BeatUpdate { peak, bpm }
    }

    fn detect_peak(&mut self, volume: f32, now: f64) -> bool {
        if volume <= self.state.threshold {
            return false;
        }
        match self.state.last_peak {
            Some(last) if now - last <= REFRACTORY_SECS => false,
            Some(last) => {
                self.state.recent_intervals.push_back(now - last);
                if self.state.recent_intervals.len() > MAX_INTERVALS {
                    self.state.recent_intervals.pop_front();
                }
                self.state.last_peak = Some(now);
                true
            }
            None => {
                // First peak seeds timing only
                self.state.last_peak = Some(now);
                true
            }
        }
    }

    pub fn state(&self) -> &BeatState {
        &self.state
    }

    pub fn current_bpm(&self) -> u32 {
        self.state.current_bpm
    }

    /// Drop all history (session stopped).
    pub fn reset(&mut self) {
        self.state = BeatState::default();
    }
}
