use serde::{Deserialize, Serialize};

use super::AudioFrame;

/// Peak-to-peak amplitude below which the input counts as silence.
/// 10 counts on an 8-bit analyser scale, expressed on the normalized [-1, 1] scale.
pub const DEFAULT_NOISE_FLOOR: f32 = 10.0 / 128.0;

/// Normalized spectrum positions sampled for bass, mid and high.
pub const DEFAULT_BAND_POSITIONS: [f32; 3] = [0.1, 0.5, 0.9];

/// Compact per-tick description of one audio frame, all values normalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub volume: f32, // RMS of the time-domain buffer
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub signal_present: bool,
}

/// Tunables for feature extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureConfig {
    pub noise_floor: f32,
    /// Low/mid/high sample positions along the frequency axis (0.0-1.0).
    pub band_positions: [f32; 3],
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            noise_floor: DEFAULT_NOISE_FLOOR,
            band_positions: DEFAULT_BAND_POSITIONS,
        }
    }
}

/// Stateless frame → feature reduction.
///
/// Bands are point samples of the spectrum rather than averages, so a single
/// bin moving shows up immediately in the output.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    config: FeatureConfig,
}

impl FeatureExtractor {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn extract(&self, frame: &AudioFrame) -> FeatureSet {
        let [low, mid, high] = self.config.band_positions;
        FeatureSet {
            volume: rms(&frame.time_domain),
            bass: sample_at(&frame.frequency_bands, low),
            mid: sample_at(&frame.frequency_bands, mid),
            high: sample_at(&frame.frequency_bands, high),
            signal_present: peak_to_peak(&frame.time_domain) > self.config.noise_floor,
        }
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_sq = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    if !mean_sq.is_finite() {
        return 0.0;
    }
    mean_sq.sqrt().min(1.0)
}

/// Nearest-texel lookup: bin `floor(position * len)`.
fn sample_at(bands: &[f32], position: f32) -> f32 {
    if bands.is_empty() {
        return 0.0;
    }
    let last = bands.len() - 1;
    let idx = ((position.clamp(0.0, 1.0) * bands.len() as f32).floor() as usize).min(last);
    bands[idx].clamp(0.0, 1.0)
}

fn peak_to_peak(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let (lo, hi) = samples
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &s| {
            (lo.min(s), hi.max(s))
        });
    hi - lo
}
