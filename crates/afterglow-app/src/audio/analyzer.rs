use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::AudioFrame;

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const DEFAULT_MIN_DB: f32 = -100.0;
pub const DEFAULT_MAX_DB: f32 = -30.0;

/// Analyser tunables. `fft_size` must be a power of two.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    /// Temporal smoothing of bin magnitudes (0 = none, <1).
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
        }
    }
}

/// Sliding-window spectrum analyser.
///
/// Keeps the latest `fft_size` samples and turns them into an `AudioFrame`:
/// the raw window as the time-domain buffer and `fft_size / 2` smoothed,
/// dB-scaled bins normalized to 0.0-1.0 as the frequency buffer.
pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    fft_buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let fft_size = config.fft_size.max(2).next_power_of_two();
        let config = AnalyzerConfig { fft_size, ..config };

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        log::info!(
            "Spectrum analyzer: {fft_size}-point, {} bins, smoothing {:.2}",
            fft_size / 2,
            config.smoothing
        );

        Self {
            config,
            fft,
            window: blackman_window(fft_size),
            time_domain: vec![0.0; fft_size],
            fft_buffer: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Append new samples, dropping the oldest.
    pub fn push(&mut self, samples: &[f32]) {
        let size = self.config.fft_size;
        let shift = samples.len().min(size);
        if shift < size {
            self.time_domain.copy_within(shift.., 0);
        }
        let src_offset = samples.len() - shift;
        self.time_domain[size - shift..].copy_from_slice(&samples[src_offset..]);
    }

    /// Snapshot the current window and its spectrum.
    pub fn frame(&mut self) -> AudioFrame {
        self.compute_fft();
        AudioFrame {
            time_domain: self.time_domain.clone(),
            frequency_bands: self.normalized_bins(),
        }
    }

    /// Clear the sample window and smoothing history.
    pub fn reset(&mut self) {
        self.time_domain.fill(0.0);
        self.smoothed.fill(0.0);
    }

    fn compute_fft(&mut self) {
        for (i, slot) in self.fft_buffer.iter_mut().enumerate() {
            *slot = Complex::new(self.time_domain[i] * self.window[i], 0.0);
        }

        self.fft.process(&mut self.fft_buffer);

        let scale = 1.0 / self.config.fft_size as f32;
        let tau = self.config.smoothing.clamp(0.0, 0.999);
        for (k, s) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft_buffer[k].norm() * scale;
            *s = tau * *s + (1.0 - tau) * magnitude;
        }
    }

    fn normalized_bins(&self) -> Vec<f32> {
        let range = (self.config.max_db - self.config.min_db).max(f32::EPSILON);
        self.smoothed
            .iter()
            .map(|&m| {
                if m <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * m.log10();
                ((db - self.config.min_db) / range).clamp(0.0, 1.0)
            })
            .collect()
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = std::f32::consts::TAU * i as f32 / n;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
