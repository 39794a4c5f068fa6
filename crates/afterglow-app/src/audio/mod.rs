pub mod analyzer;
pub mod beat;
pub mod capture;
pub mod features;
pub mod source;

pub use beat::{BeatState, BpmEstimator};
pub use capture::CaptureError;
pub use features::{FeatureExtractor, FeatureSet};
pub use source::{AudioSource, DeviceInfo, MicSource};

/// One tick's worth of raw audio: the latest time-domain window and its spectrum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioFrame {
    /// Mono samples in [-1, 1], oldest first.
    pub time_domain: Vec<f32>,
    /// Normalized bin energies in [0, 1], low to high frequency.
    pub frequency_bands: Vec<f32>,
}
