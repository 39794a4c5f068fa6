//! One synchronous tick: capture → extract → estimate → schedule → publish.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::audio::features::FeatureConfig;
use crate::audio::{
    AudioSource, BpmEstimator, CaptureError, DeviceInfo, FeatureExtractor, FeatureSet,
};
use crate::diagnostics::{BpmReading, Diagnostics, SessionStatus};
use crate::pattern::scheduler::DEFAULT_ROTATION_SECS;
use crate::pattern::{PatternCatalog, PatternScheduler};
use crate::render::{RenderBackend, RenderFrame};

/// Immutable per-session parameters, built once from settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub catalog: PatternCatalog,
    pub rotation_secs: f64,
    /// Fixed tempo; detection is skipped when set.
    pub manual_bpm: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            catalog: PatternCatalog::default(),
            rotation_secs: DEFAULT_ROTATION_SECS,
            manual_bpm: None,
        }
    }
}

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub frame: RenderFrame,
    pub diagnostics: Diagnostics,
    /// A beat onset was detected on this tick.
    pub peak: bool,
    /// The active pattern changed on this tick.
    pub switched: bool,
}

pub struct Pipeline {
    source: Box<dyn AudioSource>,
    backends: Vec<Box<dyn RenderBackend>>,
    extractor: FeatureExtractor,
    estimator: BpmEstimator,
    scheduler: PatternScheduler<StdRng>,
    manual_bpm: Option<u32>,
    device: Option<DeviceInfo>,
    /// Last non-zero tempo estimate of this session.
    last_bpm: u32,
    last_features: FeatureSet,
    last_time: f64,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        backends: Vec<Box<dyn RenderBackend>>,
    ) -> Self {
        Self::with_rng(config, source, backends, StdRng::from_entropy())
    }

    pub fn with_rng(
        config: PipelineConfig,
        source: Box<dyn AudioSource>,
        backends: Vec<Box<dyn RenderBackend>>,
        rng: StdRng,
    ) -> Self {
        if let Some(bpm) = config.manual_bpm {
            log::info!("Manual tempo: {bpm} BPM, detection disabled");
        }
        Self {
            source,
            backends,
            extractor: FeatureExtractor::new(config.features),
            estimator: BpmEstimator::new(),
            scheduler: PatternScheduler::new(config.catalog, config.rotation_secs, 0.0, rng),
            manual_bpm: config.manual_bpm,
            device: None,
            last_bpm: 0,
            last_features: FeatureSet::default(),
            last_time: 0.0,
        }
    }

    /// Acquire the audio source and reset per-session state. Session time restarts at 0.
    pub fn open(&mut self) -> Result<DeviceInfo, CaptureError> {
        self.reset_session_state();
        let info = self.source.open()?;
        log::info!(
            "Audio source open: {} ({} Hz, buffer {}, {} bins)",
            info.label,
            info.sample_rate,
            info.buffer_size,
            info.bin_count
        );
        self.device = Some(info.clone());
        Ok(info)
    }

    /// Release the source and drop tempo history.
    pub fn close(&mut self) {
        self.source.close();
        self.estimator.reset();
        self.device = None;
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Run one tick at `now` seconds since session start.
    pub fn tick(&mut self, now: f64) -> Result<TickOutcome, CaptureError> {
        let audio = self.source.sample()?;
        let features = self.extractor.extract(&audio);

        let peak = match self.manual_bpm {
            Some(_) => false,
            None => {
                let update = self.estimator.update(features.volume, now);
                if update.bpm > 0 {
                    self.last_bpm = update.bpm;
                }
                update.peak
            }
        };
        let bpm = self.bpm_reading().value();

        let schedule = self.scheduler.tick(now);
        let pattern = self.scheduler.active_pattern();

        let frame = RenderFrame {
            time: now,
            features,
            waveform: Arc::from(audio.time_domain),
            spectrum: Arc::from(audio.frequency_bands),
            pattern_index: schedule.index,
            pattern_count: self.scheduler.catalog().len(),
            pattern_id: Arc::from(pattern.id.as_str()),
            bpm,
            beat_hz: bpm as f32 / 60.0,
        };
        for backend in &mut self.backends {
            backend.publish(&frame);
        }

        log::debug!(
            "tick {now:.2}s vol={:.3} bass={:.2} mid={:.2} high={:.2} bpm={bpm}{}",
            features.volume,
            features.bass,
            features.mid,
            features.high,
            if peak { " peak" } else { "" }
        );

        self.last_features = features;
        self.last_time = now;

        Ok(TickOutcome {
            frame,
            diagnostics: self.diagnostics(SessionStatus::Running),
            peak,
            switched: schedule.switched,
        })
    }

    pub fn bpm_reading(&self) -> BpmReading {
        match (self.manual_bpm, self.last_bpm) {
            (Some(bpm), _) => BpmReading::Manual(bpm),
            (None, 0) => BpmReading::NotDetected,
            (None, bpm) => BpmReading::Auto(bpm),
        }
    }

    /// Snapshot of the latest tick under the given status.
    pub fn diagnostics(&self, status: SessionStatus) -> Diagnostics {
        let pattern = self.scheduler.active_pattern();
        Diagnostics {
            status,
            device: self.device.clone(),
            time: self.last_time,
            volume: self.last_features.volume,
            signal_present: self.last_features.signal_present,
            bpm: self.bpm_reading(),
            pattern_name: pattern.name.clone(),
            pattern_index: self.scheduler.active_index(),
            pattern_count: self.scheduler.catalog().len(),
        }
    }

    fn reset_session_state(&mut self) {
        self.estimator.reset();
        self.scheduler.restart(0.0);
        self.last_bpm = 0;
        self.last_features = FeatureSet::default();
        self.last_time = 0.0;
    }
}
