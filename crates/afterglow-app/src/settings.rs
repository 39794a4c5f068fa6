use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::audio::analyzer::{
    AnalyzerConfig, DEFAULT_FFT_SIZE, DEFAULT_MAX_DB, DEFAULT_MIN_DB, DEFAULT_SMOOTHING,
};
use crate::audio::features::{DEFAULT_BAND_POSITIONS, DEFAULT_NOISE_FLOOR, FeatureConfig};
use crate::pattern::scheduler::DEFAULT_ROTATION_SECS;
use crate::pattern::{DEFAULT_PATTERNS, PatternCatalog};
use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;

const APP_DIR: &str = "afterglow";
const SETTINGS_FILE: &str = "settings.json";

/// OSC output target for an external renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscOutputConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for OscOutputConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "127.0.0.1".to_string(),
            port: 9001,
        }
    }
}

/// Persisted user settings. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub version: u32,
    /// Input device label; `None` = host default.
    pub audio_device: Option<String>,
    pub tick_ms: u64,
    pub rotation_secs: f64,
    /// Pattern ids in catalog order.
    pub patterns: Vec<String>,
    pub noise_floor: f32,
    pub band_positions: [f32; 3],
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
    /// Fixed tempo; disables detection when set.
    pub manual_bpm: Option<u32>,
    pub retry_delay_ms: u64,
    pub osc: OscOutputConfig,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version: 1,
            audio_device: None,
            tick_ms: 50,
            rotation_secs: DEFAULT_ROTATION_SECS,
            patterns: DEFAULT_PATTERNS.iter().map(|(id, _)| (*id).to_string()).collect(),
            noise_floor: DEFAULT_NOISE_FLOOR,
            band_positions: DEFAULT_BAND_POSITIONS,
            fft_size: DEFAULT_FFT_SIZE,
            smoothing: DEFAULT_SMOOTHING,
            min_db: DEFAULT_MIN_DB,
            max_db: DEFAULT_MAX_DB,
            manual_bpm: None,
            retry_delay_ms: 1000,
            osc: OscOutputConfig::default(),
        }
    }
}

impl SettingsConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
    }

    /// Load from the user config dir, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            log::info!("No config directory, using default settings");
            return Self::default();
        };
        if !path.exists() {
            log::info!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Failed to load settings: {e:#}");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().context("no config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("Saved settings to {}", path.display());
        Ok(())
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            fft_size: self.fft_size,
            smoothing: self.smoothing,
            min_db: self.min_db,
            max_db: self.max_db,
        }
    }

    /// Immutable per-session pipeline parameters.
    pub fn pipeline_config(&self) -> PipelineConfig {
        let catalog = match PatternCatalog::from_ids(&self.patterns) {
            Ok(catalog) => catalog,
            Err(e) => {
                log::warn!("{e}; using the built-in catalog");
                PatternCatalog::default()
            }
        };
        let rotation_secs = if self.rotation_secs.is_finite() && self.rotation_secs > 0.0 {
            self.rotation_secs
        } else {
            log::warn!(
                "Invalid rotation interval {}, using {DEFAULT_ROTATION_SECS}s",
                self.rotation_secs
            );
            DEFAULT_ROTATION_SECS
        };
        PipelineConfig {
            features: FeatureConfig {
                noise_floor: self.noise_floor,
                band_positions: self.band_positions,
            },
            catalog,
            rotation_secs,
            manual_bpm: self.manual_bpm.filter(|&bpm| bpm > 0),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick: Duration::from_millis(self.tick_ms.max(1)),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}
