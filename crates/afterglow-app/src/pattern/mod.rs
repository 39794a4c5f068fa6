pub mod scheduler;

pub use scheduler::{PatternScheduler, ScheduleTick};

use std::fmt;

use thiserror::Error;

/// Built-in catalog: (id, display name), in rotation order.
pub const DEFAULT_PATTERNS: &[(&str, &str)] = &[
    ("heartbeat_pulse", "Heartbeat Pulse"),
    ("rhythmic_breathing", "Rhythmic Breathing"),
    ("tunnel_zoom", "Tunnel Zoom"),
    ("liquid_metal", "Liquid Metal"),
    ("kaleidoscope", "Kaleidoscope"),
    ("wave_interference", "Wave Interference"),
    ("waveform_visualizer", "Waveform Visualizer"),
    ("particle_field", "Particle Field"),
    ("organic_growth", "Organic Growth"),
    ("crystal_formation", "Crystal Formation"),
    ("energy_streams", "Energy Streams"),
    ("morphing_grid", "Morphing Grid"),
    ("fluid_dynamics", "Fluid Dynamics"),
    ("neural_network", "Neural Network"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("pattern catalog must contain at least one pattern")]
    Empty,
}

/// One visual parameterization the renderer knows how to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub id: String,
    pub name: String,
}

impl Pattern {
    /// Build a pattern from its id, using the built-in display name when known.
    pub fn from_id(id: &str) -> Self {
        let name = DEFAULT_PATTERNS
            .iter()
            .find(|(known, _)| *known == id)
            .map(|(_, name)| (*name).to_string())
            .unwrap_or_else(|| title_case(id));
        Self {
            id: id.to_string(),
            name,
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Ordered, non-empty, immutable list of patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternCatalog {
    patterns: Vec<Pattern>,
}

impl PatternCatalog {
    pub fn new(patterns: Vec<Pattern>) -> Result<Self, CatalogError> {
        if patterns.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { patterns })
    }

    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Result<Self, CatalogError> {
        Self::new(ids.iter().map(|id| Pattern::from_id(id.as_ref())).collect())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Pattern> {
        self.patterns.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }
}

impl Default for PatternCatalog {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .map(|(id, name)| Pattern {
                    id: (*id).to_string(),
                    name: (*name).to_string(),
                })
                .collect(),
        }
    }
}

fn title_case(id: &str) -> String {
    id.split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
