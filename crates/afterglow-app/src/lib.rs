//! Audio-reactive pattern driver: microphone features, tempo estimation and
//! timed pattern rotation, published to pluggable render backends.

pub mod audio;
pub mod diagnostics;
pub mod pattern;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod settings;
