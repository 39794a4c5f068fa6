use bytemuck::{Pod, Zeroable};

use super::RenderFrame;

/// Per-frame scalars packed for GPU upload (64 bytes).
/// Field order is the layout renderers bind against.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub time: f32,
    pub volume: f32,
    pub bass: f32,
    pub mid: f32,
    // 16 bytes

    pub high: f32,
    /// 1.0 when a signal is present, else 0.0.
    pub signal: f32,
    pub bpm: f32,
    pub beat_hz: f32,
    // 32 bytes

    pub pattern_index: f32,
    pub pattern_count: f32,
    pub waveform_len: f32,
    pub spectrum_len: f32,
    // 48 bytes

    // Padding to 64 bytes
    pub _pad: [f32; 4],
}

impl FrameUniforms {
    pub fn from_frame(frame: &RenderFrame) -> Self {
        Self {
            time: frame.time as f32,
            volume: frame.features.volume,
            bass: frame.features.bass,
            mid: frame.features.mid,
            high: frame.features.high,
            signal: if frame.features.signal_present { 1.0 } else { 0.0 },
            bpm: frame.bpm as f32,
            beat_hz: frame.beat_hz,
            pattern_index: frame.pattern_index as f32,
            pattern_count: frame.pattern_count as f32,
            waveform_len: frame.waveform.len() as f32,
            spectrum_len: frame.spectrum.len() as f32,
            _pad: [0.0; 4],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FeatureSet;

    #[test]
    fn frame_uniforms_size_64() {
        assert_eq!(std::mem::size_of::<FrameUniforms>(), 64);
    }

    #[test]
    fn frame_uniforms_zeroed() {
        let u: FrameUniforms = bytemuck::Zeroable::zeroed();
        assert_eq!(u.time, 0.0);
        assert_eq!(u.signal, 0.0);
        assert_eq!(u.bpm, 0.0);
        assert_eq!(u._pad, [0.0; 4]);
    }

    #[test]
    fn packs_frame_scalars() {
        let frame = RenderFrame {
            time: 12.5,
            features: FeatureSet {
                volume: 0.25,
                bass: 0.5,
                mid: 0.75,
                high: 1.0,
                signal_present: true,
            },
            waveform: vec![0.0; 8].into(),
            spectrum: vec![0.0; 4].into(),
            pattern_index: 3,
            pattern_count: 14,
            pattern_id: "kaleidoscope".into(),
            bpm: 120,
            beat_hz: 2.0,
        };
        let u = FrameUniforms::from_frame(&frame);
        assert_eq!(u.time, 12.5);
        assert_eq!(u.volume, 0.25);
        assert_eq!(u.high, 1.0);
        assert_eq!(u.signal, 1.0);
        assert_eq!(u.bpm, 120.0);
        assert_eq!(u.beat_hz, 2.0);
        assert_eq!(u.pattern_index, 3.0);
        assert_eq!(u.pattern_count, 14.0);
        assert_eq!(u.waveform_len, 8.0);
        assert_eq!(u.spectrum_len, 4.0);
        assert_eq!(u.as_bytes().len(), 64);
        assert_eq!(&u.as_bytes()[..4], &12.5f32.to_ne_bytes());
    }
}
