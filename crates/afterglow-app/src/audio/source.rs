use super::AudioFrame;
use super::analyzer::{AnalyzerConfig, SpectrumAnalyzer};
use super::capture::{AudioCapture, CaptureError, RingBuffer};

/// What an opened source reports about itself (for diagnostics).
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub label: String,
    pub sample_rate: u32,
    /// Time-domain buffer length.
    pub buffer_size: usize,
    /// Frequency bin count.
    pub bin_count: usize,
}

/// Anything that can hand the tick a fresh `AudioFrame`.
pub trait AudioSource: Send {
    /// Acquire the device. May fail with `PermissionDenied` or `DeviceUnavailable`.
    fn open(&mut self) -> Result<DeviceInfo, CaptureError>;

    /// Freshest available frame. Errors are terminal for the session.
    fn sample(&mut self) -> Result<AudioFrame, CaptureError>;

    /// Release the device. Safe to call more than once.
    fn close(&mut self);
}

/// Microphone source: cpal capture → sliding analyser window.
pub struct MicSource {
    device: Option<String>,
    capture: Option<AudioCapture>,
    analyzer: SpectrumAnalyzer,
    read_buf: Vec<f32>,
}

impl MicSource {
    pub fn new(device: Option<String>, analyzer: AnalyzerConfig) -> Self {
        Self {
            device,
            capture: None,
            analyzer: SpectrumAnalyzer::new(analyzer),
            read_buf: vec![0.0; 8192],
        }
    }

    pub fn is_open(&self) -> bool {
        self.capture.is_some()
    }

    pub fn list_devices() -> Vec<String> {
        AudioCapture::list_devices()
    }

    fn drain_ring(&mut self, ring: &RingBuffer) {
        loop {
            let read = ring.read(&mut self.read_buf);
            if read == 0 {
                break;
            }
            self.analyzer.push(&self.read_buf[..read]);
        }
    }
}

impl AudioSource for MicSource {
    fn open(&mut self) -> Result<DeviceInfo, CaptureError> {
        self.close();
        let capture = AudioCapture::open(self.device.as_deref())?;
        let info = DeviceInfo {
            label: capture.device_name.clone(),
            sample_rate: capture.sample_rate,
            buffer_size: self.analyzer.fft_size(),
            bin_count: self.analyzer.bin_count(),
        };
        self.analyzer.reset();
        self.capture = Some(capture);
        Ok(info)
    }

    fn sample(&mut self) -> Result<AudioFrame, CaptureError> {
        let capture = self
            .capture
            .as_ref()
            .ok_or_else(|| CaptureError::DeviceUnavailable("audio source not open".into()))?;
        if capture.device_lost() {
            let err =
                CaptureError::DeviceUnavailable(format!("{} disconnected", capture.device_name));
            self.close();
            return Err(err);
        }
        let ring = capture.ring.clone();
        self.drain_ring(&ring);
        Ok(self.analyzer.frame())
    }

    fn close(&mut self) {
        if let Some(capture) = self.capture.take() {
            log::info!("Closing audio capture on {}", capture.device_name);
        }
    }
}

impl Drop for MicSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_before_open_is_unavailable() {
        let mut src = MicSource::new(None, AnalyzerConfig::default());
        assert!(matches!(src.sample(), Err(CaptureError::DeviceUnavailable(_))));
    }

    #[test]
    fn close_is_idempotent() {
        let mut src = MicSource::new(None, AnalyzerConfig::default());
        src.close();
        src.close();
        assert!(!src.is_open());
    }
}
