use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cpal::Stream;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

/// Ring buffer size (power of 2 for fast modular arithmetic).
const RING_SIZE: usize = 65536;
const RING_MASK: u32 = (RING_SIZE - 1) as u32;

/// Capture-layer failures. All of them end the current session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl CaptureError {
    /// Sort a backend error message into the capture taxonomy.
    pub fn classify(message: String) -> Self {
        let lower = message.to_lowercase();
        if ["permission", "denied", "not authorized", "not permitted"]
            .iter()
            .any(|needle| lower.contains(needle))
        {
            Self::PermissionDenied(message)
        } else {
            Self::Stream(message)
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<cpal::BuildStreamError> for CaptureError {
    fn from(e: cpal::BuildStreamError) -> Self {
        match e {
            cpal::BuildStreamError::DeviceNotAvailable => Self::DeviceUnavailable(e.to_string()),
            other => Self::classify(other.to_string()),
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for CaptureError {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        match e {
            cpal::DefaultStreamConfigError::DeviceNotAvailable => {
                Self::DeviceUnavailable(e.to_string())
            }
            other => Self::classify(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for CaptureError {
    fn from(e: cpal::PlayStreamError) -> Self {
        match e {
            cpal::PlayStreamError::DeviceNotAvailable => Self::DeviceUnavailable(e.to_string()),
            other => Self::classify(other.to_string()),
        }
    }
}

/// Lock-free single-producer single-consumer ring buffer for audio samples.
/// Samples are stored as f32 bit patterns so both sides stay in safe code.
pub struct RingBuffer {
    data: Box<[AtomicU32]>,
    write_pos: AtomicU32,
    read_pos: AtomicU32,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            data: (0..RING_SIZE).map(|_| AtomicU32::new(0)).collect(),
            write_pos: AtomicU32::new(0),
            read_pos: AtomicU32::new(0),
        }
    }

    /// Push samples (called from the cpal callback thread only).
    pub fn push(&self, samples: &[f32]) {
        let mut wp = self.write_pos.load(Ordering::Relaxed);
        for &sample in samples {
            let idx = (wp & RING_MASK) as usize;
            self.data[idx].store(sample.to_bits(), Ordering::Relaxed);
            wp = wp.wrapping_add(1);
        }
        self.write_pos.store(wp, Ordering::Release);
    }

    /// Read available samples into dst. Returns number of samples read.
    /// If the writer lapped the reader, the overwritten samples are skipped.
    pub fn read(&self, dst: &mut [f32]) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let mut rp = self.read_pos.load(Ordering::Relaxed);
        if wp.wrapping_sub(rp) as usize > RING_SIZE {
            rp = wp.wrapping_sub(RING_SIZE as u32);
        }
        let available = wp.wrapping_sub(rp) as usize;
        let to_read = available.min(dst.len());

        for (i, slot) in dst.iter_mut().take(to_read).enumerate() {
            let idx = (rp.wrapping_add(i as u32) & RING_MASK) as usize;
            *slot = f32::from_bits(self.data[idx].load(Ordering::Relaxed));
        }

        self.read_pos
            .store(rp.wrapping_add(to_read as u32), Ordering::Release);
        to_read
    }

    /// Number of samples available to read.
    pub fn available(&self) -> usize {
        let wp = self.write_pos.load(Ordering::Acquire);
        let rp = self.read_pos.load(Ordering::Relaxed);
        (wp.wrapping_sub(rp) as usize).min(RING_SIZE)
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Live cpal input stream feeding a ring buffer with mono samples.
pub struct AudioCapture {
    _stream: Stream,
    pub ring: Arc<RingBuffer>,
    pub sample_rate: u32,
    pub channels: u16,
    pub device_name: String,
    device_lost: Arc<AtomicBool>,
}

impl AudioCapture {
    /// Open the named input device, or the host default when `device` is None
    /// or no longer present.
    pub fn open(device: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device {
            Some(wanted) => find_input_device(&host, wanted).or_else(|| {
                log::info!("Audio device '{wanted}' not found, using default input");
                host.default_input_device()
            }),
            None => host.default_input_device(),
        }
        .ok_or_else(|| CaptureError::DeviceUnavailable("no audio input device found".into()))?;

        let device_name = device_label(&device);
        log::info!("Audio capture device: {device_name}");

        let config = device.default_input_config()?;
        let sample_rate = config.sample_rate();
        let channels = config.channels();
        log::info!("Audio config: {sample_rate}Hz, {channels}ch, {:?}", config.sample_format());

        let ring = Arc::new(RingBuffer::new());
        let ring_clone = ring.clone();
        let device_lost = Arc::new(AtomicBool::new(false));
        let lost_flag = device_lost.clone();
        let channel_count = usize::from(channels.max(1));

        let stream = device.build_input_stream(
            &config.into(),
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Downmix to mono
                if channel_count == 1 {
                    ring_clone.push(data);
                } else {
                    let mono: Vec<f32> = data
                        .chunks(channel_count)
                        .map(|frame| frame.iter().sum::<f32>() / channel_count as f32)
                        .collect();
                    ring_clone.push(&mono);
                }
            },
            move |err| {
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    lost_flag.store(true, Ordering::Release);
                }
                log::error!("Audio stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!("Audio capture started");

        Ok(Self {
            _stream: stream,
            ring,
            sample_rate,
            channels,
            device_name,
            device_lost,
        })
    }

    /// True once the backend reported the device gone.
    pub fn device_lost(&self) -> bool {
        self.device_lost.load(Ordering::Acquire)
    }

    pub fn list_devices() -> Vec<String> {
        let host = cpal::default_host();
        host.input_devices()
            .map(|devices| devices.map(|d| device_label(&d)).collect())
            .unwrap_or_default()
    }
}

fn device_label(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.name().to_string())
        .unwrap_or_else(|_| "Unknown".into())
}

fn find_input_device(host: &cpal::Host, wanted: &str) -> Option<cpal::Device> {
    host.input_devices()
        .ok()?
        .find(|d| device_label(d) == wanted)
}
