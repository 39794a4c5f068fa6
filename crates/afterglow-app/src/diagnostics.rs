use std::fmt;

use crate::audio::DeviceInfo;

/// Lifecycle of the ticking session as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Running,
    /// Microphone access refused; waiting for a user retry.
    Denied,
    /// The input device went away mid-session.
    DeviceLost,
    Stopped,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Denied => "denied",
            Self::DeviceLost => "device lost",
            Self::Stopped => "stopped",
        })
    }
}

/// Tempo as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BpmReading {
    NotDetected,
    Auto(u32),
    Manual(u32),
}

impl BpmReading {
    pub fn value(self) -> u32 {
        match self {
            Self::NotDetected => 0,
            Self::Auto(bpm) | Self::Manual(bpm) => bpm,
        }
    }
}

impl fmt::Display for BpmReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotDetected => f.write_str("not detected"),
            Self::Auto(bpm) => write!(f, "{bpm} (auto)"),
            Self::Manual(bpm) => write!(f, "{bpm} (manual)"),
        }
    }
}

/// Point-in-time view of the session for logs and status lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    pub status: SessionStatus,
    pub device: Option<DeviceInfo>,
    /// Seconds since session start.
    pub time: f64,
    pub volume: f32,
    pub signal_present: bool,
    pub bpm: BpmReading,
    pub pattern_name: String,
    /// Zero-based.
    pub pattern_index: usize,
    pub pattern_count: usize,
}

impl Diagnostics {
    pub fn idle() -> Self {
        Self::with_status(SessionStatus::Idle)
    }

    pub fn with_status(status: SessionStatus) -> Self {
        Self {
            status,
            device: None,
            time: 0.0,
            volume: 0.0,
            signal_present: false,
            bpm: BpmReading::NotDetected,
            pattern_name: String::new(),
            pattern_index: 0,
            pattern_count: 0,
        }
    }

    pub fn volume_percent(&self) -> u32 {
        (self.volume.clamp(0.0, 1.0) * 100.0).round() as u32
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] mic: ", self.status)?;
        match (&self.device, self.status) {
            (_, SessionStatus::Denied) => f.write_str("denied")?,
            (Some(dev), _) => write!(
                f,
                "{} ({} Hz, buffer {})",
                dev.label, dev.sample_rate, dev.buffer_size
            )?,
            (None, _) => f.write_str("none")?,
        }
        write!(f, " | volume {}%", self.volume_percent())?;
        if self.signal_present {
            f.write_str(" (signal)")?;
        }
        write!(f, " | bpm {}", self.bpm)?;
        if self.pattern_count > 0 {
            write!(
                f,
                " | pattern {} ({}/{})",
                self.pattern_name,
                self.pattern_index + 1,
                self.pattern_count
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> Diagnostics {
        Diagnostics {
            status: SessionStatus::Running,
            device: Some(DeviceInfo {
                label: "USB Mic".into(),
                sample_rate: 48000,
                buffer_size: 2048,
                bin_count: 1024,
            }),
            time: 3.0,
            volume: 0.423,
            signal_present: true,
            bpm: BpmReading::Auto(120),
            pattern_name: "Tunnel Zoom".into(),
            pattern_index: 2,
            pattern_count: 14,
        }
    }

    #[test]
    fn running_line() {
        assert_eq!(
            running().to_string(),
            "[running] mic: USB Mic (48000 Hz, buffer 2048) | volume 42% (signal) | bpm 120 (auto) | pattern Tunnel Zoom (3/14)"
        );
    }

    #[test]
    fn denied_hides_device() {
        let d = Diagnostics::with_status(SessionStatus::Denied);
        assert_eq!(d.to_string(), "[denied] mic: denied | volume 0% | bpm not detected");
    }

    #[test]
    fn manual_bpm_is_marked() {
        let d = Diagnostics {
            bpm: BpmReading::Manual(90),
            ..running()
        };
        assert!(d.to_string().contains("bpm 90 (manual)"));
        assert_eq!(d.bpm.value(), 90);
        assert_eq!(BpmReading::NotDetected.value(), 0);
    }

    #[test]
    fn volume_percent_is_clamped() {
        let mut d = running();
        d.volume = 1.7;
        assert_eq!(d.volume_percent(), 100);
        d.volume = -0.2;
        assert_eq!(d.volume_percent(), 0);
    }

    #[test]
    fn status_labels() {
        assert_eq!(SessionStatus::DeviceLost.to_string(), "device lost");
        assert_eq!(Diagnostics::default().status, SessionStatus::Idle);
    }
}
