//! Output side of the tick: immutable frame snapshots and the backends that consume them.

pub mod osc;
pub mod uniforms;

pub use osc::OscBackend;
pub use uniforms::FrameUniforms;

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::audio::FeatureSet;

/// Frames queued between the tick and a renderer before the oldest is dropped.
const FRAME_QUEUE_DEPTH: usize = 4;

/// Everything a renderer needs for one frame. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderFrame {
    /// Seconds since session start.
    pub time: f64,
    pub features: FeatureSet,
    pub waveform: Arc<[f32]>,
    pub spectrum: Arc<[f32]>,
    pub pattern_index: usize,
    pub pattern_count: usize,
    pub pattern_id: Arc<str>,
    /// 0 while no tempo is known.
    pub bpm: u32,
    /// `bpm / 60`.
    pub beat_hz: f32,
}

impl RenderFrame {
    pub fn uniforms(&self) -> FrameUniforms {
        FrameUniforms::from_frame(self)
    }
}

/// Anything that accepts published frames.
pub trait RenderBackend: Send {
    fn publish(&mut self, frame: &RenderFrame);

    /// Time of the most recently published frame (0.0 before the first).
    fn current_frame_time(&self) -> f64;
}

/// In-process handoff to a renderer thread. Never blocks the tick.
pub struct ChannelBackend {
    tx: Sender<RenderFrame>,
    // Used to evict the oldest frame when the renderer falls behind
    drain: Receiver<RenderFrame>,
    last_time: f64,
}

/// Renderer end of a `ChannelBackend`.
#[derive(Clone)]
pub struct FrameReceiver {
    rx: Receiver<RenderFrame>,
}

/// Create a connected backend/receiver pair.
pub fn frame_channel() -> (ChannelBackend, FrameReceiver) {
    let (tx, rx) = bounded(FRAME_QUEUE_DEPTH);
    (
        ChannelBackend {
            tx,
            drain: rx.clone(),
            last_time: 0.0,
        },
        FrameReceiver { rx },
    )
}

impl RenderBackend for ChannelBackend {
    fn publish(&mut self, frame: &RenderFrame) {
        self.last_time = frame.time;
        let mut pending = frame.clone();
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    let _ = self.drain.try_recv();
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    fn current_frame_time(&self) -> f64 {
        self.last_time
    }
}

impl FrameReceiver {
    /// Drain the queue and return the newest frame, if any arrived.
    pub fn latest(&self) -> Option<RenderFrame> {
        self.rx.try_iter().last()
    }

    /// Block up to `timeout` for a frame, then drain to the newest.
    pub fn wait_latest(&self, timeout: Duration) -> Option<RenderFrame> {
        let first = self.rx.recv_timeout(timeout).ok()?;
        Some(self.rx.try_iter().last().unwrap_or(first))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    pub(crate) fn frame_at(time: f64) -> RenderFrame {
        RenderFrame {
            time,
            features: FeatureSet::default(),
            waveform: Arc::from(vec![0.0; 4]),
            spectrum: Arc::from(vec![0.0; 2]),
            pattern_index: 0,
            pattern_count: 1,
            pattern_id: Arc::from("p0"),
            bpm: 0,
            beat_hz: 0.0,
        }
    }

    /// Backend double that keeps every frame it was handed.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingBackend {
        pub frames: Arc<Mutex<Vec<RenderFrame>>>,
    }

    impl RenderBackend for RecordingBackend {
        fn publish(&mut self, frame: &RenderFrame) {
            self.frames.lock().unwrap().push(frame.clone());
        }

        fn current_frame_time(&self) -> f64 {
            self.frames.lock().unwrap().last().map_or(0.0, |f| f.time)
        }
    }

    #[test]
    fn latest_returns_newest_frame() {
        let (mut backend, receiver) = frame_channel();
        assert!(receiver.latest().is_none());
        backend.publish(&frame_at(0.05));
        backend.publish(&frame_at(0.10));
        assert_eq!(receiver.latest().unwrap().time, 0.10);
        assert!(receiver.latest().is_none());
    }

    #[test]
    fn full_queue_evicts_oldest() {
        let (mut backend, receiver) = frame_channel();
        for i in 0..20 {
            backend.publish(&frame_at(f64::from(i)));
        }
        assert_eq!(backend.current_frame_time(), 19.0);
        let frames: Vec<f64> = receiver.rx.try_iter().map(|f| f.time).collect();
        assert_eq!(frames, vec![16.0, 17.0, 18.0, 19.0]);
    }

    #[test]
    fn publish_after_receiver_dropped_is_silent() {
        let (mut backend, receiver) = frame_channel();
        drop(receiver);
        for i in 0..10 {
            backend.publish(&frame_at(f64::from(i)));
        }
        assert_eq!(backend.current_frame_time(), 9.0);
    }

    #[test]
    fn wait_latest_times_out_when_idle() {
        let (_backend, receiver) = frame_channel();
        assert!(receiver.wait_latest(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn wait_latest_skips_stale_frames() {
        let (mut backend, receiver) = frame_channel();
        backend.publish(&frame_at(1.0));
        backend.publish(&frame_at(2.0));
        let frame = receiver.wait_latest(Duration::from_millis(10)).unwrap();
        assert_eq!(frame.time, 2.0);
    }

    #[test]
    fn frame_clone_shares_buffers() {
        let frame = frame_at(1.0);
        let copy = frame.clone();
        assert!(Arc::ptr_eq(&frame.waveform, &copy.waveform));
        assert_eq!(frame.uniforms(), copy.uniforms());
    }
}
