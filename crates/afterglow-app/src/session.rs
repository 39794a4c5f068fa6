//! Fixed-period ticking thread around a `Pipeline`, with stop and retry semantics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::{CaptureError, DeviceInfo};
use crate::diagnostics::{Diagnostics, SessionStatus};
use crate::pipeline::Pipeline;

const DIAGNOSTICS_QUEUE_DEPTH: usize = 4;

/// Timing policy for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub tick: Duration,
    /// Delay before the single automatic retry after a permission refusal.
    pub retry_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(50),
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Owns the pipeline between runs and the tick thread while running.
pub struct Session {
    config: SessionConfig,
    /// Present while no tick thread is running.
    pipeline: Option<Pipeline>,
    thread: Option<TickThread>,
    diagnostics_rx: Receiver<Diagnostics>,
    diagnostics_tx: Sender<Diagnostics>,
    latest: Diagnostics,
}

struct TickThread {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Pipeline>,
}

impl Session {
    pub fn new(pipeline: Pipeline, config: SessionConfig) -> Self {
        let (diagnostics_tx, diagnostics_rx) = crossbeam_channel::bounded(DIAGNOSTICS_QUEUE_DEPTH);
        Self {
            config,
            latest: pipeline.diagnostics(SessionStatus::Idle),
            pipeline: Some(pipeline),
            thread: None,
            diagnostics_rx,
            diagnostics_tx,
        }
    }

    /// Open the audio source and start ticking. A running session is stopped first.
    pub fn start(&mut self) -> Result<DeviceInfo, CaptureError> {
        if self.thread.is_some() {
            self.stop();
        }
        let mut pipeline = self.pipeline.take().ok_or_else(|| {
            CaptureError::Stream("pipeline unavailable after tick thread failure".into())
        })?;

        let info = match pipeline.open() {
            Ok(info) => info,
            Err(e) => {
                let status = if e.is_permission_denied() {
                    SessionStatus::Denied
                } else {
                    SessionStatus::Stopped
                };
                log::warn!("Session not started: {e}");
                self.latest = pipeline.diagnostics(status);
                self.pipeline = Some(pipeline);
                return Err(e);
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let tx = self.diagnostics_tx.clone();
        let drain = self.diagnostics_rx.clone();
        let period = self.config.tick;

        // A spawn failure drops the pipeline along with the closure
        let handle = thread::Builder::new()
            .name("afterglow-tick".into())
            .spawn(move || tick_thread(pipeline, period, &stop_flag, &tx, &drain))
            .map_err(|e| CaptureError::Stream(format!("failed to spawn tick thread: {e}")))?;

        log::info!("Session started on {} ({} ms tick)", info.label, period.as_millis());
        self.latest = Diagnostics {
            device: Some(info.clone()),
            ..Diagnostics::with_status(SessionStatus::Running)
        };
        self.thread = Some(TickThread { stop, handle });
        Ok(info)
    }

    /// `start`, retrying once after `retry_delay` if access was refused.
    pub fn start_with_retry(&mut self) -> Result<DeviceInfo, CaptureError> {
        match self.start() {
            Err(e) if e.is_permission_denied() => {
                log::info!(
                    "Retrying microphone access in {} ms",
                    self.config.retry_delay.as_millis()
                );
                thread::sleep(self.config.retry_delay);
                self.start()
            }
            other => other,
        }
    }

    /// Stop ticking, close the source and reset tempo history. Idempotent.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        thread.stop.store(true, Ordering::Release);
        self.reclaim(thread.handle);
        // A thread that ended on device loss keeps its final status
        if self.latest.status == SessionStatus::Running {
            self.latest.status = SessionStatus::Stopped;
        }
        log::info!("Session stopped");
    }

    /// True while the tick thread is alive.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    pub fn status(&mut self) -> SessionStatus {
        self.latest_diagnostics().status
    }

    /// Drain pending snapshots and return the newest. Also reaps a thread that
    /// ended on its own (device loss).
    pub fn latest_diagnostics(&mut self) -> &Diagnostics {
        while let Ok(diag) = self.diagnostics_rx.try_recv() {
            self.latest = diag;
        }
        if self.thread.as_ref().is_some_and(|t| t.handle.is_finished()) {
            if let Some(thread) = self.thread.take() {
                self.reclaim(thread.handle);
            }
        }
        &self.latest
    }

    fn reclaim(&mut self, handle: JoinHandle<Pipeline>) {
        match handle.join() {
            Ok(pipeline) => self.pipeline = Some(pipeline),
            Err(_) => log::error!("Tick thread panicked"),
        }
        while let Ok(diag) = self.diagnostics_rx.try_recv() {
            self.latest = diag;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick loop. Returns the pipeline (closed) when stopped or when capture fails.
fn tick_thread(
    mut pipeline: Pipeline,
    period: Duration,
    stop: &AtomicBool,
    tx: &Sender<Diagnostics>,
    drain: &Receiver<Diagnostics>,
) -> Pipeline {
    let start = Instant::now();
    let mut deadline = start;

    while !stop.load(Ordering::Acquire) {
        let now = start.elapsed().as_secs_f64();
        match pipeline.tick(now) {
            Ok(outcome) => send_latest(tx, drain, outcome.diagnostics),
            Err(e) => {
                log::error!("Audio capture failed, stopping session: {e}");
                pipeline.close();
                send_latest(tx, drain, pipeline.diagnostics(SessionStatus::DeviceLost));
                return pipeline;
            }
        }

        deadline += period;
        let current = Instant::now();
        if deadline <= current {
            let mut skipped = 0u32;
            while deadline <= current {
                deadline += period;
                skipped += 1;
            }
            log::debug!("Tick overran, skipped {skipped} deadline(s)");
        }
        thread::sleep(deadline - current);
    }

    pipeline.close();
    send_latest(tx, drain, pipeline.diagnostics(SessionStatus::Stopped));
    pipeline
}

/// Non-blocking send that evicts the oldest snapshot when the queue is full.
fn send_latest(tx: &Sender<Diagnostics>, drain: &Receiver<Diagnostics>, diag: Diagnostics) {
    let mut pending = diag;
    loop {
        match tx.try_send(pending) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => return,
            Err(TrySendError::Full(back)) => {
                let _ = drain.try_recv();
                pending = back;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::pipeline::tests::{ScriptedSource, SourceLog, pulse_volumes};
    use crate::render::tests::RecordingBackend;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            tick: Duration::from_millis(5),
            retry_delay: Duration::from_millis(10),
        }
    }

    fn session(source: ScriptedSource) -> (Session, RecordingBackend, Arc<Mutex<SourceLog>>) {
        let log = source.log.clone();
        let backend = RecordingBackend::default();
        let pipeline = Pipeline::with_rng(
            PipelineConfig::default(),
            Box::new(source),
            vec![Box::new(backend.clone())],
            StdRng::seed_from_u64(1),
        );
        (Session::new(pipeline, fast_config()), backend, log)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn starts_ticks_and_stops() {
        let (mut s, backend, log) = session(ScriptedSource::new());
        assert_eq!(s.status(), SessionStatus::Idle);

        let info = s.start().unwrap();
        assert_eq!(info.label, "Scripted");
        assert!(s.is_running());
        assert!(wait_until(|| backend.frames.lock().unwrap().len() >= 5));
        assert_eq!(s.latest_diagnostics().status, SessionStatus::Running);

        s.stop();
        assert!(!s.is_running());
        assert_eq!(s.status(), SessionStatus::Stopped);
        assert_eq!(log.lock().unwrap().closes, 1);

        // No ticks after stop
        let published = backend.frames.lock().unwrap().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(backend.frames.lock().unwrap().len(), published);
    }

    #[test]
    fn frame_times_increase() {
        let (mut s, backend, _log) = session(ScriptedSource::new());
        s.start().unwrap();
        assert!(wait_until(|| backend.frames.lock().unwrap().len() >= 4));
        s.stop();
        let frames = backend.frames.lock().unwrap();
        assert!(frames[0].time < 0.5);
        assert!(frames.windows(2).all(|w| w[1].time > w[0].time));
    }

    #[test]
    fn device_loss_ends_session() {
        let mut source = ScriptedSource::new();
        source.fail_after = Some(3);
        let (mut s, backend, log) = session(source);
        s.start().unwrap();

        assert!(wait_until(|| s.status() == SessionStatus::DeviceLost));
        assert!(wait_until(|| !s.is_running()));
        assert_eq!(backend.frames.lock().unwrap().len(), 3);
        assert_eq!(log.lock().unwrap().closes, 1);

        // stop after loss is a no-op
        s.stop();
        assert_eq!(s.status(), SessionStatus::DeviceLost);
    }

    #[test]
    fn permission_denied_retries_once() {
        let mut source = ScriptedSource::new();
        source.open_errors = VecDeque::from([
            CaptureError::PermissionDenied("blocked".into()),
            CaptureError::PermissionDenied("blocked".into()),
        ]);
        let (mut s, _backend, log) = session(source);

        let err = s.start_with_retry().unwrap_err();
        assert!(err.is_permission_denied());
        assert_eq!(log.lock().unwrap().opens, 2);
        assert_eq!(s.status(), SessionStatus::Denied);
        assert!(s.latest_diagnostics().to_string().contains("mic: denied"));
        assert!(!s.is_running());

        // Explicit user retry succeeds once access is granted
        assert!(s.start().is_ok());
        assert!(s.is_running());
        s.stop();
    }

    #[test]
    fn retry_recovers_after_single_refusal() {
        let mut source = ScriptedSource::new();
        source.open_errors = VecDeque::from([CaptureError::PermissionDenied("blocked".into())]);
        let (mut s, _backend, log) = session(source);
        assert!(s.start_with_retry().is_ok());
        assert_eq!(log.lock().unwrap().opens, 2);
        s.stop();
    }

    #[test]
    fn unavailable_device_is_not_retried() {
        let mut source = ScriptedSource::new();
        source.open_errors =
            VecDeque::from([CaptureError::DeviceUnavailable("no input device".into())]);
        let (mut s, _backend, log) = session(source);
        assert!(matches!(
            s.start_with_retry(),
            Err(CaptureError::DeviceUnavailable(_))
        ));
        assert_eq!(log.lock().unwrap().opens, 1);
        assert_eq!(s.status(), SessionStatus::Stopped);
    }

    #[test]
    fn restart_begins_fresh_session() {
        let mut source = ScriptedSource::new();
        source.volumes = pulse_volumes(60, 10);
        let (mut s, backend, log) = session(source);
        s.start().unwrap();
        assert!(wait_until(|| backend.frames.lock().unwrap().len() >= 3));
        s.start().unwrap();
        assert_eq!(log.lock().unwrap().opens, 2);
        assert_eq!(log.lock().unwrap().closes, 1);
        s.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let (mut s, _backend, _log) = session(ScriptedSource::new());
        s.stop();
        s.start().unwrap();
        s.stop();
        s.stop();
        assert_eq!(s.status(), SessionStatus::Stopped);
    }
}
