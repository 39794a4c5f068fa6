use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::{Receiver, select};

use afterglow::audio::MicSource;
use afterglow::diagnostics::SessionStatus;
use afterglow::pipeline::Pipeline;
use afterglow::render::{self, FrameReceiver, OscBackend, RenderBackend};
use afterglow::session::Session;
use afterglow::settings::SettingsConfig;

const REPORT_INTERVAL: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // --list-devices: print capture devices and exit
    if std::env::args().any(|a| a == "--list-devices") {
        for name in MicSource::list_devices() {
            println!("{name}");
        }
        return Ok(());
    }

    let settings = SettingsConfig::load();

    let (channel_backend, frames) = render::frame_channel();
    let mut backends: Vec<Box<dyn RenderBackend>> = vec![Box::new(channel_backend)];
    if settings.osc.enabled {
        let osc = OscBackend::new(&settings.osc.host, settings.osc.port);
        if osc.is_active() {
            backends.push(Box::new(osc));
        } else {
            log::warn!("OSC output to {} unavailable, continuing without it", osc.target());
        }
    }

    let source = MicSource::new(settings.audio_device.clone(), settings.analyzer_config());
    let pipeline = Pipeline::new(settings.pipeline_config(), Box::new(source), backends);
    let mut session = Session::new(pipeline, settings.session_config());

    if let Err(e) = session.start_with_retry() {
        log::warn!("{e}. Type 'r' + Enter to retry, 'q' to quit.");
    }

    let commands = spawn_stdin_reader()?;
    run(&mut session, &frames, commands);

    session.stop();
    Ok(())
}

enum Event {
    /// A trimmed stdin line, or `None` once stdin is closed.
    Command(Option<String>),
    Report,
}

/// Main loop: user commands and periodic status reports until quit.
fn run(session: &mut Session, frames: &FrameReceiver, mut commands: Receiver<String>) {
    let report = crossbeam_channel::tick(REPORT_INTERVAL);
    let mut last_status = session.status();

    loop {
        let event = select! {
            recv(commands) -> cmd => Event::Command(cmd.ok()),
            recv(report) -> _ => Event::Report,
        };

        match event {
            Event::Command(Some(cmd)) => match cmd.as_str() {
                "r" => {
                    if let Err(e) = session.start() {
                        log::warn!("Retry failed: {e}");
                    }
                }
                "q" => break,
                "" => {}
                other => log::warn!("Unknown command '{other}' (r = retry, q = quit)"),
            },
            // stdin closed; keep running until the process is killed
            Event::Command(None) => commands = crossbeam_channel::never(),
            Event::Report => {
                if let Some(frame) = frames.latest() {
                    log::debug!(
                        "Renderer frame t={:.2}s pattern={} bpm={}",
                        frame.time,
                        frame.pattern_id,
                        frame.bpm
                    );
                }
                let diag = session.latest_diagnostics();
                if diag.status == SessionStatus::Running || diag.status != last_status {
                    log::info!("{diag}");
                }
                if diag.status == SessionStatus::DeviceLost
                    && last_status != SessionStatus::DeviceLost
                {
                    log::warn!("Input device lost. Type 'r' + Enter to restart.");
                }
                last_status = diag.status;
            }
        }
    }
}

fn spawn_stdin_reader() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("afterglow-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.send(line.trim().to_string()).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}
