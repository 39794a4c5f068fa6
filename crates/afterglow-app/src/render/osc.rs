use std::net::UdpSocket;

use rosc::{OscMessage, OscPacket, OscType};

use super::{RenderBackend, RenderFrame};

const PREFIX: &str = "/afterglow";

/// Fire-and-forget OSC sender over UDP for an external renderer.
pub struct OscBackend {
    socket: Option<UdpSocket>,
    target: String,
    last_time: f64,
}

impl OscBackend {
    /// Target host:port. Binds an ephemeral local port; a bind failure leaves
    /// the backend inert rather than failing the session.
    pub fn new(host: &str, port: u16) -> Self {
        let target = format!("{host}:{port}");
        let socket = match UdpSocket::bind("0.0.0.0:0") {
            Ok(sock) => {
                let _ = sock.set_nonblocking(true);
                log::info!("OSC output configured: target {target}");
                Some(sock)
            }
            Err(e) => {
                log::error!("Failed to bind OSC output socket: {e}");
                None
            }
        };
        Self {
            socket,
            target,
            last_time: 0.0,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_active(&self) -> bool {
        self.socket.is_some()
    }

    fn send_float(&self, path: &str, value: f32) {
        self.send_packet(path, vec![OscType::Float(value)]);
    }

    fn send_int(&self, path: &str, value: i32) {
        self.send_packet(path, vec![OscType::Int(value)]);
    }

    fn send_string(&self, path: &str, value: &str) {
        self.send_packet(path, vec![OscType::String(value.to_string())]);
    }

    fn send_blob(&self, path: &str, bytes: Vec<u8>) {
        self.send_packet(path, vec![OscType::Blob(bytes)]);
    }

    fn send_packet(&self, path: &str, args: Vec<OscType>) {
        let Some(ref socket) = self.socket else {
            return;
        };
        let packet = OscPacket::Message(OscMessage {
            addr: format!("{PREFIX}/{path}"),
            args,
        });
        match rosc::encoder::encode(&packet) {
            Ok(bytes) => {
                let _ = socket.send_to(&bytes, &self.target);
            }
            Err(e) => {
                log::debug!("OSC encode error: {e}");
            }
        }
    }
}

impl RenderBackend for OscBackend {
    fn publish(&mut self, frame: &RenderFrame) {
        self.last_time = frame.time;
        let f = &frame.features;
        self.send_float("time", frame.time as f32);
        self.send_float("audio/volume", f.volume);
        self.send_float("audio/bass", f.bass);
        self.send_float("audio/mid", f.mid);
        self.send_float("audio/high", f.high);
        self.send_int("audio/signal", i32::from(f.signal_present));
        self.send_int("bpm", i32::try_from(frame.bpm).unwrap_or(i32::MAX));
        self.send_int(
            "pattern/index",
            i32::try_from(frame.pattern_index).unwrap_or(i32::MAX),
        );
        self.send_string("pattern/id", &frame.pattern_id);
        self.send_blob("uniforms", frame.uniforms().as_bytes().to_vec());
        self.send_blob("waveform", f32_blob(&frame.waveform));
        self.send_blob("spectrum", f32_blob(&frame.spectrum));
    }

    fn current_frame_time(&self) -> f64 {
        self.last_time
    }
}

/// Little-endian f32 payload.
fn f32_blob(samples: &[f32]) -> Vec<u8> {
    if cfg!(target_endian = "little") {
        bytemuck::cast_slice(samples).to_vec()
    } else {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}
