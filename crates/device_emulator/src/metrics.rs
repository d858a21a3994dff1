use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};

pub struct EmulatorMetrics {
    pub registry: Registry,
    pub tray_commands_total: IntCounterVec,
    pub sessions_total: IntCounter,
    pub frames_received_total: IntCounter,
    pub bytes_received_total: IntCounter,
    pub acks_sent_total: IntCounter,
}

impl EmulatorMetrics {
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("device_emulator".into()), None).unwrap();

        macro_rules! reg {
            ($m:expr) => {{
                registry.register(Box::new($m.clone())).unwrap();
                $m
            }};
        }

        Self {
            tray_commands_total: reg!(IntCounterVec::new(
                prometheus::Opts::new("tray_commands_total", "Tray commands handled"),
                &["command"]
            )
            .unwrap()),
            sessions_total: reg!(IntCounter::new(
                "sessions_total",
                "Viewer stream sessions opened"
            )
            .unwrap()),
            frames_received_total: reg!(IntCounter::new(
                "frames_received_total",
                "Surface and external frames received"
            )
            .unwrap()),
            bytes_received_total: reg!(IntCounter::new(
                "bytes_received_total",
                "Total frame payload bytes received"
            )
            .unwrap()),
            acks_sent_total: reg!(IntCounter::new(
                "acks_sent_total",
                "Frame acknowledgements sent back to the host"
            )
            .unwrap()),
            registry,
        }
    }

    pub fn router(&self) -> Router {
        let reg = self.registry.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let reg = reg.clone();
                async move {
                    let mf = reg.gather();
                    let mut buf = Vec::new();
                    TextEncoder::new().encode(&mf, &mut buf).unwrap();
                    String::from_utf8(buf).unwrap().into_response()
                }
            }),
        )
    }
}
