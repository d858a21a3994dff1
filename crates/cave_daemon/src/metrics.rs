use axum::{response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, Gauge, Histogram, IntCounter, IntGaugeVec, Registry, TextEncoder};

pub struct DaemonMetrics {
    pub registry: Registry,
    pub frames_rendered_total: IntCounter,
    pub frames_throttled_total: IntCounter,
    pub tick_seconds: Histogram,
    pub quality: Gauge,
    pub tracking_valid: IntGaugeVec,
}

impl DaemonMetrics {
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("cave_daemon".into()), None).unwrap();

        macro_rules! reg {
            ($m:expr) => {{
                registry.register(Box::new($m.clone())).unwrap();
                $m
            }};
        }

        Self {
            frames_rendered_total: reg!(IntCounter::new(
                "frames_rendered_total",
                "Total frames composed and presented to the viewer"
            )
            .unwrap()),
            frames_throttled_total: reg!(IntCounter::new(
                "frames_throttled_total",
                "Total frames skipped because the viewer reported back-pressure"
            )
            .unwrap()),
            tick_seconds: reg!(Histogram::with_opts(
                prometheus::HistogramOpts::new("tick_seconds", "Engine tick duration distribution")
                    .buckets(prometheus::exponential_buckets(0.0005, 2.0, 14).unwrap())
            )
            .unwrap()),
            quality: reg!(Gauge::new(
                "render_quality",
                "Current resolution quality factor"
            )
            .unwrap()),
            tracking_valid: reg!(IntGaugeVec::new(
                prometheus::Opts::new("tracking_valid", "Head tracking validity per user"),
                &["user"]
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
