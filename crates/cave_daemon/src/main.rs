mod config;
mod metrics;
mod modes;
mod scene;
mod sim;

use crate::config::Config;
use crate::metrics::DaemonMetrics;
use crate::modes::{Orbit, TableDrag, WandFly};
use crate::scene::{overview_camera, SoftwareScene};
use crate::sim::SimulatedSource;
use clap::Parser;
use holo_cave::control::ControlModeKind;
use holo_cave::tracking::{NullSource, TrackingSource};
use holo_cave::viewer::{LocalViewer, RemoteViewer, Viewer};
use holo_cave::CaveEngine;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

const DAEMON_TICK_RATE_HZ: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Initialization ---
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();
    let config = Config::parse();
    tracing::info!(config = ?config, "Cave daemon starting with configuration");

    let cave = config.to_cave_config()?;
    let source: Box<dyn TrackingSource> = if cave.tracking {
        tracing::info!(
            endpoint = cave.tracking_endpoint(),
            "Simulated tracking source active"
        );
        Box::new(SimulatedSource::new())
    } else {
        Box::new(NullSource)
    };
    let viewer: Box<dyn Viewer> = if cave.remote_display {
        let mut remote = RemoteViewer::new(
            cave.device_host.clone(),
            cave.tray_port,
            cave.stream_port,
            cave.connect_attempts,
        );
        remote.connect();
        Box::new(remote)
    } else {
        Box::new(LocalViewer::new())
    };

    let overview_enabled = cave.render;
    let mut engine = CaveEngine::new(cave, source, Box::new(SoftwareScene::new()), viewer)?;
    engine.register_control_mode(ControlModeKind::WandFly, Box::new(WandFly::default()));
    engine.register_control_mode(ControlModeKind::Orbit, Box::new(Orbit::default()));
    engine.register_control_mode(ControlModeKind::TableDrag, Box::new(TableDrag::default()));

    let metrics = Arc::new(DaemonMetrics::new());

    // --- 2. Start Metrics Server ---
    let metrics_router = metrics.router();
    let metrics_addr: std::net::SocketAddr = config.metrics_listen_addr.parse()?;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(metrics_addr).await.unwrap();
        tracing::info!(addr = %metrics_addr, "Daemon metrics server started");
        axum::serve(listener, metrics_router.into_make_service())
            .await
            .unwrap();
    });

    // --- 3. Main Frame Loop ---
    let mut interval = tokio::time::interval(Duration::from_millis(1000 / DAEMON_TICK_RATE_HZ));
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tracing::info!(rate_hz = DAEMON_TICK_RATE_HZ, "Starting frame loop...");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received.");
                break;
            },
            _ = sigterm.recv() => {
                tracing::info!("SIGTERM received.");
                break;
            },
            _ = interval.tick() => {
                let started = Instant::now();
                if overview_enabled {
                    let overview = overview_camera(engine.context().world_matrix());
                    engine.register_external_camera(overview);
                }
                let report = engine.tick();
                metrics.tick_seconds.observe(started.elapsed().as_secs_f64());
                if report.rendered {
                    metrics.frames_rendered_total.inc();
                } else {
                    metrics.frames_throttled_total.inc();
                }
                metrics.quality.set(engine.compositor().quality() as f64);
                for user in 0..engine.registry().user_count() {
                    metrics
                        .tracking_valid
                        .with_label_values(&[&user.to_string()])
                        .set(engine.tracking_valid(user) as i64);
                }
            }
        }
    }

    tracing::info!(
        frames = engine.frames_rendered(),
        throttled = engine.frames_throttled(),
        "Cave daemon shutting down."
    );
    Ok(())
}
