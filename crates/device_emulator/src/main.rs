mod metrics;

use crate::metrics::EmulatorMetrics;
use anyhow::Context;
use bytes::BytesMut;
use holoview_link::stream::{self, DeviceMessage, DisplayBounds, StreamMessage};
use holoview_link::tray::{self, TrayCommand, TrayResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Debug)]
struct Config {
    tray_listen: String,
    stream_listen: String,
    metrics_listen_addr: String,
    ack_delay_ms: u64,
    primary_width: u32,
    primary_height: u32,
    external_display: bool,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            tray_listen: std::env::var("EMULATOR_TRAY_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:12058".into()),
            stream_listen: std::env::var("EMULATOR_STREAM_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:32919".into()),
            metrics_listen_addr: std::env::var("EMULATOR_METRICS_LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9092".into()),
            ack_delay_ms: std::env::var("EMULATOR_ACK_DELAY_MS")
                .unwrap_or_else(|_| "0".into())
                .parse()
                .context("Failed to parse EMULATOR_ACK_DELAY_MS")?,
            primary_width: std::env::var("EMULATOR_PRIMARY_WIDTH")
                .unwrap_or_else(|_| "2560".into())
                .parse()
                .context("Failed to parse EMULATOR_PRIMARY_WIDTH")?,
            primary_height: std::env::var("EMULATOR_PRIMARY_HEIGHT")
                .unwrap_or_else(|_| "1600".into())
                .parse()
                .context("Failed to parse EMULATOR_PRIMARY_HEIGHT")?,
            external_display: std::env::var("EMULATOR_EXTERNAL_DISPLAY")
                .unwrap_or_else(|_| "true".into())
                .parse()
                .context("Failed to parse EMULATOR_EXTERNAL_DISPLAY")?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let cfg = Config::from_env()?;
    tracing::info!(config = ?cfg, "Starting device emulator");

    let metrics = Arc::new(EmulatorMetrics::new());

    // Start metrics server
    let router = metrics.router();
    let metrics_addr: std::net::SocketAddr = cfg.metrics_listen_addr.parse()?;
    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(metrics_addr).await.unwrap();
        tracing::info!(addr = %metrics_addr, "Metrics server started");
        axum::serve(listener, router.into_make_service())
            .await
            .unwrap();
    });

    let tray_listener = TcpListener::bind(&cfg.tray_listen).await?;
    tracing::info!(addr = cfg.tray_listen, "Tray service listening");
    let tray_metrics = metrics.clone();
    tokio::spawn(serve_tray(tray_listener, tray_metrics));

    let stream_listener = TcpListener::bind(&cfg.stream_listen).await?;
    tracing::info!(addr = cfg.stream_listen, "Stream service listening");

    loop {
        let (socket, peer) = stream_listener.accept().await?;
        let cfg = cfg.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            tracing::info!(client = %peer, "Stream client connected");
            if let Err(e) = handle_session(socket, cfg, metrics).await {
                tracing::warn!(error = %e, client = %peer, "Stream session ended");
            }
        });
    }
}

async fn serve_tray(listener: TcpListener, metrics: Arc<EmulatorMetrics>) {
    loop {
        match listener.accept().await {
            Ok((mut socket, peer)) => {
                let metrics = metrics.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_tray(&mut socket, metrics).await {
                        tracing::debug!(error = %e, client = %peer, "Tray connection ended");
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tray accept failed");
            }
        }
    }
}

/// One command per connection, mirroring how the host talks to the tray.
async fn handle_tray(socket: &mut TcpStream, metrics: Arc<EmulatorMetrics>) -> anyhow::Result<()> {
    let command: TrayCommand = tray::read_nul_json(socket).await?;
    let label = match &command {
        TrayCommand::Launch(args) => {
            tracing::info!(
                app = args.app,
                stream_port = args.cmdln.first().copied().unwrap_or(0),
                close_others = args.close_others,
                "Tray launch"
            );
            "launch"
        }
        TrayCommand::Kill(args) => {
            tracing::info!(app = args.app, force = args.force, "Tray kill");
            "kill"
        }
    };
    metrics.tray_commands_total.with_label_values(&[label]).inc();
    tray::write_nul_json(
        socket,
        &TrayResponse {
            code: 200,
            message: "ok".into(),
        },
    )
    .await?;
    Ok(())
}

async fn handle_session(
    mut socket: TcpStream,
    cfg: Config,
    metrics: Arc<EmulatorMetrics>,
) -> anyhow::Result<()> {
    let mut buf = BytesMut::with_capacity(64 * 1024);

    let (hello, _) = stream::read_message::<StreamMessage, _>(&mut socket, &mut buf).await?;
    let (name, flags) = match hello {
        StreamMessage::Hello { name, flags } => (name, flags),
        other => anyhow::bail!("expected hello, got {other:?}"),
    };
    tracing::info!(name, flags, "Viewer session opened");
    metrics.sessions_total.inc();

    let mut displays = vec![DisplayBounds {
        x: 0,
        y: 0,
        width: cfg.primary_width,
        height: cfg.primary_height,
        primary: true,
    }];
    if cfg.external_display {
        displays.push(DisplayBounds {
            x: cfg.primary_width as i32,
            y: 0,
            width: 1920,
            height: 1080,
            primary: false,
        });
    }
    stream::write_message(&mut socket, &DeviceMessage::DisplayInfo { displays }, &[]).await?;

    loop {
        let (message, payload) = stream::read_message::<StreamMessage, _>(&mut socket, &mut buf).await?;
        match message {
            StreamMessage::Session {
                compression,
                quality,
                hdr,
            } => {
                tracing::info!(compression = %compression, quality, hdr, "Session parameters updated");
            }
            StreamMessage::SurfaceFrame {
                surface,
                eye,
                width,
                height,
            } => {
                metrics.frames_received_total.inc();
                metrics.bytes_received_total.inc_by(payload.len() as u64);
                tracing::debug!(surface, eye, width, height, bytes = payload.len(), "Surface frame");
            }
            StreamMessage::ExternalFrame { width, height } => {
                metrics.frames_received_total.inc();
                metrics.bytes_received_total.inc_by(payload.len() as u64);
                tracing::debug!(width, height, "External frame");
            }
            StreamMessage::ExternalOpen {
                x,
                y,
                width,
                height,
            } => {
                tracing::info!(x, y, width, height, "External display opened");
            }
            StreamMessage::ExternalClose => {
                tracing::info!("External display closed");
            }
            StreamMessage::Swap { frame } => {
                if cfg.ack_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(cfg.ack_delay_ms)).await;
                }
                stream::write_message(&mut socket, &DeviceMessage::FrameAck { frame }, &[]).await?;
                metrics.acks_sent_total.inc();
            }
            StreamMessage::Close => {
                tracing::info!("Viewer session closed by host");
                break;
            }
            StreamMessage::Hello { .. } => {
                anyhow::bail!("unexpected second hello");
            }
        }
    }
    Ok(())
}
