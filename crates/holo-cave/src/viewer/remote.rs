//! Remote holographic device client.
//!
//! One background thread owns the whole link: it asks the tray service to
//! launch the viewer application, dials the stream port, then writes frame
//! messages and reads acks until cancelled. The engine thread never blocks
//! on the network; it observes atomics and feeds a bounded job queue that
//! drops the newest message when the link falls behind.

use super::{ExternalDisplayInfo, Viewer, ViewerState};
use crate::render::{Eye, SurfaceImage};
use bytes::{Bytes, BytesMut};
use holoview_link::stream::{self, Compression, DeviceMessage, StreamMessage};
use holoview_link::tray::TrayClient;
use holoview_link::VIEWER_APP;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

/// Frames the device may fall behind before rendering is throttled.
pub const BACKLOG_LIMIT: u64 = 25;

const JOB_QUEUE_DEPTH: usize = 32;
const RETRY_DELAY: Duration = Duration::from_millis(100);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// True while the device has consumed enough frames for another one.
pub fn backlog_clear(local_frame: u64, remote_frame: u64) -> bool {
    local_frame.saturating_sub(remote_frame) < BACKLOG_LIMIT
}

#[derive(Default)]
struct Shared {
    connected: AtomicBool,
    connect_done: AtomicBool,
    cancel: AtomicBool,
    exit: AtomicBool,
    remote_frame: AtomicU64,
    external: Mutex<Option<ExternalDisplayInfo>>,
}

struct Job {
    header: StreamMessage,
    payload: Bytes,
}

pub struct RemoteViewer {
    state: ViewerState,
    host: String,
    tray_port: u16,
    stream_port: u16,
    attempts: u32,
    compression: Compression,
    quality: u8,
    session_dirty: bool,
    external_open: bool,
    local_frame: u64,
    shared: Arc<Shared>,
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl RemoteViewer {
    pub fn new(host: impl Into<String>, tray_port: u16, stream_port: u16, attempts: u32) -> Self {
        Self {
            state: ViewerState::Uninitialized,
            host: host.into(),
            tray_port,
            stream_port,
            attempts,
            compression: Compression::default(),
            quality: 50,
            session_dirty: false,
            external_open: false,
            local_frame: 0,
            shared: Arc::new(Shared::default()),
            jobs: None,
            worker: None,
        }
    }

    pub fn state(&self) -> ViewerState {
        self.state
    }

    /// Frames handed off since connecting.
    pub fn frames_sent(&self) -> u64 {
        self.local_frame
    }

    /// Frames the device has acknowledged.
    pub fn frames_acked(&self) -> u64 {
        self.shared.remote_frame.load(Ordering::Relaxed)
    }

    /// Starts the background link. Progress is observed via [`Viewer::poll`].
    pub fn connect(&mut self) {
        if self.state != ViewerState::Uninitialized {
            tracing::warn!(state = %self.state, "Viewer connect ignored");
            return;
        }
        self.shared = Arc::new(Shared::default());
        let (tx, rx) = mpsc::channel(JOB_QUEUE_DEPTH);
        let shared = self.shared.clone();
        let host = self.host.clone();
        let (tray_port, stream_port, attempts) = (self.tray_port, self.stream_port, self.attempts);
        let spawned = thread::Builder::new()
            .name("viewer-link".into())
            .spawn(move || worker_main(shared, rx, host, tray_port, stream_port, attempts));
        match spawned {
            Ok(handle) => {
                tracing::info!(host = %self.host, port = self.stream_port, "Connecting viewer");
                self.jobs = Some(tx);
                self.worker = Some(handle);
                self.state = ViewerState::Connecting;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn viewer link thread");
            }
        }
    }

    /// Shuts the link down and joins the worker. Terminal.
    pub fn close(&mut self) {
        if self.state == ViewerState::Closed {
            return;
        }
        self.shared.cancel.store(true, Ordering::Release);
        if let Some(jobs) = self.jobs.take() {
            let _ = jobs.try_send(Job {
                header: StreamMessage::Close,
                payload: Bytes::new(),
            });
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Viewer link thread panicked");
            }
        }
        if self.state != ViewerState::Uninitialized {
            tracing::info!(host = %self.host, "Viewer closed");
        }
        self.state = ViewerState::Closed;
    }

    fn send_job(&self, header: StreamMessage, payload: Bytes) {
        let Some(jobs) = &self.jobs else { return };
        match jobs.try_send(Job { header, payload }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Dropped viewer message, stream thread is behind");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Viewer link is gone");
            }
        }
    }

    fn push_session(&mut self) {
        self.send_job(
            StreamMessage::Session {
                compression: self.compression,
                quality: self.quality,
                hdr: false,
            },
            Bytes::new(),
        );
        self.session_dirty = false;
    }
}

impl Viewer for RemoteViewer {
    fn poll(&mut self) {
        match self.state {
            ViewerState::Connecting => {
                if !self.shared.connect_done.load(Ordering::Acquire) {
                    return;
                }
                if self.shared.connected.load(Ordering::Acquire) {
                    tracing::info!(host = %self.host, "Viewer connected");
                    self.state = ViewerState::Active;
                    self.session_dirty = true;
                } else {
                    tracing::warn!(host = %self.host, "Viewer connection failed");
                    if let Some(worker) = self.worker.take() {
                        let _ = worker.join();
                    }
                    self.jobs = None;
                    // Back to square one so the host may retry.
                    self.state = ViewerState::Uninitialized;
                }
            }
            ViewerState::Active => {
                if self.shared.exit.load(Ordering::Acquire)
                    || self.worker.as_ref().is_some_and(|w| w.is_finished())
                {
                    self.close();
                    return;
                }
                if self.session_dirty {
                    self.push_session();
                }
            }
            ViewerState::Uninitialized | ViewerState::Closed => {}
        }
    }

    fn is_active(&self) -> bool {
        self.state == ViewerState::Active
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn should_render(&self) -> bool {
        match self.state {
            ViewerState::Active => backlog_clear(self.local_frame, self.frames_acked()),
            _ => true,
        }
    }

    fn present(&mut self, surface: usize, eye: Eye, image: &SurfaceImage) {
        if self.state != ViewerState::Active {
            return;
        }
        self.send_job(
            StreamMessage::SurfaceFrame {
                surface: surface as u32,
                eye: eye.index() as u8,
                width: image.width(),
                height: image.height(),
            },
            Bytes::copy_from_slice(image.pixels()),
        );
    }

    fn swap(&mut self) {
        if self.state != ViewerState::Active {
            return;
        }
        self.local_frame += 1;
        self.send_job(StreamMessage::Swap { frame: self.local_frame }, Bytes::new());
    }

    fn external_display(&self) -> Option<ExternalDisplayInfo> {
        if self.state != ViewerState::Active {
            return None;
        }
        *self.shared.external.lock()
    }

    fn set_external_display_image(&mut self, image: &SurfaceImage) {
        if self.state != ViewerState::Active {
            return;
        }
        let Some(info) = self.external_display() else {
            return;
        };
        if !self.external_open {
            self.send_job(
                StreamMessage::ExternalOpen {
                    x: info.x,
                    y: info.y,
                    width: info.width,
                    height: info.height,
                },
                Bytes::new(),
            );
            self.external_open = true;
        }
        self.send_job(
            StreamMessage::ExternalFrame {
                width: image.width(),
                height: image.height(),
            },
            Bytes::copy_from_slice(image.pixels()),
        );
    }

    fn close_external_display(&mut self) {
        if self.external_open {
            self.send_job(StreamMessage::ExternalClose, Bytes::new());
            self.external_open = false;
        }
    }

    fn set_compression(&mut self, mode: Compression, quality: u8) {
        if self.compression == mode && self.quality == quality {
            return;
        }
        self.compression = mode;
        self.quality = quality;
        if self.state == ViewerState::Active {
            self.session_dirty = true;
        }
    }
}

impl Drop for RemoteViewer {
    fn drop(&mut self) {
        self.close();
    }
}

fn worker_main(
    shared: Arc<Shared>,
    jobs: mpsc::Receiver<Job>,
    host: String,
    tray_port: u16,
    stream_port: u16,
    attempts: u32,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build viewer link runtime");
            shared.connect_done.store(true, Ordering::Release);
            return;
        }
    };
    runtime.block_on(link_session(shared, jobs, host, tray_port, stream_port, attempts));
}

async fn link_session(
    shared: Arc<Shared>,
    mut jobs: mpsc::Receiver<Job>,
    host: String,
    tray_port: u16,
    stream_port: u16,
    attempts: u32,
) {
    let tray = TrayClient::new(host.clone(), tray_port);
    let launch = tray.launch(VIEWER_APP, stream_port).await;
    if !launch.ok() {
        tracing::warn!(code = launch.code, message = %launch.message, "Viewer launch refused");
        shared.connect_done.store(true, Ordering::Release);
        return;
    }

    let Some(mut stream) = connect_stream(&shared, &host, stream_port, attempts).await else {
        let _ = tray.kill(VIEWER_APP).await;
        shared.connect_done.store(true, Ordering::Release);
        return;
    };

    let hello = StreamMessage::Hello {
        name: "holo-cave".into(),
        flags: 0,
    };
    if let Err(e) = stream::write_message(&mut stream, &hello, &[]).await {
        tracing::warn!(error = %e, "Viewer handshake failed");
        let _ = tray.kill(VIEWER_APP).await;
        shared.connect_done.store(true, Ordering::Release);
        return;
    }
    tracing::debug!(port = stream_port, "Viewer stream established");
    shared.connected.store(true, Ordering::Release);
    shared.connect_done.store(true, Ordering::Release);

    let (mut reader, mut writer) = stream.into_split();
    let mut inbox = BytesMut::new();
    loop {
        tokio::select! {
            job = jobs.recv() => {
                let Some(job) = job else { break };
                let closing = matches!(job.header, StreamMessage::Close);
                if let Err(e) = stream::write_message(&mut writer, &job.header, &job.payload).await {
                    tracing::debug!(error = %e, "Viewer stream write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            message = stream::read_message::<DeviceMessage, _>(&mut reader, &mut inbox) => {
                match message {
                    Ok((DeviceMessage::FrameAck { frame }, _)) => {
                        shared.remote_frame.store(frame, Ordering::Relaxed);
                    }
                    Ok((DeviceMessage::DisplayInfo { displays }, _)) => {
                        let external = displays
                            .iter()
                            .find(|d| !d.primary)
                            .map(|d| ExternalDisplayInfo {
                                x: d.x,
                                y: d.y,
                                width: d.width,
                                height: d.height,
                            });
                        tracing::info!(
                            displays = displays.len(),
                            external = external.is_some(),
                            "Viewer display inventory"
                        );
                        *shared.external.lock() = external;
                    }
                    Ok((DeviceMessage::Exit, _)) => {
                        tracing::info!("Viewer asked to end the session");
                        shared.exit.store(true, Ordering::Release);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Viewer stream read failed");
                        break;
                    }
                }
            }
        }
    }
    let _ = tray.kill(VIEWER_APP).await;
}

async fn connect_stream(
    shared: &Shared,
    host: &str,
    port: u16,
    attempts: u32,
) -> Option<TcpStream> {
    for attempt in 1..=attempts.max(1) {
        if shared.cancel.load(Ordering::Acquire) {
            return None;
        }
        tokio::time::sleep(RETRY_DELAY).await;
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => return Some(stream),
            Ok(Err(e)) => tracing::debug!(attempt, error = %e, "Viewer stream connect failed"),
            Err(_) => tracing::debug!(attempt, "Viewer stream connect timed out"),
        }
    }
    None
}
