//! Engine drive loop: poll devices, run navigation, compose the frame.

use crate::callbacks::{CallbackHandle, StageCallback};
use crate::compositor::{CompositionReport, ExternalCamera, FrameCompositor, RenderSession};
use crate::config::CaveConfig;
use crate::context::CaveContext;
use crate::control::{ControlDispatch, ControlInput, ControlMode, ControlModeKind};
use crate::layout::{DeviceKind, DeviceRegistry};
use crate::render::SceneRenderer;
use crate::tracking::{CaveEvent, TrackingSource};
use crate::viewer::Viewer;
use anyhow::Result;
use holoview_link::stream::Compression;
use std::time::Instant;

pub struct CaveEngine {
    config: CaveConfig,
    context: CaveContext,
    registry: DeviceRegistry,
    compositor: FrameCompositor,
    control: ControlDispatch,
    source: Box<dyn TrackingSource>,
    renderer: Box<dyn SceneRenderer>,
    viewer: Box<dyn Viewer>,
    epoch: Instant,
    last_tick: Option<Instant>,
    last_now_ms: i64,
    frames_rendered: u64,
    frames_throttled: u64,
}

impl CaveEngine {
    pub fn new(
        config: CaveConfig,
        source: Box<dyn TrackingSource>,
        renderer: Box<dyn SceneRenderer>,
        mut viewer: Box<dyn Viewer>,
    ) -> Result<Self> {
        config.validate()?;
        viewer.set_compression(config.compression, config.compression_quality);
        let registry = DeviceRegistry::new(&config);
        let compositor = FrameCompositor::new(RenderSession::from_config(&config));
        let mut control = ControlDispatch::new();
        control.select(config.control_mode);
        tracing::info!(
            kind = %config.device_kind,
            users = registry.user_count(),
            "Cave engine ready"
        );
        Ok(Self {
            config,
            context: CaveContext::new(),
            registry,
            compositor,
            control,
            source,
            renderer,
            viewer,
            epoch: Instant::now(),
            last_tick: None,
            last_now_ms: 0,
            frames_rendered: 0,
            frames_throttled: 0,
        })
    }

    /// One frame on the wall clock.
    pub fn tick(&mut self) -> CompositionReport {
        let now = Instant::now();
        let frame_seconds = self.last_tick.map(|t| (now - t).as_secs_f32());
        self.last_tick = Some(now);
        let now_ms = (now - self.epoch).as_millis() as i64;
        self.tick_at(now_ms, frame_seconds)
    }

    /// One frame on an explicit clock.
    pub fn tick_at(&mut self, now_ms: i64, frame_seconds: Option<f32>) -> CompositionReport {
        self.last_now_ms = now_ms;
        self.viewer.poll();
        self.registry.poll(self.source.as_mut(), now_ms);
        self.registry.refresh_gates(&self.config, now_ms);
        self.run_control(frame_seconds.unwrap_or(0.0));

        if !self.config.render {
            return CompositionReport::default();
        }
        let report = self.compositor.compose(
            self.registry.users_mut(),
            &self.context,
            self.viewer.as_mut(),
            self.renderer.as_mut(),
            frame_seconds,
        );
        if report.rendered {
            self.frames_rendered += 1;
        } else {
            self.frames_throttled += 1;
        }
        report
    }

    fn run_control(&mut self, dt: f32) {
        if self.control.selected() == ControlModeKind::None {
            return;
        }
        for index in 0..self.registry.user_count() {
            let Some(user) = self.registry.user(index) else {
                continue;
            };
            let input = ControlInput {
                glasses: user.glasses.pose(),
                wand: user.wand.pose(),
                action: user.wand.button_state(self.config.control_button),
                speed: self.config.control_speed,
                dt,
            };
            self.control.apply(index, &mut self.context, &input);
        }
    }

    pub fn config(&self) -> &CaveConfig {
        &self.config
    }

    pub fn context(&self) -> &CaveContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut CaveContext {
        &mut self.context
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut DeviceRegistry {
        &mut self.registry
    }

    pub fn compositor(&self) -> &FrameCompositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut FrameCompositor {
        &mut self.compositor
    }

    pub fn viewer(&self) -> &dyn Viewer {
        self.viewer.as_ref()
    }

    pub fn viewer_mut(&mut self) -> &mut dyn Viewer {
        self.viewer.as_mut()
    }

    pub fn set_device_kind(&mut self, kind: DeviceKind) {
        self.config.device_kind = kind;
        self.registry.set_kind(kind, &self.config);
    }

    pub fn register_control_mode(&mut self, kind: ControlModeKind, mode: Box<dyn ControlMode>) {
        self.control.register(kind, mode);
    }

    pub fn set_control_mode(&mut self, kind: ControlModeKind) {
        self.config.control_mode = kind;
        self.control.select(kind);
    }

    pub fn register_callback(&mut self, callback: &StageCallback) -> CallbackHandle {
        self.compositor.register_callback(callback)
    }

    pub fn remove_callback(&mut self, handle: CallbackHandle) {
        self.compositor.remove_callback(handle)
    }

    pub fn register_external_camera(&mut self, camera: ExternalCamera) {
        self.compositor.register_external_camera(camera)
    }

    pub fn unregister_external_camera(&mut self) {
        self.compositor.unregister_external_camera()
    }

    /// Consumes a latched installation event.
    pub fn take_event(&mut self, event: CaveEvent) -> bool {
        self.registry.events_mut().take(event)
    }

    /// Head tracking validity of a user as of the last tick.
    pub fn tracking_valid(&self, user: usize) -> bool {
        self.registry
            .user(user)
            .is_some_and(|u| u.glasses.position_valid(self.last_now_ms))
    }

    pub fn set_compression(&mut self, mode: Compression, quality: u8) {
        self.config.compression = mode;
        self.config.compression_quality = quality;
        self.viewer.set_compression(mode, quality);
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_throttled(&self) -> u64 {
        self.frames_throttled
    }
}
