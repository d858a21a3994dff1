//! Per-frame walk over users, surfaces and eyes.
//!
//! The compositor owns the live render parameters, the stage callback
//! registry and the external display pass. It does not own the users or
//! the viewer; the engine lends them for the duration of one frame.

use crate::callbacks::{CallbackHandle, CallbackRegistry, RenderStage, StageCallback, StageEvent};
use crate::config::CaveConfig;
use crate::context::CaveContext;
use crate::layout::UserCave;
use crate::projection::solve_surface;
use crate::render::{Eye, RenderView, SceneRenderer, SurfaceImage};
use crate::viewer::Viewer;
use glam::Mat4;

pub const QUALITY_STEP: f32 = 0.1;

/// Live render parameters, adjusted while the session runs.
#[derive(Debug, Clone)]
pub struct RenderSession {
    pub base_width: u32,
    pub base_height: u32,
    pub quality: f32,
    pub min_quality: f32,
    pub max_quality: f32,
    pub auto_adjust: bool,
    pub min_fps: f32,
    pub max_fps: f32,
    pub interocular: f32,
    pub default_invert: bool,
    pub invert: bool,
    pub near: f32,
    pub far: f32,
}

impl RenderSession {
    pub fn from_config(config: &CaveConfig) -> Self {
        Self {
            base_width: config.base_width,
            base_height: config.base_height,
            quality: config.quality.clamp(config.min_quality, config.max_quality),
            min_quality: config.min_quality,
            max_quality: config.max_quality,
            auto_adjust: config.auto_adjust_quality,
            min_fps: config.min_fps,
            max_fps: config.max_fps,
            interocular: config.interocular,
            default_invert: config.default_invert,
            invert: config.invert,
            near: config.near_plane,
            far: config.far_plane,
        }
    }
}

/// Camera registered for the passthrough monitor on the device.
#[derive(Debug, Clone, Copy)]
pub struct ExternalCamera {
    pub view: Mat4,
    pub projection: Mat4,
    pub max_width: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompositionReport {
    /// False when back-pressure suppressed the frame.
    pub rendered: bool,
    /// Eye passes actually drawn.
    pub passes: u32,
}

pub struct FrameCompositor {
    callbacks: CallbackRegistry,
    session: RenderSession,
    external: Option<ExternalCamera>,
    external_target: Option<SurfaceImage>,
    external_claimed: bool,
}

impl FrameCompositor {
    pub fn new(session: RenderSession) -> Self {
        Self {
            callbacks: CallbackRegistry::new(),
            session,
            external: None,
            external_target: None,
            external_claimed: false,
        }
    }

    pub fn session(&self) -> &RenderSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut RenderSession {
        &mut self.session
    }

    pub fn quality(&self) -> f32 {
        self.session.quality
    }

    pub fn set_quality(&mut self, quality: f32) {
        self.session.quality = quality.clamp(self.session.min_quality, self.session.max_quality);
    }

    pub fn register_callback(&mut self, callback: &StageCallback) -> CallbackHandle {
        self.callbacks.register(callback)
    }

    pub fn remove_callback(&mut self, handle: CallbackHandle) {
        self.callbacks.remove(handle)
    }

    /// Claims the external display pass for `camera`. Claims reset every
    /// frame; a second claim within the same frame replaces the first.
    pub fn register_external_camera(&mut self, camera: ExternalCamera) {
        if self.external_claimed {
            tracing::warn!("Multiple external display cameras registered, keeping the newest");
        }
        self.external_claimed = true;
        self.external = Some(camera);
    }

    pub fn unregister_external_camera(&mut self) {
        self.external = None;
        self.external_target = None;
    }

    /// Runs one frame. `frame_seconds` is the measured duration of the
    /// previous frame and drives the quality controller.
    pub fn compose(
        &mut self,
        users: &mut [UserCave],
        context: &CaveContext,
        viewer: &mut dyn Viewer,
        renderer: &mut dyn SceneRenderer,
        frame_seconds: Option<f32>,
    ) -> CompositionReport {
        let mut report = CompositionReport::default();

        if viewer.should_render() {
            report.rendered = true;
            let scale = context.scale();
            let near = self.session.near * scale;
            let far = self.session.far * scale;
            let half_iod = self.session.interocular * 0.5 * scale;
            // Scene coordinates reach the eye through the cave transform.
            let world = context.world_matrix();
            let mut slot = 0;

            for user in users.iter_mut() {
                if !user.render_enabled() {
                    // Slots stay stable: a gated-off user still owns its
                    // surface indices.
                    slot += user.surfaces.len();
                    continue;
                }
                let head = user.glasses.pose();
                self.callbacks.dispatch(&StageEvent {
                    stage: RenderStage::PreUser,
                    user: user.index,
                    eye: None,
                    surface: None,
                });

                for surface in &mut user.surfaces {
                    let this_slot = slot;
                    slot += 1;
                    if !surface.enabled() {
                        continue;
                    }
                    let flip =
                        self.session.default_invert ^ self.session.invert ^ surface.inverted();
                    for slot_eye in [Eye::Left, Eye::Right] {
                        let eye = if flip { slot_eye.opposite() } else { slot_eye };
                        let eye_position =
                            head.position + head.right() * (half_iod * eye.offset_sign());
                        self.callbacks.dispatch(&StageEvent {
                            stage: RenderStage::PreEye,
                            user: user.index,
                            eye: Some(eye),
                            surface: Some(this_slot),
                        });
                        if let Some(solved) = solve_surface(eye_position, surface.corners(), near, far)
                        {
                            let view = RenderView {
                                eye,
                                view: solved.view * world,
                                projection: solved.projection,
                            };
                            let target = surface.target_mut(eye);
                            renderer.render(&view, target);
                            viewer.present(this_slot, slot_eye, target);
                            report.passes += 1;
                        }
                        self.callbacks.dispatch(&StageEvent {
                            stage: RenderStage::PostEye,
                            user: user.index,
                            eye: Some(eye),
                            surface: Some(this_slot),
                        });
                    }
                }

                self.callbacks.dispatch(&StageEvent {
                    stage: RenderStage::PostUser,
                    user: user.index,
                    eye: None,
                    surface: None,
                });
            }

            self.compose_external(viewer, renderer);
            viewer.swap();
        }

        if self.session.auto_adjust && viewer.is_remote() {
            if let Some(seconds) = frame_seconds {
                self.adapt_quality(seconds);
            }
        }
        self.propagate_resolution(users);
        self.external_claimed = false;
        report
    }

    fn compose_external(&mut self, viewer: &mut dyn Viewer, renderer: &mut dyn SceneRenderer) {
        match (self.external, viewer.external_display()) {
            (Some(camera), Some(info)) => {
                let width = ((info.width as f32 * self.session.quality) as u32)
                    .clamp(1, camera.max_width.max(1));
                let height = ((info.height as f32 * self.session.quality) as u32)
                    .clamp(1, camera.max_height.max(1));
                let stale = self
                    .external_target
                    .as_ref()
                    .is_some_and(|t| (t.width(), t.height()) != (width, height));
                if stale {
                    self.external_target = None;
                }
                let target = self
                    .external_target
                    .get_or_insert_with(|| SurfaceImage::new(width, height));
                let view = RenderView {
                    eye: Eye::Left,
                    view: camera.view,
                    projection: camera.projection,
                };
                renderer.render(&view, target);
                viewer.set_external_display_image(target);
            }
            (None, Some(_)) => viewer.close_external_display(),
            _ => {}
        }
    }

    fn adapt_quality(&mut self, frame_seconds: f32) {
        let session = &mut self.session;
        let before = session.quality;
        if frame_seconds > 1.0 / session.min_fps {
            session.quality -= QUALITY_STEP;
        } else if frame_seconds < 1.0 / session.max_fps {
            session.quality += QUALITY_STEP;
        }
        session.quality = session.quality.clamp(session.min_quality, session.max_quality);
        if (session.quality - before).abs() > f32::EPSILON {
            tracing::debug!(quality = session.quality, "Adjusted render quality");
        }
    }

    /// Pushes the current base resolution times quality to every surface.
    /// Targets pick the new size up on their next render.
    fn propagate_resolution(&mut self, users: &mut [UserCave]) {
        let width = ((self.session.base_width as f32 * self.session.quality) as u32).max(1);
        let height = ((self.session.base_height as f32 * self.session.quality) as u32).max(1);
        for user in users {
            for surface in &mut user.surfaces {
                surface.set_resolution(width, height);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{DeviceKind, DeviceRegistry};
    use crate::viewer::{ExternalDisplayInfo, LocalViewer};
    use glam::Vec3;
    use std::sync::{Arc, Mutex};

    fn config(kind: DeviceKind) -> CaveConfig {
        CaveConfig {
            device_kind: kind,
            // Untracked devices are placed by hand in these tests.
            tracking: false,
            base_width: 8,
            base_height: 8,
            ..CaveConfig::default()
        }
    }

    fn compositor(config: &CaveConfig) -> FrameCompositor {
        FrameCompositor::new(RenderSession::from_config(config))
    }

    /// Renderer that stamps the effective eye into the target.
    #[derive(Default)]
    struct MarkerRenderer {
        calls: Vec<(Eye, u32, u32)>,
    }

    impl SceneRenderer for MarkerRenderer {
        fn render(&mut self, view: &RenderView, target: &mut SurfaceImage) {
            self.calls.push((view.eye, target.width(), target.height()));
            let marker = match view.eye {
                Eye::Left => 1,
                Eye::Right => 2,
            };
            target.put_pixel(0, 0, [marker, 0, 0, 255]);
        }
    }

    /// Scriptable viewer for paths LocalViewer cannot exercise.
    struct TestViewer {
        remote: bool,
        render: bool,
        external: Option<ExternalDisplayInfo>,
        presents: Vec<(usize, Eye)>,
        swaps: u32,
        external_frames: Vec<(u32, u32)>,
        external_closes: u32,
    }

    impl TestViewer {
        fn new() -> Self {
            Self {
                remote: true,
                render: true,
                external: None,
                presents: Vec::new(),
                swaps: 0,
                external_frames: Vec::new(),
                external_closes: 0,
            }
        }
    }

    impl Viewer for TestViewer {
        fn is_active(&self) -> bool {
            true
        }

        fn is_remote(&self) -> bool {
            self.remote
        }

        fn should_render(&self) -> bool {
            self.render
        }

        fn present(&mut self, surface: usize, eye: Eye, _image: &SurfaceImage) {
            self.presents.push((surface, eye));
        }

        fn swap(&mut self) {
            self.swaps += 1;
        }

        fn external_display(&self) -> Option<ExternalDisplayInfo> {
            self.external
        }

        fn set_external_display_image(&mut self, image: &SurfaceImage) {
            self.external_frames.push((image.width(), image.height()));
        }

        fn close_external_display(&mut self) {
            self.external_closes += 1;
        }
    }

    fn place_heads(registry: &mut DeviceRegistry, positions: &[Vec3]) {
        for (user, position) in registry.users_mut().iter_mut().zip(positions) {
            user.glasses.set_position(*position);
        }
    }

    fn event(stage: RenderStage, user: usize, eye: Option<Eye>, surface: Option<usize>) -> StageEvent {
        StageEvent {
            stage,
            user,
            eye,
            surface,
        }
    }

    #[test]
    fn two_user_walk_is_ordered_and_slots_are_cumulative() {
        let cfg = config(DeviceKind::DualTable);
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        place_heads(
            &mut registry,
            &[Vec3::new(0.0, 1.4, -0.6), Vec3::new(0.0, 1.4, 0.6)],
        );

        let mut comp = compositor(&cfg);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StageCallback = Arc::new(move |e: &StageEvent| sink.lock().unwrap().push(*e));
        comp.register_callback(&callback);

        let mut viewer = LocalViewer::new();
        let mut renderer = MarkerRenderer::default();
        let report = comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );

        assert!(report.rendered);
        assert_eq!(report.passes, 4);
        assert_eq!(viewer.frames_presented(), 4);
        assert_eq!(viewer.frames_swapped(), 1);
        assert!(viewer.image(0, Eye::Left).is_some());
        assert!(viewer.image(1, Eye::Right).is_some());

        use RenderStage::*;
        let expected = vec![
            event(PreUser, 0, None, None),
            event(PreEye, 0, Some(Eye::Left), Some(0)),
            event(PostEye, 0, Some(Eye::Left), Some(0)),
            event(PreEye, 0, Some(Eye::Right), Some(0)),
            event(PostEye, 0, Some(Eye::Right), Some(0)),
            event(PostUser, 0, None, None),
            event(PreUser, 1, None, None),
            event(PreEye, 1, Some(Eye::Left), Some(1)),
            event(PostEye, 1, Some(Eye::Left), Some(1)),
            event(PreEye, 1, Some(Eye::Right), Some(1)),
            event(PostEye, 1, Some(Eye::Right), Some(1)),
            event(PostUser, 1, None, None),
        ];
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[test]
    fn gated_off_user_keeps_later_slots_stable() {
        let mut cfg = config(DeviceKind::DualTable);
        cfg.only_render_first_user = true;
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        place_heads(
            &mut registry,
            &[Vec3::new(0.0, 1.4, -0.6), Vec3::new(0.0, 1.4, 0.6)],
        );

        let mut comp = compositor(&cfg);
        let mut viewer = LocalViewer::new();
        let mut renderer = MarkerRenderer::default();
        let report = comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );
        assert_eq!(report.passes, 2);
        assert!(viewer.image(0, Eye::Left).is_some());
        assert!(viewer.image(1, Eye::Left).is_none());
    }

    #[test]
    fn throttled_frame_still_propagates_resolution() {
        let cfg = config(DeviceKind::SingleTable);
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);

        let mut comp = compositor(&cfg);
        comp.set_quality(0.5);
        let mut viewer = TestViewer::new();
        viewer.render = false;
        let mut renderer = MarkerRenderer::default();
        let report = comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );

        assert!(!report.rendered);
        assert_eq!(report.passes, 0);
        assert!(viewer.presents.is_empty());
        assert_eq!(viewer.swaps, 0);
        assert_eq!(registry.users()[0].surfaces[0].resolution(), (4, 4));
    }

    #[test]
    fn inversion_swaps_textures_but_not_slots() {
        let cfg = config(DeviceKind::Wall);
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        place_heads(&mut registry, &[Vec3::new(0.0, 1.2, 0.0)]);

        let mut comp = compositor(&cfg);
        comp.session_mut().invert = true;
        let mut viewer = LocalViewer::new();
        let mut renderer = MarkerRenderer::default();
        comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );

        // The left slot received the right eye's image and vice versa.
        let left_slot = viewer.image(0, Eye::Left).map(|i| i.pixel(0, 0)[0]);
        let right_slot = viewer.image(0, Eye::Right).map(|i| i.pixel(0, 0)[0]);
        assert_eq!(left_slot, Some(2));
        assert_eq!(right_slot, Some(1));
        // Render order follows the flipped eyes.
        let eyes: Vec<Eye> = renderer.calls.iter().map(|c| c.0).collect();
        assert_eq!(eyes, vec![Eye::Right, Eye::Left]);
    }

    #[test]
    fn eye_behind_the_surface_skips_the_pass() {
        let cfg = config(DeviceKind::Wall);
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        // Behind the wall plane at z = -1.5.
        place_heads(&mut registry, &[Vec3::new(0.0, 1.2, -2.0)]);

        let mut comp = compositor(&cfg);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StageCallback = Arc::new(move |e: &StageEvent| sink.lock().unwrap().push(*e));
        comp.register_callback(&callback);

        let mut viewer = LocalViewer::new();
        let mut renderer = MarkerRenderer::default();
        let report = comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );

        assert!(report.rendered);
        assert_eq!(report.passes, 0);
        assert_eq!(viewer.frames_presented(), 0);
        // The frame still ends and the eye stages still ran.
        assert_eq!(viewer.frames_swapped(), 1);
        assert_eq!(seen.lock().unwrap().len(), 6);
    }

    #[test]
    fn disabled_surface_is_skipped_with_stable_slots() {
        let cfg = config(DeviceKind::Room);
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        place_heads(&mut registry, &[Vec3::new(0.0, 1.2, 0.0)]);
        registry.users_mut()[0].surfaces[1].set_enabled(false);

        let mut comp = compositor(&cfg);
        let mut viewer = LocalViewer::new();
        let mut renderer = MarkerRenderer::default();
        let report = comp.compose(
            registry.users_mut(),
            &CaveContext::new(),
            &mut viewer,
            &mut renderer,
            None,
        );

        assert_eq!(report.passes, 6);
        assert!(viewer.image(0, Eye::Left).is_some());
        assert!(viewer.image(1, Eye::Left).is_none());
        assert!(viewer.image(2, Eye::Left).is_some());
        assert!(viewer.image(3, Eye::Left).is_some());
    }

    #[test]
    fn quality_adapts_only_for_remote_viewers() {
        let cfg = config(DeviceKind::Wall);
        let mut comp = compositor(&cfg);
        let mut renderer = MarkerRenderer::default();
        let ctx = CaveContext::new();

        // 0.1 s frames sit below 15 fps, so quality steps down.
        let mut remote = TestViewer::new();
        comp.compose(&mut [], &ctx, &mut remote, &mut renderer, Some(0.1));
        assert!((comp.quality() - 0.9).abs() < 1e-6);

        // Frames faster than 48 fps step back up, clamped at the maximum.
        comp.compose(&mut [], &ctx, &mut remote, &mut renderer, Some(0.01));
        comp.compose(&mut [], &ctx, &mut remote, &mut renderer, Some(0.01));
        assert!((comp.quality() - 1.0).abs() < 1e-6);

        // In-band frame times leave quality alone.
        comp.compose(&mut [], &ctx, &mut remote, &mut renderer, Some(0.03));
        assert!((comp.quality() - 1.0).abs() < 1e-6);

        // Slow frames clamp at the minimum.
        comp.set_quality(0.3);
        comp.compose(&mut [], &ctx, &mut remote, &mut renderer, Some(0.5));
        assert!((comp.quality() - 0.25).abs() < 1e-6);

        // A local viewer never adapts.
        comp.set_quality(1.0);
        let mut local = LocalViewer::new();
        comp.compose(&mut [], &ctx, &mut local, &mut renderer, Some(0.5));
        assert!((comp.quality() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn external_display_renders_capped_and_closes_without_a_camera() {
        let cfg = config(DeviceKind::Wall);
        let mut comp = compositor(&cfg);
        let mut renderer = MarkerRenderer::default();
        let ctx = CaveContext::new();

        let mut viewer = TestViewer::new();
        viewer.external = Some(ExternalDisplayInfo {
            x: 0,
            y: 0,
            width: 100,
            height: 50,
        });

        comp.register_external_camera(ExternalCamera {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            max_width: 64,
            max_height: 64,
        });
        comp.compose(&mut [], &ctx, &mut viewer, &mut renderer, None);
        assert_eq!(viewer.external_frames, vec![(64, 50)]);

        // Quality changes resize the passthrough target.
        comp.set_quality(0.5);
        comp.register_external_camera(ExternalCamera {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            max_width: 64,
            max_height: 64,
        });
        comp.compose(&mut [], &ctx, &mut viewer, &mut renderer, None);
        assert_eq!(viewer.external_frames.last(), Some(&(50, 25)));

        comp.unregister_external_camera();
        comp.compose(&mut [], &ctx, &mut viewer, &mut renderer, None);
        assert_eq!(viewer.external_closes, 1);
    }
}
