//! World transform of the cave.
//!
//! Navigation does not move a camera, it moves the world under the
//! installation. The context holds that transform and is handed to
//! whoever needs it, the projection solve and the control modes in
//! particular.

use glam::{Mat4, Quat, Vec3};

/// World scale bounds enforced on every write.
pub const WORLD_SCALE_MIN: f32 = 0.01;
pub const WORLD_SCALE_MAX: f32 = 400_000.0;

#[derive(Debug, Clone, Copy)]
pub struct CaveContext {
    position: Vec3,
    rotation: Quat,
    scale: f32,
}

impl CaveContext {
    pub fn new() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: 1.0,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn translate(&mut self, delta: Vec3) {
        self.position += delta;
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.clamp(WORLD_SCALE_MIN, WORLD_SCALE_MAX);
    }

    /// World matrix applied to the scene before the per-eye solve.
    pub fn world_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }
}

impl Default for CaveContext {
    fn default() -> Self {
        Self::new()
    }
}
