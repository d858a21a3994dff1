//! Off-axis projection through a fixed surface quad.
//!
//! The eye moves freely in front of a screen whose corners are known in
//! world space. Each pass builds the asymmetric frustum whose near plane
//! is parallel to that screen and whose image exactly covers it, so the
//! picture stays glued to the glass as the head moves.

use crate::surface::SurfaceCorners;
use glam::{Mat3, Mat4, Vec2, Vec3, Vec4};

/// Orthonormal frame of a surface: `right` along the bottom edge, `up`
/// along the left edge, `normal` toward the viewer.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceBasis {
    pub right: Vec3,
    pub up: Vec3,
    pub normal: Vec3,
}

impl SurfaceBasis {
    pub fn from_corners(corners: &SurfaceCorners) -> Self {
        let right = (corners.br - corners.bl).normalize();
        let top_mid = (corners.tl + corners.tr) * 0.5;
        let bottom_mid = (corners.bl + corners.br) * 0.5;
        let up = (top_mid - bottom_mid).normalize();
        let normal = right.cross(up);
        Self { right, up, normal }
    }
}

/// Physical-camera description of the same pass: sensor matching the
/// surface, lens shifted toward the eye's off-center position.
#[derive(Debug, Clone, Copy)]
pub struct PhysicalLens {
    /// Surface extent in world units, width then height.
    pub sensor_size: Vec2,
    /// Normalized shift of the lens from the sensor center.
    pub shift: Vec2,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

/// One solved eye pass.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceProjection {
    pub view: Mat4,
    pub projection: Mat4,
    pub lens: PhysicalLens,
    /// Perpendicular eye-to-plane distance, in world units.
    pub eye_distance: f32,
}

/// Solves the pass for one eye position. Returns `None` when the eye sits
/// on or behind the surface plane, in which case the pass must be skipped.
pub fn solve_surface(
    eye: Vec3,
    corners: &SurfaceCorners,
    near: f32,
    far: f32,
) -> Option<SurfaceProjection> {
    let basis = SurfaceBasis::from_corners(corners);
    let distance = (eye - corners.bl).dot(basis.normal);
    if distance <= 0.0 {
        return None;
    }

    let to_bl = corners.bl - eye;
    let to_br = corners.br - eye;
    let to_tl = corners.tl - eye;
    let left = basis.right.dot(to_bl);
    let right = basis.right.dot(to_br);
    let bottom = basis.up.dot(to_bl);
    let top = basis.up.dot(to_tl);

    let scale = near / distance;
    let projection = frustum(
        left * scale,
        right * scale,
        bottom * scale,
        top * scale,
        near,
        far,
    );

    let rotation = Mat3::from_cols(basis.right, basis.up, basis.normal).transpose();
    let view = Mat4::from_mat3(rotation) * Mat4::from_translation(-eye);

    let (sensor_x, sensor_y) = corners.size();
    let lens = PhysicalLens {
        sensor_size: Vec2::new(sensor_x, sensor_y),
        shift: Vec2::new(
            (left + right) / (2.0 * sensor_x),
            (bottom + top) / (2.0 * sensor_y),
        ),
        fov_y: 2.0 * (sensor_y / (2.0 * distance)).atan(),
    };

    Some(SurfaceProjection {
        view,
        projection,
        lens,
        eye_distance: distance,
    })
}

/// Standard GL asymmetric frustum.
fn frustum(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;
    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            (right + left) / width,
            (top + bottom) / height,
            -(far + near) / depth,
            -1.0,
        ),
        Vec4::new(0.0, 0.0, -2.0 * far * near / depth, 0.0),
    )
}
