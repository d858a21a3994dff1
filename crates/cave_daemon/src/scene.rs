//! Software scene backend: a wireframe reference model drawn on the CPU.

use glam::{Mat4, Vec3};
use holo_cave::compositor::ExternalCamera;
use holo_cave::layout::{TABLE_DEPTH, TABLE_HEIGHT, TABLE_WIDTH};
use holo_cave::{RenderView, SceneRenderer, SurfaceImage};

const SKY_TOP: [u8; 4] = [18, 24, 38, 255];
const SKY_BOTTOM: [u8; 4] = [6, 8, 14, 255];
const GRID: [u8; 4] = [70, 90, 110, 255];
const OUTLINE: [u8; 4] = [120, 150, 180, 255];
const CUBE: [u8; 4] = [235, 185, 80, 255];
const AXIS_X: [u8; 4] = [200, 60, 60, 255];
const AXIS_Y: [u8; 4] = [60, 200, 60, 255];
const AXIS_Z: [u8; 4] = [60, 60, 200, 255];

const CUBE_HALF: f32 = 0.15;
const AXIS_LENGTH: f32 = 0.25;
// Lines reaching this far outside the frustum are dropped whole.
const NDC_LIMIT: f32 = 8.0;

const OVERVIEW_EYE: Vec3 = Vec3::new(1.7, 1.9, 1.7);
const OVERVIEW_FOV_Y: f32 = 0.9;
const OVERVIEW_WIDTH: u32 = 1920;
const OVERVIEW_HEIGHT: u32 = 1080;

/// Reference scene for bring-up and headless runs: a grid on the table
/// plane, a cube floating above it and a gnomon at the origin.
#[derive(Default)]
pub struct SoftwareScene;

impl SoftwareScene {
    pub fn new() -> Self {
        Self
    }

    fn clear(&self, img: &mut SurfaceImage) {
        let width = img.width() as usize;
        let height = img.height();
        for (y, row) in img.pixels_mut().chunks_exact_mut(width * 4).enumerate() {
            let t = if height > 1 {
                y as f32 / (height - 1) as f32
            } else {
                0.0
            };
            let color = lerp_rgba(SKY_TOP, SKY_BOTTOM, t);
            for px in row.chunks_exact_mut(4) {
                px.copy_from_slice(&color);
            }
        }
    }
}

fn lerp_rgba(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t) as u8;
    }
    out
}

/// Clip-space projection onto the pixel grid. Points on or behind the eye
/// plane, or far outside the frustum, yield no pixel.
fn project(vp: &Mat4, p: Vec3, width: u32, height: u32) -> Option<(i64, i64)> {
    let clip = *vp * p.extend(1.0);
    if clip.w <= 1e-4 {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if ndc.x.abs() > NDC_LIMIT || ndc.y.abs() > NDC_LIMIT {
        return None;
    }
    let x = ((ndc.x + 1.0) * 0.5 * (width.saturating_sub(1)) as f32).round() as i64;
    let y = ((1.0 - ndc.y) * 0.5 * (height.saturating_sub(1)) as f32).round() as i64;
    Some((x, y))
}

fn draw_line(img: &mut SurfaceImage, a: (i64, i64), b: (i64, i64), rgba: [u8; 4]) {
    let (mut x, mut y) = a;
    let dx = (b.0 - a.0).abs();
    let dy = -(b.1 - a.1).abs();
    let sx = if a.0 < b.0 { 1 } else { -1 };
    let sy = if a.1 < b.1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x >= 0 && y >= 0 {
            img.put_pixel(x as u32, y as u32, rgba);
        }
        if x == b.0 && y == b.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_edge(img: &mut SurfaceImage, vp: &Mat4, a: Vec3, b: Vec3, rgba: [u8; 4]) {
    let (Some(pa), Some(pb)) = (
        project(vp, a, img.width(), img.height()),
        project(vp, b, img.width(), img.height()),
    ) else {
        return;
    };
    draw_line(img, pa, pb, rgba);
}

fn cube_edges(center: Vec3, half: f32) -> [(Vec3, Vec3); 12] {
    let c = |sx: f32, sy: f32, sz: f32| center + Vec3::new(sx, sy, sz) * half;
    [
        (c(-1.0, -1.0, -1.0), c(1.0, -1.0, -1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, -1.0, 1.0)),
        (c(1.0, -1.0, 1.0), c(-1.0, -1.0, 1.0)),
        (c(-1.0, -1.0, 1.0), c(-1.0, -1.0, -1.0)),
        (c(-1.0, 1.0, -1.0), c(1.0, 1.0, -1.0)),
        (c(1.0, 1.0, -1.0), c(1.0, 1.0, 1.0)),
        (c(1.0, 1.0, 1.0), c(-1.0, 1.0, 1.0)),
        (c(-1.0, 1.0, 1.0), c(-1.0, 1.0, -1.0)),
        (c(-1.0, -1.0, -1.0), c(-1.0, 1.0, -1.0)),
        (c(1.0, -1.0, -1.0), c(1.0, 1.0, -1.0)),
        (c(1.0, -1.0, 1.0), c(1.0, 1.0, 1.0)),
        (c(-1.0, -1.0, 1.0), c(-1.0, 1.0, 1.0)),
    ]
}

impl SceneRenderer for SoftwareScene {
    fn render(&mut self, view: &RenderView, target: &mut SurfaceImage) {
        self.clear(target);
        let vp = view.view_projection();

        let half_w = TABLE_WIDTH * 0.5;
        let half_d = TABLE_DEPTH * 0.5;
        let at = |x: f32, z: f32| Vec3::new(x, TABLE_HEIGHT, z);

        // Grid lines on the table plane.
        let mut x = -half_w + 0.3;
        while x < half_w - 0.01 {
            draw_edge(target, &vp, at(x, -half_d), at(x, half_d), GRID);
            x += 0.3;
        }
        let mut z = -half_d + 0.4;
        while z < half_d - 0.01 {
            draw_edge(target, &vp, at(-half_w, z), at(half_w, z), GRID);
            z += 0.4;
        }

        // Table outline.
        draw_edge(target, &vp, at(-half_w, -half_d), at(half_w, -half_d), OUTLINE);
        draw_edge(target, &vp, at(half_w, -half_d), at(half_w, half_d), OUTLINE);
        draw_edge(target, &vp, at(half_w, half_d), at(-half_w, half_d), OUTLINE);
        draw_edge(target, &vp, at(-half_w, half_d), at(-half_w, -half_d), OUTLINE);

        let center = Vec3::new(0.0, TABLE_HEIGHT + 2.0 * CUBE_HALF, 0.0);
        for (a, b) in cube_edges(center, CUBE_HALF) {
            draw_edge(target, &vp, a, b, CUBE);
        }

        let origin = at(0.0, 0.0);
        draw_edge(target, &vp, origin, origin + Vec3::X * AXIS_LENGTH, AXIS_X);
        draw_edge(target, &vp, origin, origin + Vec3::Y * AXIS_LENGTH, AXIS_Y);
        draw_edge(target, &vp, origin, origin + Vec3::Z * AXIS_LENGTH, AXIS_Z);
    }
}

/// Camera for the device's companion monitor: a fixed vantage above the
/// table corner. The world transform keeps the view in step with whatever
/// the users fly or drag the scene to.
pub fn overview_camera(world: Mat4) -> ExternalCamera {
    let target = Vec3::new(0.0, TABLE_HEIGHT, 0.0);
    let aspect = OVERVIEW_WIDTH as f32 / OVERVIEW_HEIGHT as f32;
    ExternalCamera {
        view: Mat4::look_at_rh(OVERVIEW_EYE, target, Vec3::Y) * world,
        projection: Mat4::perspective_rh_gl(OVERVIEW_FOV_Y, aspect, 0.1, 100.0),
        max_width: OVERVIEW_WIDTH,
        max_height: OVERVIEW_HEIGHT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holo_cave::render::Eye;

    #[test]
    fn projects_world_points_to_pixels() {
        let vp = Mat4::perspective_rh_gl(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        assert_eq!(project(&vp, Vec3::new(0.0, 0.0, -1.0), 64, 64), Some((32, 32)));
        assert_eq!(project(&vp, Vec3::new(0.0, 0.0, 1.0), 64, 64), None);
    }

    #[test]
    fn lines_land_in_the_target() {
        let mut img = SurfaceImage::new(32, 32);
        draw_line(&mut img, (2, 2), (29, 2), CUBE);
        assert_eq!(img.pixel(2, 2), CUBE);
        assert_eq!(img.pixel(15, 2), CUBE);
        assert_eq!(img.pixel(29, 2), CUBE);
        assert_eq!(img.pixel(15, 3), [0, 0, 0, 0]);
    }

    #[test]
    fn wireframe_lands_in_a_head_on_view() {
        let mut scene = SoftwareScene::new();
        let mut target = SurfaceImage::new(64, 64);
        let view = RenderView {
            eye: Eye::Left,
            view: Mat4::look_at_rh(
                Vec3::new(0.0, 1.8, 1.2),
                Vec3::new(0.0, TABLE_HEIGHT, 0.0),
                Vec3::Y,
            ),
            projection: Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0),
        };
        scene.render(&view, &mut target);

        let mut cube_px = 0;
        let mut grid_px = 0;
        for y in 0..64 {
            for x in 0..64 {
                let px = target.pixel(x, y);
                if px == CUBE {
                    cube_px += 1;
                }
                if px == GRID || px == OUTLINE {
                    grid_px += 1;
                }
            }
        }
        assert!(cube_px > 8, "cube wireframe missing, {cube_px} px");
        assert!(grid_px > 8, "table grid missing, {grid_px} px");
    }

    #[test]
    fn overview_camera_centers_the_table() {
        let cam = overview_camera(Mat4::IDENTITY);
        let vp = cam.projection * cam.view;
        let table = Vec3::new(0.0, TABLE_HEIGHT, 0.0);
        let (x, y) = project(&vp, table, cam.max_width, cam.max_height).unwrap();
        assert!((x - 960).abs() <= 1, "table centre at x={x}");
        assert!((y - 540).abs() <= 1, "table centre at y={y}");

        // Dragging the world sideways moves the table off centre.
        let moved = overview_camera(Mat4::from_translation(Vec3::new(0.5, 0.0, 0.0)));
        let vp = moved.projection * moved.view;
        let (mx, _) = project(&vp, table, moved.max_width, moved.max_height).unwrap();
        assert_ne!(mx, x);
    }
}
