//! Navigation strategies driven by the wand.

use glam::{Quat, Vec3};
use holo_cave::context::CaveContext;
use holo_cave::control::{ControlInput, ControlMode};
use holo_cave::layout::TABLE_HEIGHT;
use std::f32::consts::{PI, TAU};

const FLY_ACCEL: f32 = 2.0;
const FLY_DECEL: f32 = 4.0;
const FLY_MAX_SPEED: f32 = 25.0;

const ORBIT_GAIN: f32 = 2.0;

const SCALE_BAND_MIN_DEG: f32 = 25.0;
const SCALE_BAND_MAX_DEG: f32 = 40.0;
const SCALE_RATE: f32 = 4.0;
const SCALE_BASE: f32 = 5.0;

fn ray_plane_hit(origin: Vec3, dir: Vec3, plane_y: f32) -> Option<Vec3> {
    if dir.y.abs() < 1e-5 {
        return None;
    }
    let t = (plane_y - origin.y) / dir.y;
    (t > 0.0).then(|| origin + dir * t)
}

fn wrap_angle(a: f32) -> f32 {
    (a + PI).rem_euclid(TAU) - PI
}

fn rotate_about(ctx: &mut CaveContext, pivot: Vec3, yaw: f32) {
    let rot = Quat::from_rotation_y(yaw);
    ctx.set_rotation(rot * ctx.rotation());
    ctx.set_position(pivot + rot * (ctx.position() - pivot));
}

/// Flies along the wand ray while the action button is held; the world
/// glides to a stop once it is released.
#[derive(Default)]
pub struct WandFly {
    velocity: f32,
}

impl ControlMode for WandFly {
    fn apply(&mut self, ctx: &mut CaveContext, input: &ControlInput) -> bool {
        if input.action.down {
            self.velocity =
                (self.velocity + FLY_ACCEL * input.speed * input.dt).min(FLY_MAX_SPEED);
        } else {
            self.velocity = (self.velocity - FLY_DECEL * input.dt).max(0.0);
        }
        if self.velocity <= 0.0 {
            return false;
        }
        // Moving the viewpoint forward means the world slides backward.
        ctx.translate(input.wand.forward() * -(self.velocity * input.dt));
        true
    }
}

struct OrbitGrab {
    pivot: Vec3,
    azimuth: f32,
}

/// Yaws the world about the vertical axis through the point where the wand
/// ray met the table plane at press time.
#[derive(Default)]
pub struct Orbit {
    grab: Option<OrbitGrab>,
}

fn wand_azimuth(forward: Vec3) -> f32 {
    forward.x.atan2(forward.z)
}

impl ControlMode for Orbit {
    fn apply(&mut self, ctx: &mut CaveContext, input: &ControlInput) -> bool {
        if input.action.pressed {
            self.grab = ray_plane_hit(input.wand.position, input.wand.forward(), TABLE_HEIGHT)
                .map(|pivot| OrbitGrab {
                    pivot,
                    azimuth: wand_azimuth(input.wand.forward()),
                });
        }
        if !input.action.down {
            self.grab = None;
            return false;
        }
        let Some(grab) = &mut self.grab else {
            return false;
        };
        let azimuth = wand_azimuth(input.wand.forward());
        let yaw = wrap_angle(azimuth - grab.azimuth) * input.speed * ORBIT_GAIN;
        grab.azimuth = azimuth;
        if yaw != 0.0 {
            rotate_about(ctx, grab.pivot, yaw);
        }
        true
    }
}

struct DragGrab {
    hit: Vec3,
    forward: Vec3,
    distance: f32,
}

/// Drags the world along the table plane. Tilting the wand past the scale
/// band rescales about the grab instead of panning.
#[derive(Default)]
pub struct TableDrag {
    drag: Option<DragGrab>,
}

impl ControlMode for TableDrag {
    fn apply(&mut self, ctx: &mut CaveContext, input: &ControlInput) -> bool {
        let forward = input.wand.forward();
        if input.action.pressed {
            self.drag =
                ray_plane_hit(input.wand.position, forward, TABLE_HEIGHT).map(|hit| DragGrab {
                    hit,
                    forward,
                    distance: (hit - input.wand.position).length(),
                });
        }
        if !input.action.down {
            self.drag = None;
            return false;
        }
        let Some(drag) = &mut self.drag else {
            return false;
        };

        let hit = ray_plane_hit(input.wand.position, forward, TABLE_HEIGHT);
        let tilt_deg = drag.forward.angle_between(forward).to_degrees();
        if tilt_deg >= SCALE_BAND_MIN_DEG {
            let ratio =
                ((tilt_deg - SCALE_BAND_MIN_DEG) / (SCALE_BAND_MAX_DEG - SCALE_BAND_MIN_DEG))
                    .clamp(0.0, 1.0);
            let direction = if forward.y > drag.forward.y { 1.0 } else { -1.0 };
            let exponent = direction * ratio * drag.distance * SCALE_RATE * input.speed * input.dt;
            ctx.set_scale(ctx.scale() * SCALE_BASE.powf(exponent));
        } else if let Some(hit) = hit {
            ctx.translate(hit - drag.hit);
        }
        // The grabbed point rides with the ray either way.
        if let Some(hit) = hit {
            drag.hit = hit;
        }
        true
    }
}
