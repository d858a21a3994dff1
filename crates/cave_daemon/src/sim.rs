//! Canned tracking motion for runs without a physical tracker.

use glam::{Quat, Vec3};
use holo_cave::layout::TABLE_HEIGHT;
use holo_cave::tracking::{Button, TrackerAddress, TrackerRole, TrackingSource};
use std::time::Instant;

const TRIGGER_PERIOD_S: f32 = 6.0;
const TRIGGER_HOLD_S: f32 = 0.4;

/// Drives every tracked device from smooth closed curves: heads sway above
/// their seats, wands sweep over the table and the trigger pulses briefly
/// every few seconds to exercise the navigation modes.
pub struct SimulatedSource {
    epoch: Instant,
}

impl SimulatedSource {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    fn seconds(&self) -> f32 {
        self.epoch.elapsed().as_secs_f32()
    }
}

fn seat_sign(index: usize) -> f32 {
    if index == 0 {
        -1.0
    } else {
        1.0
    }
}

fn head_at(t: f32, index: usize) -> Vec3 {
    let phase = index as f32 * 1.7;
    Vec3::new(
        (t * 0.37 + phase).sin() * 0.14,
        1.45 + (t * 0.23 + phase).sin() * 0.05,
        seat_sign(index) * (0.55 + (t * 0.19 + phase).cos() * 0.08),
    )
}

fn wand_at(t: f32, index: usize) -> Vec3 {
    let phase = index as f32 * 2.3;
    Vec3::new(
        (t * 0.9 + phase).sin() * 0.3,
        0.95 + (t * 1.3 + phase).sin() * 0.08,
        seat_sign(index) * (0.3 + (t * 0.7 + phase).cos() * 0.12),
    )
}

/// Orients a device so its forward axis points at `target`.
fn aim(from: Vec3, target: Vec3) -> Quat {
    let dir = (target - from).normalize_or_zero();
    if dir == Vec3::ZERO {
        Quat::IDENTITY
    } else {
        Quat::from_rotation_arc(Vec3::NEG_Z, dir)
    }
}

fn trigger_at(t: f32) -> bool {
    t.rem_euclid(TRIGGER_PERIOD_S) < TRIGGER_HOLD_S
}

impl TrackingSource for SimulatedSource {
    fn position(&mut self, address: &TrackerAddress) -> Vec3 {
        let t = self.seconds();
        match address.role {
            TrackerRole::Glasses => head_at(t, address.index),
            TrackerRole::Wand => wand_at(t, address.index),
            TrackerRole::Events => Vec3::ZERO,
        }
    }

    fn orientation(&mut self, address: &TrackerAddress) -> Quat {
        let t = self.seconds();
        let table_center = Vec3::new(0.0, TABLE_HEIGHT, 0.0);
        match address.role {
            TrackerRole::Glasses => aim(head_at(t, address.index), table_center),
            TrackerRole::Wand => {
                let swing = Vec3::new((t * 0.8).sin() * 0.25, 0.0, (t * 0.6).cos() * 0.2);
                aim(wand_at(t, address.index), table_center + swing)
            }
            TrackerRole::Events => Quat::IDENTITY,
        }
    }

    fn button(&mut self, address: &TrackerAddress, channel: usize) -> bool {
        address.role == TrackerRole::Wand
            && channel == Button::Trigger.channel()
            && trigger_at(self.seconds())
    }

    fn analog(&mut self, address: &TrackerAddress, channel: usize) -> f64 {
        if address.role == TrackerRole::Wand && channel == 0 {
            0.85
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heads_stay_above_their_own_seats() {
        for t in [0.0, 3.7, 12.1] {
            let first = head_at(t, 0);
            let second = head_at(t, 1);
            assert!(first.z < -0.3);
            assert!(second.z > 0.3);
            assert!(first.y > TABLE_HEIGHT);
            assert!(second.y > TABLE_HEIGHT);
        }
    }

    #[test]
    fn glasses_face_the_table() {
        let head = head_at(2.0, 0);
        let forward = aim(head, Vec3::new(0.0, TABLE_HEIGHT, 0.0)) * Vec3::NEG_Z;
        // Seat 0 sits at negative z and looks across and down.
        assert!(forward.z > 0.0);
        assert!(forward.y < 0.0);
    }

    #[test]
    fn trigger_pulses_are_short() {
        assert!(trigger_at(0.1));
        assert!(!trigger_at(1.0));
        assert!(trigger_at(TRIGGER_PERIOD_S + 0.2));
        assert!(!trigger_at(TRIGGER_PERIOD_S - 0.2));
    }
}
