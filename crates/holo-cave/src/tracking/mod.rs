//! Pose source: tracker sampling, smoothing, liveness and button edges.

pub mod device;
pub mod events;
pub mod filter;

pub use device::{Button, ButtonState, TrackedDevice};
pub use events::{CaveEvent, EventTracker};

use glam::{Quat, Vec3};
use std::fmt;

/// Position and orientation of a tracked object, in the device frame unless
/// stated otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerRole {
    Glasses,
    Wand,
    Events,
}

/// Identity of one sampled tracker on the tracking server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackerAddress {
    pub role: TrackerRole,
    pub index: usize,
}

impl TrackerAddress {
    pub fn glasses(index: usize) -> Self {
        Self {
            role: TrackerRole::Glasses,
            index,
        }
    }

    pub fn wand(index: usize) -> Self {
        Self {
            role: TrackerRole::Wand,
            index,
        }
    }

    pub fn events() -> Self {
        Self {
            role: TrackerRole::Events,
            index: 0,
        }
    }

    /// Full tracker path for a given server, e.g. `Wand1@localhost`.
    pub fn host_string(&self, server: &str) -> String {
        format!("{self}@{server}")
    }
}

impl fmt::Display for TrackerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            TrackerRole::Glasses => write!(f, "Glasses{}", self.index),
            TrackerRole::Wand => write!(f, "Wand{}", self.index),
            TrackerRole::Events => write!(f, "Events"),
        }
    }
}

/// Poll-only view of the tracking server. Implementations are expected to
/// answer every call; an unreachable server reports no motion rather than
/// an error.
pub trait TrackingSource: Send {
    fn position(&mut self, address: &TrackerAddress) -> Vec3;
    fn orientation(&mut self, address: &TrackerAddress) -> Quat;
    fn button(&mut self, address: &TrackerAddress, channel: usize) -> bool;
    fn analog(&mut self, address: &TrackerAddress, channel: usize) -> f64;
}

/// Source for rigs without tracking hardware.
pub struct NullSource;

impl TrackingSource for NullSource {
    fn position(&mut self, _address: &TrackerAddress) -> Vec3 {
        Vec3::ZERO
    }

    fn orientation(&mut self, _address: &TrackerAddress) -> Quat {
        Quat::IDENTITY
    }

    fn button(&mut self, _address: &TrackerAddress, _channel: usize) -> bool {
        false
    }

    fn analog(&mut self, _address: &TrackerAddress, _channel: usize) -> f64 {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_addresses_format_like_server_paths() {
        assert_eq!(TrackerAddress::glasses(0).to_string(), "Glasses0");
        assert_eq!(TrackerAddress::wand(1).to_string(), "Wand1");
        assert_eq!(
            TrackerAddress::events().host_string("localhost"),
            "Events@localhost"
        );
    }

    #[test]
    fn pose_axes_follow_rotation() {
        let pose = Pose::new(Vec3::ZERO, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        // Quarter turn about +Y carries -Z onto -X.
        assert!((pose.forward() - Vec3::NEG_X).length() < 1e-5);
        assert!((pose.right() - Vec3::NEG_Z).length() < 1e-5);
    }
}
