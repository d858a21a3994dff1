//! Physical display surfaces and their render targets.

use crate::render::{Eye, SurfaceImage};
use glam::Vec3;

/// World-space quad described by its corners as seen by the viewer:
/// bottom-left, bottom-right, top-left, top-right.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceCorners {
    pub bl: Vec3,
    pub br: Vec3,
    pub tl: Vec3,
    pub tr: Vec3,
}

impl SurfaceCorners {
    pub fn new(bl: Vec3, br: Vec3, tl: Vec3, tr: Vec3) -> Self {
        Self { bl, br, tl, tr }
    }

    pub fn center(&self) -> Vec3 {
        (self.bl + self.br + self.tl + self.tr) * 0.25
    }

    /// Width along the bottom edge and height along the left edge, in
    /// world units.
    pub fn size(&self) -> (f32, f32) {
        ((self.br - self.bl).length(), (self.tl - self.bl).length())
    }

    /// The same quad viewed from the opposite side of the room, for the
    /// second seat at a table installation.
    pub fn mirrored(&self) -> Self {
        let flip = |v: Vec3| Vec3::new(-v.x, v.y, -v.z);
        Self {
            bl: flip(self.bl),
            br: flip(self.br),
            tl: flip(self.tl),
            tr: flip(self.tr),
        }
    }
}

/// One screen of the installation: a quad in the world plus a lazily
/// allocated pair of per-eye targets.
pub struct DisplaySurface {
    corners: SurfaceCorners,
    enabled: bool,
    inverted: bool,
    resolution: (u32, u32),
    targets: Option<[SurfaceImage; 2]>,
}

impl DisplaySurface {
    pub fn new(corners: SurfaceCorners) -> Self {
        Self {
            corners,
            enabled: true,
            inverted: false,
            resolution: (1, 1),
            targets: None,
        }
    }

    pub fn corners(&self) -> &SurfaceCorners {
        &self.corners
    }

    pub fn set_corners(&mut self, corners: SurfaceCorners) {
        self.corners = corners;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Surfaces mounted upside down swap which eye lands in which target.
    pub fn inverted(&self) -> bool {
        self.inverted
    }

    pub fn set_inverted(&mut self, inverted: bool) {
        self.inverted = inverted;
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    /// Records the wanted target size. Existing targets stay alive until
    /// the next render of this surface picks the new size up.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = (width.max(1), height.max(1));
    }

    /// Target for `eye`, allocated or reallocated at the current setpoint.
    pub fn target_mut(&mut self, eye: Eye) -> &mut SurfaceImage {
        let (width, height) = self.resolution;
        let stale = self
            .targets
            .as_ref()
            .is_some_and(|t| (t[0].width(), t[0].height()) != (width, height));
        if stale {
            self.targets = None;
        }
        let targets = self
            .targets
            .get_or_insert_with(|| [SurfaceImage::new(width, height), SurfaceImage::new(width, height)]);
        &mut targets[eye.index()]
    }

    /// Last rendered target for `eye`, if any.
    pub fn target(&self, eye: Eye) -> Option<&SurfaceImage> {
        self.targets.as_ref().map(|t| &t[eye.index()])
    }
}
