//! In-process viewer used for headless runs and tests.

use super::Viewer;
use crate::render::{Eye, SurfaceImage};
use std::collections::HashMap;

/// Always-active sink that keeps the last image presented to every
/// (surface, eye) slot.
#[derive(Default)]
pub struct LocalViewer {
    slots: HashMap<(usize, Eye), SurfaceImage>,
    presented: u64,
    swapped: u64,
}

impl LocalViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last image presented to the slot, if any.
    pub fn image(&self, surface: usize, eye: Eye) -> Option<&SurfaceImage> {
        self.slots.get(&(surface, eye))
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn frames_swapped(&self) -> u64 {
        self.swapped
    }
}

impl Viewer for LocalViewer {
    fn is_active(&self) -> bool {
        true
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn should_render(&self) -> bool {
        true
    }

    fn present(&mut self, surface: usize, eye: Eye, image: &SurfaceImage) {
        self.slots
            .entry((surface, eye))
            .or_insert_with(|| SurfaceImage::new(image.width(), image.height()))
            .copy_from(image);
        self.presented += 1;
    }

    fn swap(&mut self) {
        self.swapped += 1;
    }
}
