//! Frame presentation seam.
//!
//! The compositor talks to a [`Viewer`]: either the in-process sink used
//! for tests and headless operation, or the remote holographic device
//! reached over the tray and stream channels.

pub mod local;
pub mod remote;

pub use local::LocalViewer;
pub use remote::RemoteViewer;

use crate::render::{Eye, SurfaceImage};
use holoview_link::stream::Compression;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerState {
    Uninitialized,
    Connecting,
    Active,
    Closed,
}

impl fmt::Display for ViewerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerState::Uninitialized => write!(f, "uninitialized"),
            ViewerState::Connecting => write!(f, "connecting"),
            ViewerState::Active => write!(f, "active"),
            ViewerState::Closed => write!(f, "closed"),
        }
    }
}

/// Placement of the device's secondary monitor, if one is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalDisplayInfo {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

pub trait Viewer: Send {
    /// Advances connection state; called once per engine tick.
    fn poll(&mut self) {}

    fn is_active(&self) -> bool;

    fn is_remote(&self) -> bool;

    /// False while the device is too far behind to accept another frame.
    fn should_render(&self) -> bool;

    /// Hands one rendered eye image to the given presentation slot.
    fn present(&mut self, surface: usize, eye: Eye, image: &SurfaceImage);

    /// Marks the end of the frame.
    fn swap(&mut self);

    fn external_display(&self) -> Option<ExternalDisplayInfo> {
        None
    }

    fn set_external_display_image(&mut self, _image: &SurfaceImage) {}

    fn close_external_display(&mut self) {}

    /// Session codec parameters, forwarded live when the viewer is remote.
    fn set_compression(&mut self, _mode: Compression, _quality: u8) {}
}
