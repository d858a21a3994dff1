//! Core engine for multi-user holographic display caves.
//!
//! A cave is a set of physical display surfaces arranged around one or two
//! tracked users. Each frame the engine polls head and wand trackers, solves
//! an off-axis projection per surface and eye, asks the host scene renderer
//! to fill the render targets, and hands the results to a viewer, either an
//! in-process sink or the remote display device reached over the
//! `holoview_link` protocol.

pub mod callbacks;
pub mod compositor;
pub mod config;
pub mod context;
pub mod control;
pub mod engine;
pub mod layout;
pub mod projection;
pub mod render;
pub mod surface;
pub mod tracking;
pub mod viewer;

pub use config::CaveConfig;
pub use context::CaveContext;
pub use engine::CaveEngine;
pub use render::{Eye, RenderView, SceneRenderer, SurfaceImage};
pub use tracking::{Pose, TrackingSource};
pub use viewer::{LocalViewer, RemoteViewer, Viewer};
