//! Wire protocol shared between the cave host and the viewer device.
//!
//! Two channels ride on plain TCP:
//! - the tray control channel (`tray`): NUL-terminated JSON commands that
//!   launch and kill the viewer application on the device,
//! - the frame stream (`stream`): length-prefixed binary messages carrying
//!   session parameters, per-surface eye images and end-of-frame markers
//!   one way, and frame acks plus display info the other way.

pub mod stream;
pub mod tray;

use thiserror::Error;

/// Default port of the device tray service.
pub const TRAY_PORT: u16 = 12058;

/// Default port of the viewer frame stream.
pub const STREAM_PORT: u16 = 32919;

/// Application id the tray launches for us.
pub const VIEWER_APP: &str = "caveview";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed message: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("message of {0} bytes exceeds the frame limit")]
    Oversized(usize),
    #[error("connection closed by peer")]
    Closed,
}
