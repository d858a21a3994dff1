//! Engine configuration.

use crate::control::ControlModeKind;
use crate::layout::DeviceKind;
use crate::tracking::device::DEFAULT_ACTIVE_THRESHOLD_MS;
use crate::tracking::Button;
use anyhow::{bail, Result};
use holoview_link::stream::Compression;
use holoview_link::{STREAM_PORT, TRAY_PORT};

/// Full option surface of the engine. Hosts usually build this from their
/// own flag and environment handling, then hand it to [`crate::CaveEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct CaveConfig {
    pub device_kind: DeviceKind,
    /// Host of the holographic device, tray and stream ports alike.
    pub device_host: String,
    pub stream_port: u16,
    pub tray_port: u16,
    pub tracking: bool,
    /// Reach the tracking server on the device host instead of its own.
    pub tracking_follows_device: bool,
    pub tracking_host: String,
    pub render: bool,
    /// Drive the remote device instead of presenting in-process.
    pub remote_display: bool,
    pub auto_adjust_quality: bool,
    pub base_width: u32,
    pub base_height: u32,
    pub quality: f32,
    pub min_quality: f32,
    pub max_quality: f32,
    pub min_fps: f32,
    pub max_fps: f32,
    /// Eye separation in meters.
    pub interocular: f32,
    pub default_invert: bool,
    pub invert: bool,
    pub smoothing: bool,
    pub always_render: bool,
    pub only_render_first_user: bool,
    pub max_users: usize,
    pub connect_attempts: u32,
    pub compression: Compression,
    pub compression_quality: u8,
    pub control_mode: ControlModeKind,
    pub control_speed: f32,
    pub control_button: Button,
    pub active_threshold_ms: i64,
    pub near_plane: f32,
    pub far_plane: f32,
}

impl Default for CaveConfig {
    fn default() -> Self {
        Self {
            device_kind: DeviceKind::DualTable,
            device_host: "localhost".into(),
            stream_port: STREAM_PORT,
            tray_port: TRAY_PORT,
            tracking: true,
            tracking_follows_device: true,
            tracking_host: "localhost".into(),
            render: true,
            remote_display: false,
            auto_adjust_quality: true,
            base_width: 800,
            base_height: 800,
            quality: 1.0,
            min_quality: 0.25,
            max_quality: 1.0,
            min_fps: 15.0,
            max_fps: 48.0,
            interocular: 0.065,
            default_invert: false,
            invert: false,
            smoothing: true,
            always_render: false,
            only_render_first_user: false,
            max_users: 2,
            connect_attempts: 5,
            compression: Compression::Jpeg,
            compression_quality: 50,
            control_mode: ControlModeKind::None,
            control_speed: 1.0,
            control_button: Button::Trigger,
            active_threshold_ms: DEFAULT_ACTIVE_THRESHOLD_MS,
            near_plane: 0.1,
            far_plane: 1000.0,
        }
    }
}

impl CaveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_quality <= 0.0 || self.min_quality > self.max_quality {
            bail!(
                "quality bounds {}..{} are not usable",
                self.min_quality,
                self.max_quality
            );
        }
        if self.quality < self.min_quality || self.quality > self.max_quality {
            bail!(
                "quality {} outside {}..{}",
                self.quality,
                self.min_quality,
                self.max_quality
            );
        }
        if self.min_fps <= 0.0 || self.min_fps >= self.max_fps {
            bail!("fps band {}..{} is not usable", self.min_fps, self.max_fps);
        }
        if self.max_users == 0 {
            bail!("at least one user is required");
        }
        if self.near_plane <= 0.0 || self.near_plane >= self.far_plane {
            bail!(
                "clip planes {}..{} are not usable",
                self.near_plane,
                self.far_plane
            );
        }
        Ok(())
    }

    /// Base resolution scaled by the configured quality.
    pub fn scaled_resolution(&self) -> (u32, u32) {
        let quality = self.quality.clamp(self.min_quality, self.max_quality);
        (
            ((self.base_width as f32 * quality) as u32).max(1),
            ((self.base_height as f32 * quality) as u32).max(1),
        )
    }

    /// Host the tracking server is reached on.
    pub fn tracking_endpoint(&self) -> &str {
        if self.tracking_follows_device {
            &self.device_host
        } else {
            &self.tracking_host
        }
    }
}
