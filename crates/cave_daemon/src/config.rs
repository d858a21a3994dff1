use anyhow::Error;
use clap::Parser;
use holo_cave::control::ControlModeKind;
use holo_cave::layout::DeviceKind;
use holo_cave::tracking::Button;
use holo_cave::CaveConfig;
use holoview_link::stream::Compression;

/// `cave_daemon` - Host process for a holographic display cave.
///
/// This process drives a multi-user autostereoscopic installation: it polls
/// the tracking system, solves one off-axis projection per (user, surface,
/// eye), renders the scene and hands the images to a local or remote viewer.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// The installation geometry: dual_table, wall, room or single_table.
    #[arg(long, env = "CAVE_DEVICE_KIND", default_value = "dual_table")]
    pub device_kind: String,

    /// Host name or IP of the cave device (tray service and viewer app).
    #[arg(long, env = "CAVE_DEVICE_HOST", default_value = "localhost")]
    pub device_host: String,

    /// TCP port the remote viewer app listens on for the frame stream.
    #[arg(long, env = "CAVE_STREAM_PORT", default_value_t = 32919)]
    pub stream_port: u16,

    /// TCP port of the tray service used to launch and kill the viewer app.
    #[arg(long, env = "CAVE_TRAY_PORT", default_value_t = 12058)]
    pub tray_port: u16,

    /// Disable head/wand tracking; every user renders from the resting pose.
    #[arg(long, env = "CAVE_NO_TRACKING")]
    pub no_tracking: bool,

    /// Separate tracking host. When unset, tracking follows the device host.
    #[arg(long, env = "CAVE_TRACKING_HOST")]
    pub tracking_host: Option<String>,

    /// Disable rendering entirely; devices are still polled.
    #[arg(long, env = "CAVE_NO_RENDER")]
    pub no_render: bool,

    /// Stream frames to the remote viewer app instead of the in-process sink.
    #[arg(long, env = "CAVE_REMOTE")]
    pub remote: bool,

    /// Disable the adaptive quality controller for remote sessions.
    #[arg(long, env = "CAVE_NO_AUTO_QUALITY")]
    pub no_auto_quality: bool,

    /// Render target width per surface at quality 1.0, in pixels.
    #[arg(long, env = "CAVE_WIDTH", default_value_t = 800)]
    pub width: u32,

    /// Render target height per surface at quality 1.0, in pixels.
    #[arg(long, env = "CAVE_HEIGHT", default_value_t = 800)]
    pub height: u32,

    /// Initial resolution quality factor.
    #[arg(long, env = "CAVE_QUALITY", default_value_t = 1.0)]
    pub quality: f32,

    /// Lower bound for the adaptive quality controller.
    #[arg(long, env = "CAVE_MIN_QUALITY", default_value_t = 0.25)]
    pub min_quality: f32,

    /// Upper bound for the adaptive quality controller.
    #[arg(long, env = "CAVE_MAX_QUALITY", default_value_t = 1.0)]
    pub max_quality: f32,

    /// Frame rate below which the quality controller steps down.
    #[arg(long, env = "CAVE_MIN_FPS", default_value_t = 15.0)]
    pub min_fps: f32,

    /// Frame rate above which the quality controller steps up.
    #[arg(long, env = "CAVE_MAX_FPS", default_value_t = 48.0)]
    pub max_fps: f32,

    /// Interocular distance in meters.
    #[arg(long, env = "CAVE_INTEROCULAR", default_value_t = 0.065)]
    pub interocular: f32,

    /// Swap the left and right eye on every surface.
    #[arg(long, env = "CAVE_INVERT")]
    pub invert: bool,

    /// Baseline eye swap for installations wired with crossed channels.
    #[arg(long, env = "CAVE_DEFAULT_INVERT")]
    pub default_invert: bool,

    /// Disable the weighted smoothing filter on tracked positions.
    #[arg(long, env = "CAVE_NO_SMOOTHING")]
    pub no_smoothing: bool,

    /// Render every user regardless of head tracking validity.
    #[arg(long, env = "CAVE_ALWAYS_RENDER")]
    pub always_render: bool,

    /// Render only user 0; other seats keep their surface slots but stay dark.
    #[arg(long, env = "CAVE_ONLY_FIRST_USER")]
    pub only_first_user: bool,

    /// Upper bound on concurrent users, clamped by the device kind.
    #[arg(long, env = "CAVE_MAX_USERS", default_value_t = 2)]
    pub max_users: usize,

    /// Stream connection attempts before giving up on the viewer app.
    #[arg(long, env = "CAVE_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: u32,

    /// Frame compression advertised to the remote viewer: raw, jpeg or png.
    #[arg(long, env = "CAVE_COMPRESSION", default_value = "jpeg")]
    pub compression: String,

    /// Compression quality from 0 to 100.
    #[arg(long, env = "CAVE_COMPRESSION_QUALITY", default_value_t = 50)]
    pub compression_quality: u8,

    /// Navigation mode: none, wand_fly, orbit or table_drag.
    #[arg(long, env = "CAVE_CONTROL_MODE", default_value = "none")]
    pub control_mode: String,

    /// Navigation speed multiplier.
    #[arg(long, env = "CAVE_CONTROL_SPEED", default_value_t = 1.0)]
    pub control_speed: f32,

    /// Wand button driving the navigation mode: primary, trigger or secondary.
    #[arg(long, env = "CAVE_CONTROL_BUTTON", default_value = "trigger")]
    pub control_button: String,

    /// Milliseconds without tracker motion before a device counts as stale.
    #[arg(long, env = "CAVE_ACTIVE_THRESHOLD_MS", default_value_t = 1000)]
    pub active_threshold_ms: i64,

    /// The listen address for the daemon's Prometheus metrics server.
    #[arg(long, env = "CAVE_METRICS_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub metrics_listen_addr: String,
}

impl Config {
    /// Resolves the command line into the engine configuration.
    pub fn to_cave_config(&self) -> anyhow::Result<CaveConfig> {
        Ok(CaveConfig {
            device_kind: self.device_kind.parse::<DeviceKind>().map_err(Error::msg)?,
            device_host: self.device_host.clone(),
            stream_port: self.stream_port,
            tray_port: self.tray_port,
            tracking: !self.no_tracking,
            tracking_follows_device: self.tracking_host.is_none(),
            tracking_host: self
                .tracking_host
                .clone()
                .unwrap_or_else(|| self.device_host.clone()),
            render: !self.no_render,
            remote_display: self.remote,
            auto_adjust_quality: !self.no_auto_quality,
            base_width: self.width,
            base_height: self.height,
            quality: self.quality,
            min_quality: self.min_quality,
            max_quality: self.max_quality,
            min_fps: self.min_fps,
            max_fps: self.max_fps,
            interocular: self.interocular,
            invert: self.invert,
            default_invert: self.default_invert,
            smoothing: !self.no_smoothing,
            always_render: self.always_render,
            only_render_first_user: self.only_first_user,
            max_users: self.max_users,
            connect_attempts: self.connect_attempts,
            compression: self.compression.parse::<Compression>().map_err(Error::msg)?,
            compression_quality: self.compression_quality,
            control_mode: self
                .control_mode
                .parse::<ControlModeKind>()
                .map_err(Error::msg)?,
            control_speed: self.control_speed,
            control_button: self.control_button.parse::<Button>().map_err(Error::msg)?,
            active_threshold_ms: self.active_threshold_ms,
            ..CaveConfig::default()
        })
    }
}
