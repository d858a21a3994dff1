//! Installation topologies and the per-user device registry.

use crate::config::CaveConfig;
use crate::surface::{DisplaySurface, SurfaceCorners};
use crate::tracking::{EventTracker, TrackedDevice, TrackerAddress, TrackingSource};
use glam::Vec3;
use std::fmt;
use std::str::FromStr;

// Built-in surface geometry, meters. Public so hosts can place scene
// geometry against the physical installation.
pub const TABLE_WIDTH: f32 = 1.2;
pub const TABLE_DEPTH: f32 = 0.8;
pub const TABLE_HEIGHT: f32 = 0.615;
pub const WALL_WIDTH: f32 = 3.0;
pub const WALL_HEIGHT: f32 = 2.0;
pub const WALL_DISTANCE: f32 = 1.5;
pub const ROOM_WIDTH: f32 = 3.0;
pub const ROOM_HEIGHT: f32 = 2.4;
pub const ROOM_DEPTH: f32 = 3.0;

/// Supported installation topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Horizontal table with a seat on each long side.
    DualTable,
    /// Single vertical screen.
    Wall,
    /// Walk-in cell: front, left and right walls plus the floor.
    Room,
    /// Horizontal table with a single seat.
    SingleTable,
}

impl DeviceKind {
    pub fn supported_users(self) -> usize {
        match self {
            DeviceKind::DualTable => 2,
            DeviceKind::Wall | DeviceKind::Room | DeviceKind::SingleTable => 1,
        }
    }

    /// Surface quads for one user of this topology, in presentation order.
    pub fn surfaces_for_user(self, user: usize) -> Vec<SurfaceCorners> {
        match self {
            DeviceKind::DualTable => {
                let table = table_quad();
                if user == 0 {
                    vec![table]
                } else {
                    vec![table.mirrored()]
                }
            }
            DeviceKind::SingleTable => vec![table_quad()],
            DeviceKind::Wall => vec![wall_quad()],
            DeviceKind::Room => room_quads(),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::DualTable => write!(f, "dual_table"),
            DeviceKind::Wall => write!(f, "wall"),
            DeviceKind::Room => write!(f, "room"),
            DeviceKind::SingleTable => write!(f, "single_table"),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dual_table" => Ok(DeviceKind::DualTable),
            "wall" => Ok(DeviceKind::Wall),
            "room" => Ok(DeviceKind::Room),
            "single_table" => Ok(DeviceKind::SingleTable),
            other => Err(format!("unknown device kind '{other}'")),
        }
    }
}

/// Table top for the seat at the negative z side, corners labeled from
/// that seat's point of view looking down.
fn table_quad() -> SurfaceCorners {
    let hw = TABLE_WIDTH * 0.5;
    let hd = TABLE_DEPTH * 0.5;
    SurfaceCorners::new(
        Vec3::new(hw, TABLE_HEIGHT, -hd),
        Vec3::new(-hw, TABLE_HEIGHT, -hd),
        Vec3::new(hw, TABLE_HEIGHT, hd),
        Vec3::new(-hw, TABLE_HEIGHT, hd),
    )
}

fn wall_quad() -> SurfaceCorners {
    let hw = WALL_WIDTH * 0.5;
    SurfaceCorners::new(
        Vec3::new(-hw, 0.0, -WALL_DISTANCE),
        Vec3::new(hw, 0.0, -WALL_DISTANCE),
        Vec3::new(-hw, WALL_HEIGHT, -WALL_DISTANCE),
        Vec3::new(hw, WALL_HEIGHT, -WALL_DISTANCE),
    )
}

fn room_quads() -> Vec<SurfaceCorners> {
    let hw = ROOM_WIDTH * 0.5;
    let hd = ROOM_DEPTH * 0.5;
    let h = ROOM_HEIGHT;
    let front = SurfaceCorners::new(
        Vec3::new(-hw, 0.0, -hd),
        Vec3::new(hw, 0.0, -hd),
        Vec3::new(-hw, h, -hd),
        Vec3::new(hw, h, -hd),
    );
    let left = SurfaceCorners::new(
        Vec3::new(-hw, 0.0, hd),
        Vec3::new(-hw, 0.0, -hd),
        Vec3::new(-hw, h, hd),
        Vec3::new(-hw, h, -hd),
    );
    let right = SurfaceCorners::new(
        Vec3::new(hw, 0.0, -hd),
        Vec3::new(hw, 0.0, hd),
        Vec3::new(hw, h, -hd),
        Vec3::new(hw, h, hd),
    );
    let floor = SurfaceCorners::new(
        Vec3::new(-hw, 0.0, hd),
        Vec3::new(hw, 0.0, hd),
        Vec3::new(-hw, 0.0, -hd),
        Vec3::new(hw, 0.0, -hd),
    );
    vec![front, left, right, floor]
}

/// Per-user render switch: either forced by policy or following head
/// tracking validity.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderGate {
    use_override: bool,
    override_state: bool,
    enabled: bool,
}

impl RenderGate {
    pub fn force(&mut self, state: bool) {
        self.use_override = true;
        self.override_state = state;
    }

    pub fn follow_tracking(&mut self) {
        self.use_override = false;
    }

    pub fn resolve(&mut self, tracking_valid: bool) {
        self.enabled = if self.use_override {
            self.override_state
        } else {
            tracking_valid
        };
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// One user's devices, surfaces and render gate.
pub struct UserCave {
    pub index: usize,
    pub glasses: TrackedDevice,
    pub wand: TrackedDevice,
    pub surfaces: Vec<DisplaySurface>,
    pub gate: RenderGate,
}

impl UserCave {
    fn new(index: usize, kind: DeviceKind, config: &CaveConfig) -> Self {
        let mut glasses = TrackedDevice::new(TrackerAddress::glasses(index));
        let mut wand = TrackedDevice::new(TrackerAddress::wand(index));
        for device in [&mut glasses, &mut wand] {
            device.set_enabled(config.tracking);
            device.set_smoothing(config.smoothing);
            device.set_active_threshold_ms(config.active_threshold_ms);
        }

        let (width, height) = config.scaled_resolution();
        let surfaces = kind
            .surfaces_for_user(index)
            .into_iter()
            .map(|corners| {
                let mut surface = DisplaySurface::new(corners);
                surface.set_resolution(width, height);
                surface
            })
            .collect();

        Self {
            index,
            glasses,
            wand,
            surfaces,
            gate: RenderGate::default(),
        }
    }

    pub fn render_enabled(&self) -> bool {
        self.gate.enabled()
    }
}

/// All devices of the active topology.
pub struct DeviceRegistry {
    kind: DeviceKind,
    users: Vec<UserCave>,
    events: EventTracker,
}

impl DeviceRegistry {
    pub fn new(config: &CaveConfig) -> Self {
        let mut registry = Self {
            kind: config.device_kind,
            users: Vec::new(),
            events: EventTracker::new(),
        };
        registry.events.set_enabled(config.tracking);
        registry.rebuild(config.device_kind, config);
        registry
    }

    /// Switches topology, rebuilding every user's surfaces and devices.
    pub fn set_kind(&mut self, kind: DeviceKind, config: &CaveConfig) {
        if kind != self.kind {
            tracing::info!(from = %self.kind, to = %kind, "Switching device kind");
            self.rebuild(kind, config);
        }
    }

    fn rebuild(&mut self, kind: DeviceKind, config: &CaveConfig) {
        self.kind = kind;
        let count = kind.supported_users().min(config.max_users);
        self.users = (0..count).map(|i| UserCave::new(i, kind, config)).collect();
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn users(&self) -> &[UserCave] {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut [UserCave] {
        &mut self.users
    }

    pub fn user(&self, index: usize) -> Option<&UserCave> {
        self.users.get(index)
    }

    pub fn user_mut(&mut self, index: usize) -> Option<&mut UserCave> {
        self.users.get_mut(index)
    }

    pub fn events_mut(&mut self) -> &mut EventTracker {
        &mut self.events
    }

    pub fn poll(&mut self, source: &mut dyn TrackingSource, now_ms: i64) {
        for user in &mut self.users {
            user.glasses.poll(source, now_ms);
            user.wand.poll(source, now_ms);
        }
        self.events.poll(source);
    }

    /// Re-derives every render gate from the configured policy and the
    /// current head tracking state.
    pub fn refresh_gates(&mut self, config: &CaveConfig, now_ms: i64) {
        for user in &mut self.users {
            if config.only_render_first_user {
                user.gate.force(user.index == 0);
            } else if config.always_render || !config.tracking {
                user.gate.force(true);
            } else {
                user.gate.follow_tracking();
            }
            let valid = user.glasses.position_valid(now_ms);
            user.gate.resolve(valid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::NullSource;

    fn config(kind: DeviceKind) -> CaveConfig {
        CaveConfig {
            device_kind: kind,
            ..CaveConfig::default()
        }
    }

    #[test]
    fn user_count_is_clamped_by_max_users() {
        let mut cfg = config(DeviceKind::DualTable);
        assert_eq!(DeviceRegistry::new(&cfg).user_count(), 2);
        cfg.max_users = 1;
        assert_eq!(DeviceRegistry::new(&cfg).user_count(), 1);
        cfg.max_users = 5;
        assert_eq!(DeviceRegistry::new(&cfg).user_count(), 2);
    }

    #[test]
    fn topologies_build_their_surface_sets() {
        let room = DeviceRegistry::new(&config(DeviceKind::Room));
        assert_eq!(room.user_count(), 1);
        assert_eq!(room.users()[0].surfaces.len(), 4);

        let wall = DeviceRegistry::new(&config(DeviceKind::Wall));
        assert_eq!(wall.users()[0].surfaces.len(), 1);

        let table = DeviceRegistry::new(&config(DeviceKind::SingleTable));
        assert_eq!(table.users()[0].surfaces.len(), 1);
    }

    #[test]
    fn dual_table_seats_face_each_other() {
        let registry = DeviceRegistry::new(&config(DeviceKind::DualTable));
        let first = registry.users()[0].surfaces[0].corners().bl;
        let second = registry.users()[1].surfaces[0].corners().bl;
        assert_eq!(second, Vec3::new(-first.x, first.y, -first.z));
    }

    #[test]
    fn gates_follow_tracking_by_default() {
        let cfg = config(DeviceKind::Wall);
        let mut registry = DeviceRegistry::new(&cfg);
        let mut source = NullSource;
        registry.poll(&mut source, 0);
        registry.refresh_gates(&cfg, 0);
        // A null source never moves, so the glasses stay invalid.
        assert!(!registry.users()[0].render_enabled());
    }

    #[test]
    fn always_render_opens_gates_without_tracking() {
        let mut cfg = config(DeviceKind::DualTable);
        cfg.always_render = true;
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        assert!(registry.users()[0].render_enabled());
        assert!(registry.users()[1].render_enabled());
    }

    #[test]
    fn disabled_tracking_also_opens_gates() {
        let mut cfg = config(DeviceKind::Wall);
        cfg.tracking = false;
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        assert!(registry.users()[0].render_enabled());
    }

    #[test]
    fn only_render_first_user_wins_over_everything() {
        let mut cfg = config(DeviceKind::DualTable);
        cfg.always_render = true;
        cfg.only_render_first_user = true;
        let mut registry = DeviceRegistry::new(&cfg);
        registry.refresh_gates(&cfg, 0);
        assert!(registry.users()[0].render_enabled());
        assert!(!registry.users()[1].render_enabled());
    }

    #[test]
    fn kind_strings_round_trip() {
        for kind in [
            DeviceKind::DualTable,
            DeviceKind::Wall,
            DeviceKind::Room,
            DeviceKind::SingleTable,
        ] {
            assert_eq!(kind.to_string().parse::<DeviceKind>(), Ok(kind));
        }
        assert!("cube".parse::<DeviceKind>().is_err());
    }
}
