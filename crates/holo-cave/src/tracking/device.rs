//! One tracked input device: glasses or wand.
//!
//! A device owns the smoothing filter, the liveness clock, the resting pose
//! it falls back to while tracking is stale, and per-channel button edge
//! state. `poll` runs once per frame with an unscaled millisecond clock.

use super::{filter::PositionFilter, Pose, TrackerAddress, TrackingSource};
use glam::{Quat, Vec3};
use std::fmt;
use std::str::FromStr;

/// Channel 0 is the tare pulse; logical buttons occupy 1..=3.
pub const BUTTON_CHANNELS: usize = 4;

const TARE_CHANNEL: usize = 0;

/// Default staleness threshold in milliseconds.
pub const DEFAULT_ACTIVE_THRESHOLD_MS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Trigger,
    Secondary,
}

impl Button {
    /// Raw tracker channel backing this button.
    pub fn channel(self) -> usize {
        match self {
            Button::Primary => 1,
            Button::Trigger => 2,
            Button::Secondary => 3,
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Button::Primary => write!(f, "primary"),
            Button::Trigger => write!(f, "trigger"),
            Button::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for Button {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Button::Primary),
            "trigger" => Ok(Button::Trigger),
            "secondary" => Ok(Button::Secondary),
            other => Err(format!("unknown button '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub down: bool,
    pub pressed: bool,
    pub released: bool,
}

pub struct TrackedDevice {
    address: TrackerAddress,
    enabled: bool,
    smoothing: bool,
    active_threshold_ms: i64,
    filter: PositionFilter,
    last_raw: Vec3,
    last_active_ms: i64,
    have_sample: bool,
    cycled: bool,
    local_position: Vec3,
    local_rotation: Quat,
    buttons: [ButtonState; BUTTON_CHANNELS],
    overrides: [Option<bool>; BUTTON_CHANNELS],
    tared: bool,
    battery: f64,
}

impl TrackedDevice {
    pub fn new(address: TrackerAddress) -> Self {
        Self {
            address,
            enabled: true,
            smoothing: true,
            active_threshold_ms: DEFAULT_ACTIVE_THRESHOLD_MS,
            filter: PositionFilter::new(),
            last_raw: Vec3::ZERO,
            // Definitely stale until the first motion is seen.
            last_active_ms: -2 * DEFAULT_ACTIVE_THRESHOLD_MS,
            have_sample: false,
            cycled: false,
            local_position: Vec3::ZERO,
            local_rotation: Quat::IDENTITY,
            buttons: [ButtonState::default(); BUTTON_CHANNELS],
            overrides: [None; BUTTON_CHANNELS],
            tared: false,
            battery: 1.0,
        }
    }

    pub fn address(&self) -> &TrackerAddress {
        &self.address
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_smoothing(&mut self, smoothing: bool) {
        self.smoothing = smoothing;
    }

    pub fn set_active_threshold_ms(&mut self, threshold_ms: i64) {
        self.active_threshold_ms = threshold_ms;
        if !self.have_sample {
            self.last_active_ms = -2 * threshold_ms;
        }
    }

    /// Samples the tracker and refreshes pose, buttons, tare and battery.
    pub fn poll(&mut self, source: &mut dyn TrackingSource, now_ms: i64) {
        self.tared = false;
        self.local_position = self.sample_position(source, now_ms);
        self.local_rotation = self.sample_rotation(source, now_ms);
        self.battery = if self.enabled {
            source.analog(&self.address, 0)
        } else {
            1.0
        };

        for channel in 0..BUTTON_CHANNELS {
            let mut down = self.enabled && source.button(&self.address, channel);
            if let Some(forced) = self.overrides[channel].take() {
                down = forced;
            }
            let state = &mut self.buttons[channel];
            state.pressed = !state.down && down;
            state.released = state.down && !down;
            state.down = down;
        }

        // The very first cycle establishes a baseline without firing a tare.
        if self.cycled {
            let tare = self.buttons[TARE_CHANNEL];
            self.tared = tare.pressed || tare.released;
        }
        self.cycled = true;
    }

    fn sample_position(&mut self, source: &mut dyn TrackingSource, now_ms: i64) -> Vec3 {
        if !self.enabled {
            return self.local_position;
        }
        let raw = source.position(&self.address);
        if !self.have_sample {
            self.have_sample = true;
            self.last_raw = raw;
            self.last_active_ms = -2 * self.active_threshold_ms;
        }
        if raw != self.last_raw {
            self.last_active_ms = now_ms;
            self.last_raw = raw;
        }
        let candidate = if self.smoothing {
            self.filter.push(raw)
        } else {
            raw
        };
        if self.position_valid(now_ms) {
            candidate
        } else {
            self.local_position
        }
    }

    fn sample_rotation(&mut self, source: &mut dyn TrackingSource, now_ms: i64) -> Quat {
        if self.enabled && self.position_valid(now_ms) {
            source.orientation(&self.address)
        } else {
            self.local_rotation
        }
    }

    /// True while the tracker has reported motion within the staleness
    /// threshold.
    pub fn position_valid(&self, now_ms: i64) -> bool {
        self.enabled && now_ms - self.last_active_ms < self.active_threshold_ms
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.local_position, self.local_rotation)
    }

    /// Places the device manually. Ignored while tracking is enabled.
    pub fn set_position(&mut self, position: Vec3) {
        if !self.enabled {
            self.local_position = position;
        }
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        if !self.enabled {
            self.local_rotation = rotation;
        }
    }

    pub fn button_state(&self, button: Button) -> ButtonState {
        self.buttons[button.channel()]
    }

    pub fn is_down(&self, button: Button) -> bool {
        self.buttons[button.channel()].down
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons[button.channel()].pressed
    }

    pub fn is_released(&self, button: Button) -> bool {
        self.buttons[button.channel()].released
    }

    /// Forces a button level for exactly one upcoming poll.
    pub fn override_button(&mut self, button: Button, down: bool) {
        self.overrides[button.channel()] = Some(down);
    }

    /// One-frame pulse raised by an edge on the tare channel.
    pub fn tared(&self) -> bool {
        self.tared
    }

    /// Battery charge in [0, 1]; full when the device is untracked.
    pub fn battery(&self) -> f64 {
        self.battery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Scriptable source: positions and button levels set per call site.
    #[derive(Default)]
    struct Script {
        position: Vec3,
        rotation: Quat,
        buttons: HashMap<usize, bool>,
    }

    impl crate::tracking::TrackingSource for Script {
        fn position(&mut self, _address: &TrackerAddress) -> Vec3 {
            self.position
        }

        fn orientation(&mut self, _address: &TrackerAddress) -> Quat {
            self.rotation
        }

        fn button(&mut self, _address: &TrackerAddress, channel: usize) -> bool {
            self.buttons.get(&channel).copied().unwrap_or(false)
        }

        fn analog(&mut self, _address: &TrackerAddress, _channel: usize) -> f64 {
            0.75
        }
    }

    fn device() -> TrackedDevice {
        let mut d = TrackedDevice::new(TrackerAddress::glasses(0));
        d.set_smoothing(false);
        d
    }

    #[test]
    fn stationary_device_is_never_valid() {
        let mut d = device();
        let mut s = Script::default();
        d.poll(&mut s, 0);
        assert!(!d.position_valid(0));
        d.poll(&mut s, 500);
        assert!(!d.position_valid(500));
    }

    #[test]
    fn motion_makes_the_device_valid_until_exactly_the_threshold() {
        let mut d = device();
        let mut s = Script::default();
        d.poll(&mut s, 0);
        s.position = Vec3::new(0.1, 0.0, 0.0);
        d.poll(&mut s, 10);
        assert!(d.position_valid(10));
        assert!(d.position_valid(1009));
        // now - last_active == threshold is already stale.
        assert!(!d.position_valid(1010));
    }

    #[test]
    fn stale_device_freezes_the_last_tracked_pose() {
        let mut d = device();
        let mut s = Script {
            rotation: Quat::from_rotation_y(0.5),
            ..Default::default()
        };
        d.poll(&mut s, 0);
        s.position = Vec3::new(1.0, 2.0, 3.0);
        d.poll(&mut s, 10);
        assert_eq!(d.pose().position, Vec3::new(1.0, 2.0, 3.0));

        // Tracker keeps reporting the same point; validity expires.
        d.poll(&mut s, 2000);
        assert!(!d.position_valid(2000));
        assert_eq!(d.pose().position, Vec3::new(1.0, 2.0, 3.0));
        // Rotation holds the last live value as well.
        assert!((d.pose().rotation - Quat::from_rotation_y(0.5)).length() < 1e-5);
    }

    #[test]
    fn disabled_device_keeps_its_resting_pose_and_accepts_placement() {
        let mut d = device();
        d.set_enabled(false);
        d.set_position(Vec3::new(0.0, 1.6, 0.5));
        let mut s = Script {
            position: Vec3::new(9.0, 9.0, 9.0),
            ..Default::default()
        };
        d.poll(&mut s, 0);
        assert_eq!(d.pose().position, Vec3::new(0.0, 1.6, 0.5));

        d.set_enabled(true);
        // Manual placement no longer applies.
        d.set_position(Vec3::ZERO);
        assert_eq!(d.pose().position, Vec3::new(0.0, 1.6, 0.5));
    }

    #[test]
    fn button_edges_fire_on_transitions_only() {
        let mut d = device();
        let mut s = Script::default();
        let mut seen = Vec::new();
        for level in [false, true, true, false] {
            s.buttons.insert(Button::Primary.channel(), level);
            d.poll(&mut s, 0);
            let st = d.button_state(Button::Primary);
            seen.push((st.down, st.pressed, st.released));
        }
        assert_eq!(
            seen,
            vec![
                (false, false, false),
                (true, true, false),
                (true, false, false),
                (false, false, true),
            ]
        );
    }

    #[test]
    fn override_replaces_the_sampled_level_once() {
        let mut d = device();
        let mut s = Script::default();
        d.poll(&mut s, 0);
        d.override_button(Button::Trigger, true);
        d.poll(&mut s, 0);
        assert!(d.is_pressed(Button::Trigger));
        // Next poll reads the real (false) level again.
        d.poll(&mut s, 0);
        assert!(d.is_released(Button::Trigger));
        assert!(!d.is_down(Button::Trigger));
    }

    #[test]
    fn tare_pulse_is_suppressed_on_the_first_cycle() {
        let mut d = device();
        let mut s = Script::default();
        s.buttons.insert(0, true);
        // First cycle reads a pressed tare channel but must stay silent.
        d.poll(&mut s, 0);
        assert!(!d.tared());
        s.buttons.insert(0, false);
        d.poll(&mut s, 0);
        assert!(d.tared());
        d.poll(&mut s, 0);
        assert!(!d.tared());
    }

    #[test]
    fn disabled_device_reads_full_battery_and_no_buttons() {
        let mut d = device();
        d.set_enabled(false);
        let mut s = Script::default();
        s.buttons.insert(Button::Primary.channel(), true);
        d.poll(&mut s, 0);
        assert!(!d.is_down(Button::Primary));
        assert_eq!(d.battery(), 1.0);
    }
}
