//! Out-of-band cave events carried on a virtual tracker.
//!
//! The tracking server exposes an `Events` device whose button channels
//! toggle when something happens at the installation itself, like a badge
//! tap on the RFID reader. An edge on a channel latches the matching event
//! until somebody consumes it.

use super::{TrackerAddress, TrackingSource};

const EVENT_CHANNELS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaveEvent {
    /// Status line toggled by the installation hardware.
    Status,
    /// Badge tap on the RFID reader next to the display.
    RfidTap,
}

impl CaveEvent {
    fn channel(self) -> usize {
        match self {
            CaveEvent::Status => 0,
            CaveEvent::RfidTap => 1,
        }
    }
}

pub struct EventTracker {
    address: TrackerAddress,
    enabled: bool,
    levels: [bool; EVENT_CHANNELS],
    received: [bool; EVENT_CHANNELS],
    cycled: bool,
}

impl EventTracker {
    pub fn new() -> Self {
        Self {
            address: TrackerAddress::events(),
            enabled: true,
            levels: [false; EVENT_CHANNELS],
            received: [false; EVENT_CHANNELS],
            cycled: false,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Latches an event for every channel that changed level. The first
    /// poll only records the baseline.
    pub fn poll(&mut self, source: &mut dyn TrackingSource) {
        if !self.enabled {
            return;
        }
        for channel in 0..EVENT_CHANNELS {
            let level = source.button(&self.address, channel);
            if self.cycled && level != self.levels[channel] {
                self.received[channel] = true;
            }
            self.levels[channel] = level;
        }
        self.cycled = true;
    }

    /// Consumes the latch for `event`, reporting whether it had fired
    /// since the previous take.
    pub fn take(&mut self, event: CaveEvent) -> bool {
        std::mem::take(&mut self.received[event.channel()])
    }
}

impl Default for EventTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec3};

    struct Levels([bool; EVENT_CHANNELS]);

    impl TrackingSource for Levels {
        fn position(&mut self, _address: &TrackerAddress) -> Vec3 {
            Vec3::ZERO
        }

        fn orientation(&mut self, _address: &TrackerAddress) -> Quat {
            Quat::IDENTITY
        }

        fn button(&mut self, _address: &TrackerAddress, channel: usize) -> bool {
            self.0[channel]
        }

        fn analog(&mut self, _address: &TrackerAddress, _channel: usize) -> f64 {
            0.0
        }
    }

    #[test]
    fn first_poll_sets_the_baseline_without_firing() {
        let mut tracker = EventTracker::new();
        let mut source = Levels([true, true]);
        tracker.poll(&mut source);
        assert!(!tracker.take(CaveEvent::Status));
        assert!(!tracker.take(CaveEvent::RfidTap));
    }

    #[test]
    fn edge_latches_until_taken() {
        let mut tracker = EventTracker::new();
        let mut source = Levels([false, false]);
        tracker.poll(&mut source);

        source.0[1] = true;
        tracker.poll(&mut source);
        // Latch survives further polls with no change.
        tracker.poll(&mut source);
        assert!(tracker.take(CaveEvent::RfidTap));
        assert!(!tracker.take(CaveEvent::RfidTap));
        assert!(!tracker.take(CaveEvent::Status));
    }

    #[test]
    fn either_edge_counts() {
        let mut tracker = EventTracker::new();
        let mut source = Levels([true, false]);
        tracker.poll(&mut source);

        source.0[0] = false;
        tracker.poll(&mut source);
        assert!(tracker.take(CaveEvent::Status));
    }

    #[test]
    fn disabled_tracker_stays_silent() {
        let mut tracker = EventTracker::new();
        tracker.set_enabled(false);
        let mut source = Levels([false, false]);
        tracker.poll(&mut source);
        source.0[0] = true;
        tracker.poll(&mut source);
        assert!(!tracker.take(CaveEvent::Status));
    }
}
