//! Render stage subscriptions.
//!
//! Subscribers hook the per-user and per-eye walk of the frame. The
//! registry holds weak references keyed by an opaque handle, so dropping
//! a subscriber elsewhere is enough to unsubscribe; dead entries are
//! swept out during dispatch.

use crate::render::Eye;
use std::sync::{Arc, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    PreUser,
    PostUser,
    PreEye,
    PostEye,
}

/// Where in the frame walk a callback fires.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageEvent {
    pub stage: RenderStage,
    pub user: usize,
    /// Effective eye of the pass, absent for user-level stages.
    pub eye: Option<Eye>,
    /// Cumulative surface index of the pass, absent for user-level stages.
    pub surface: Option<usize>,
}

pub type StageCallback = Arc<dyn Fn(&StageEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallbackHandle(u64);

struct Entry {
    handle: CallbackHandle,
    subscriber: Weak<dyn Fn(&StageEvent) + Send + Sync>,
}

#[derive(Default)]
pub struct CallbackRegistry {
    entries: Vec<Entry>,
    next_handle: u64,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `callback`. Registering the same allocation again hands
    /// back the original handle instead of a second subscription.
    pub fn register(&mut self, callback: &StageCallback) -> CallbackHandle {
        let weak = Arc::downgrade(callback);
        if let Some(entry) = self.entries.iter().find(|e| e.subscriber.ptr_eq(&weak)) {
            return entry.handle;
        }
        self.next_handle += 1;
        let handle = CallbackHandle(self.next_handle);
        self.entries.push(Entry {
            handle,
            subscriber: weak,
        });
        handle
    }

    /// Drops the subscription behind `handle`. Unknown or already removed
    /// handles are ignored.
    pub fn remove(&mut self, handle: CallbackHandle) {
        self.entries.retain(|e| e.handle != handle);
    }

    /// Calls every live subscriber with `event`, pruning the dead ones.
    pub fn dispatch(&mut self, event: &StageEvent) {
        self.entries.retain(|entry| match entry.subscriber.upgrade() {
            Some(callback) => {
                callback(event);
                true
            }
            None => false,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn counting() -> (StageCallback, Arc<Mutex<Vec<RenderStage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StageCallback = Arc::new(move |event: &StageEvent| {
            sink.lock().unwrap().push(event.stage);
        });
        (callback, seen)
    }

    fn event(stage: RenderStage) -> StageEvent {
        StageEvent {
            stage,
            user: 0,
            eye: None,
            surface: None,
        }
    }

    #[test]
    fn duplicate_registration_reuses_the_handle() {
        let mut registry = CallbackRegistry::new();
        let (callback, seen) = counting();
        let first = registry.register(&callback);
        let second = registry.register(&callback);
        assert_eq!(first, second);
        registry.dispatch(&event(RenderStage::PreUser));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn removal_by_handle_stops_dispatch() {
        let mut registry = CallbackRegistry::new();
        let (callback, seen) = counting();
        let handle = registry.register(&callback);
        registry.remove(handle);
        registry.dispatch(&event(RenderStage::PreEye));
        assert!(seen.lock().unwrap().is_empty());
        // Removing again is harmless.
        registry.remove(handle);
    }

    #[test]
    fn dropped_subscribers_are_pruned_during_dispatch() {
        let mut registry = CallbackRegistry::new();
        let (kept, seen) = counting();
        registry.register(&kept);
        {
            let (dropped, _) = counting();
            registry.register(&dropped);
            assert_eq!(registry.len(), 2);
        }
        registry.dispatch(&event(RenderStage::PostUser));
        assert_eq!(registry.len(), 1);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn distinct_subscribers_get_distinct_handles() {
        let mut registry = CallbackRegistry::new();
        let (a, _) = counting();
        let (b, _) = counting();
        assert_ne!(registry.register(&a), registry.register(&b));
        assert_eq!(registry.len(), 2);
    }
}
