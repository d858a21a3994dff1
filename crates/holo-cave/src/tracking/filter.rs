//! Recency-weighted position smoothing.

use glam::Vec3;
use std::collections::VecDeque;

/// Number of raw samples the rolling window holds.
pub const HISTORY_CAPACITY: usize = 10;

/// Sample weight is `index^WEIGHT_EXPONENT` with index 0 the oldest entry,
/// so the oldest sample in a full window contributes nothing and influence
/// ramps steeply toward the newest.
pub const WEIGHT_EXPONENT: f32 = 1.6;

#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    history: VecDeque<Vec3>,
}

impl PositionFilter {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    /// Adds a raw sample and returns the smoothed position.
    pub fn push(&mut self, raw: Vec3) -> Vec3 {
        self.history.push_back(raw);
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.smoothed(raw)
    }

    fn smoothed(&self, newest: Vec3) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut total = 0.0f32;
        for (i, sample) in self.history.iter().enumerate() {
            let weight = (i as f32).powf(WEIGHT_EXPONENT);
            sum += *sample * weight;
            total += weight;
        }
        if total > 0.0 {
            sum / total
        } else {
            // A window of one sample carries zero total weight.
            newest
        }
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_passes_through() {
        let mut filter = PositionFilter::new();
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(filter.push(p), p);
    }

    #[test]
    fn constant_input_is_a_fixed_point() {
        let mut filter = PositionFilter::new();
        let p = Vec3::new(-0.5, 1.25, 4.0);
        for _ in 0..20 {
            let out = filter.push(p);
            assert!((out - p).length() < 1e-5);
        }
    }

    #[test]
    fn output_stays_inside_the_sample_hull() {
        let mut filter = PositionFilter::new();
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        let mut out = Vec3::ZERO;
        for i in 0..HISTORY_CAPACITY {
            let x = (i as f32 * 0.37).sin();
            lo = lo.min(x);
            hi = hi.max(x);
            out = filter.push(Vec3::new(x, 0.0, 0.0));
        }
        assert!(out.x >= lo - 1e-5 && out.x <= hi + 1e-5);
    }

    #[test]
    fn newer_samples_dominate() {
        let mut filter = PositionFilter::new();
        for _ in 0..HISTORY_CAPACITY - 1 {
            filter.push(Vec3::ZERO);
        }
        let out = filter.push(Vec3::new(1.0, 0.0, 0.0));
        // One step toward the new value, but weighted well past a plain mean.
        let plain_mean = 1.0 / HISTORY_CAPACITY as f32;
        assert!(out.x > plain_mean);
        assert!(out.x < 1.0);
    }

    #[test]
    fn window_is_bounded() {
        let mut filter = PositionFilter::new();
        for i in 0..100 {
            filter.push(Vec3::splat(i as f32));
        }
        assert_eq!(filter.len(), HISTORY_CAPACITY);
    }

    #[test]
    fn old_samples_age_out_completely() {
        let mut filter = PositionFilter::new();
        filter.push(Vec3::splat(1000.0));
        let mut out = Vec3::ZERO;
        for _ in 0..HISTORY_CAPACITY {
            out = filter.push(Vec3::ZERO);
        }
        assert!(out.length() < 1e-5);
    }
}
