//! Per-frame time-indexed sample buffer with LERP/SLERP interpolation (§4.G).

use crate::error::GraphError;
use crate::math::{self, Transform};

/// A sorted, age-pruned sequence of `(timestamp_ms, local_transform)` samples for one frame.
#[derive(Clone, Debug)]
pub struct TemporalBuffer {
    samples: Vec<(i64, Transform)>,
    max_duration_ms: i64,
}

impl TemporalBuffer {
    pub fn new(max_duration_ms: i64) -> Self {
        Self {
            samples: Vec::new(),
            max_duration_ms,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Inserts `(ts, t)` at the upper-bound position for `ts` (ties go after existing samples at
    /// the same timestamp), then prunes any samples now older than `max_duration_ms` relative to
    /// the newest retained timestamp.
    pub fn push(&mut self, ts: i64, t: Transform) {
        let pos = self.samples.partition_point(|&(sample_ts, _)| sample_ts <= ts);
        self.samples.insert(pos, (ts, t));
        self.prune();
    }

    fn prune(&mut self) {
        let Some(&(newest, _)) = self.samples.last() else {
            return;
        };
        let cutoff = newest - self.max_duration_ms;
        let drop_until = self.samples.partition_point(|&(ts, _)| ts < cutoff);
        self.samples.drain(0..drop_until);
    }

    /// Interpolates the transform at `ts` (§4.G `interpolate`).
    ///
    /// - `BufferEmpty` if no samples are retained.
    /// - `OutOfRange` if `ts` is older than the oldest retained sample.
    /// - Clamps to the newest sample if `ts` is at or past it (no extrapolation).
    /// - Otherwise LERP/SLERP between the bracketing samples.
    pub fn interpolate(&self, frame_id: &str, ts: i64) -> Result<Transform, GraphError> {
        let oldest = self
            .samples
            .first()
            .ok_or_else(|| GraphError::BufferEmpty(frame_id.to_string()))?;
        if ts < oldest.0 {
            return Err(GraphError::OutOfRange(frame_id.to_string()));
        }
        let newest = self.samples.last().expect("checked non-empty above");
        if ts >= newest.0 {
            return Ok(newest.1);
        }

        let h = self.samples.partition_point(|&(sample_ts, _)| sample_ts < ts);
        let (exact_ts, exact_t) = self.samples[h];
        if exact_ts == ts {
            return Ok(exact_t);
        }
        let (t0, before) = self.samples[h - 1];
        let (t1, after) = self.samples[h];
        let alpha = (ts - t0) as f64 / (t1 - t0) as f64;
        Ok(math::interpolate(&before, &after, alpha))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use approx::assert_abs_diff_eq;

    fn t(x: f64) -> Transform {
        Transform::new(Vec3::new(x, 0.0, 0.0), Default::default())
    }

    #[test]
    fn lerp_between_bracketing_samples() {
        let mut buf = TemporalBuffer::new(10_000);
        buf.push(0, t(0.0));
        buf.push(100, t(10.0));
        let mid = buf.interpolate("robot", 50).unwrap();
        assert_abs_diff_eq!(mid.translation().x, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn clamps_at_newest_no_extrapolation() {
        let mut buf = TemporalBuffer::new(10_000);
        buf.push(0, t(0.0));
        buf.push(100, t(10.0));
        let at_future = buf.interpolate("robot", 1_000).unwrap();
        assert_abs_diff_eq!(at_future.translation().x, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn out_of_range_before_oldest() {
        let mut buf = TemporalBuffer::new(10_000);
        buf.push(100, t(0.0));
        let err = buf.interpolate("robot", 50).unwrap_err();
        assert_eq!(err, GraphError::OutOfRange("robot".to_string()));
    }

    #[test]
    fn empty_buffer_errors() {
        let buf = TemporalBuffer::new(10_000);
        let err = buf.interpolate("robot", 0).unwrap_err();
        assert_eq!(err, GraphError::BufferEmpty("robot".to_string()));
    }

    #[test]
    fn pruning_bound_holds_after_push() {
        let mut buf = TemporalBuffer::new(100);
        buf.push(0, t(0.0));
        buf.push(50, t(1.0));
        buf.push(100, t(2.0));
        buf.push(200, t(3.0));
        assert_eq!(buf.interpolate("robot", 0), Err(GraphError::OutOfRange("robot".to_string())));
        assert_eq!(buf.interpolate("robot", 50), Err(GraphError::OutOfRange("robot".to_string())));
        let at_100 = buf.interpolate("robot", 100).unwrap();
        assert_abs_diff_eq!(at_100.translation().x, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn ties_preserve_insertion_order_after_existing() {
        let mut buf = TemporalBuffer::new(10_000);
        buf.push(0, t(0.0));
        buf.push(0, t(1.0));
        // Exact match at ts=0 should return the most recently pushed sample for that timestamp.
        let at_zero = buf.interpolate("robot", 0).unwrap();
        assert_abs_diff_eq!(at_zero.translation().x, 1.0, epsilon = 1e-9);
    }
}
