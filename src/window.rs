//! Rolling latency window
//!
//! Fixed-capacity numeric ring buffer producing mean and percentile
//! statistics over the most recent samples. The percentile is a
//! nearest-rank estimator over a sorted copy of the current contents —
//! not an exact streaming quantile. The approximation error grows as the
//! window shrinks; that is an intentional trade for a small, allocation-
//! light hot path, not a bug.
//!
//! Windows are process-local and reset on restart; nothing is persisted.

use std::collections::VecDeque;

/// Fixed-capacity FIFO of `f64` samples with summary statistics.
///
/// `add` evicts the oldest sample once the window is at capacity. All
/// statistics over an empty window are `0.0`.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    samples: VecDeque<f64>,
}

impl RollingWindow {
    /// Create a window holding at most `capacity` samples.
    ///
    /// A capacity of zero is clamped to 1 so the window always observes
    /// the most recent sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Record a sample, evicting the oldest if at capacity.
    pub fn add(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Number of samples currently held.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the window holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples the window holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arithmetic mean of the current contents; `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    /// Nearest-rank percentile of the current contents; `0.0` when empty.
    ///
    /// Selects the `round(p/100 * (n-1))`-th order statistic. `p` is
    /// clamped to `[0, 100]`.
    pub fn percentile(&self, p: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let p = p.clamp(0.0, 100.0);

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let rank = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
        sorted[rank.min(sorted.len() - 1)]
    }

    /// Discard all samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_evicts_oldest_at_capacity() {
        let mut w = RollingWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.add(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.mean(), 3.0);
        assert_eq!(w.percentile(100.0), 4.0);
        assert_eq!(w.percentile(0.0), 2.0);
    }

    #[test]
    fn test_empty_window_statistics_are_zero() {
        let w = RollingWindow::new(10);
        assert!(w.is_empty());
        assert_eq!(w.mean(), 0.0);
        assert_eq!(w.percentile(95.0), 0.0);
    }

    #[test]
    fn test_mean_of_partial_window() {
        let mut w = RollingWindow::new(100);
        w.add(2.0);
        w.add(4.0);
        assert_eq!(w.mean(), 3.0);
    }

    #[test]
    fn test_percentile_nearest_rank_selection() {
        let mut w = RollingWindow::new(10);
        for v in [10.0, 20.0, 30.0, 40.0, 50.0] {
            w.add(v);
        }
        // rank = round(p/100 * 4)
        assert_eq!(w.percentile(0.0), 10.0);
        assert_eq!(w.percentile(50.0), 30.0);
        assert_eq!(w.percentile(95.0), 50.0);
        assert_eq!(w.percentile(100.0), 50.0);
    }

    #[test]
    fn test_percentile_unsorted_input() {
        let mut w = RollingWindow::new(5);
        for v in [50.0, 10.0, 40.0, 20.0, 30.0] {
            w.add(v);
        }
        assert_eq!(w.percentile(100.0), 50.0);
        assert_eq!(w.percentile(0.0), 10.0);
    }

    #[test]
    fn test_single_sample_all_percentiles_equal() {
        let mut w = RollingWindow::new(10);
        w.add(7.5);
        assert_eq!(w.percentile(0.0), 7.5);
        assert_eq!(w.percentile(50.0), 7.5);
        assert_eq!(w.percentile(100.0), 7.5);
        assert_eq!(w.mean(), 7.5);
    }

    #[test]
    fn test_percentile_out_of_range_is_clamped() {
        let mut w = RollingWindow::new(3);
        w.add(1.0);
        w.add(2.0);
        assert_eq!(w.percentile(-5.0), 1.0);
        assert_eq!(w.percentile(150.0), 2.0);
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let mut w = RollingWindow::new(0);
        w.add(1.0);
        w.add(2.0);
        assert_eq!(w.len(), 1);
        assert_eq!(w.mean(), 2.0);
    }

    #[test]
    fn test_clear_resets_contents() {
        let mut w = RollingWindow::new(5);
        w.add(1.0);
        w.add(2.0);
        w.clear();
        assert!(w.is_empty());
        assert_eq!(w.mean(), 0.0);
    }
}
