//! Occupancy history and adaptive target sizing.
//!
//! The queue should be large to absorb bursty delivery and small to keep
//! latency low. The estimator splits the difference empirically: it watches
//! the min/max spread of buffered-sample counts over a sliding window and
//! budgets for that spread plus one chunk of slack on whichever side
//! (network delivery or hardware pull) has the larger granularity.

/// Number of occupancy samples in the sliding window, one per render
/// callback
pub const HISTORY_LEN: usize = 200;

/// Initial latency budget before any callbacks have been observed
const INITIAL_TARGET_SECONDS: f64 = 0.2;

/// Fixed-capacity ring of the most recent occupancy samples, overwritten in
/// round-robin order. Only min/max over the window are ever read.
#[derive(Debug)]
pub struct OccupancyHistory {
    slots: [usize; HISTORY_LEN],
    pos: usize,
}

impl OccupancyHistory {
    /// Create a zero-filled history window
    pub fn new() -> Self {
        Self {
            slots: [0; HISTORY_LEN],
            pos: 0,
        }
    }

    /// Record one occupancy sample, overwriting the oldest slot
    pub fn record(&mut self, occupancy: usize) {
        self.slots[self.pos] = occupancy;
        self.pos = (self.pos + 1) % HISTORY_LEN;
    }

    /// Smallest and largest occupancy in the window.
    ///
    /// Until the window has wrapped once, the unwritten zero slots pull the
    /// minimum down to 0; the estimator inherits that warm-up bias and
    /// simply budgets generously for the first window.
    pub fn range(&self) -> (usize, usize) {
        let mut least = usize::MAX;
        let mut most = 0;
        for &v in &self.slots {
            least = least.min(v);
            most = most.max(v);
        }
        (least, most)
    }
}

impl Default for OccupancyHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Recomputes the desired buffered-sample count (latency budget) once per
/// render callback from the observed jitter spread and chunk granularities.
#[derive(Debug)]
pub struct TargetEstimator {
    history: OccupancyHistory,
    target: usize,
}

impl TargetEstimator {
    /// Create an estimator with the initial 0.2 s budget at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            history: OccupancyHistory::new(),
            target: (f64::from(sample_rate) * INITIAL_TARGET_SECONDS).round() as usize,
        }
    }

    /// Record this callback's true buffered sample count and recompute the
    /// target as `max(1, (max - min) + max(last_in, last_out))`.
    ///
    /// # Arguments
    /// * `buffered` - queued samples plus the unread remainder of the active chunk
    /// * `last_in` - length of the most recent network chunk, in samples
    /// * `last_out` - most recent device request, in frames
    ///
    /// # Returns
    /// The recomputed target queue size in samples
    pub fn update(&mut self, buffered: usize, last_in: usize, last_out: usize) -> usize {
        self.history.record(buffered);
        let (least, most) = self.history.range();
        self.target = ((most - least) + last_in.max(last_out)).max(1);
        self.target
    }

    /// Current target queue size in samples
    pub fn target(&self) -> usize {
        self.target
    }
}
