//! Status surface derived from queue occupancy.
//!
//! The render callback publishes raw integers through atomic cells and
//! pushes advisory notices over a bounded channel; the reader side turns
//! them into display values (buffered ratio, target latency string,
//! transient error text). Observation only: nothing here feeds back into
//! buffer control.

use crate::state::StreamState;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long a transient notice stays visible before clearing itself
pub const NOTICE_DISPLAY: Duration = Duration::from_secs(1);

/// Raw per-callback values written by the render engine.
///
/// Plain atomics so the real-time side never blocks on a status reader.
#[derive(Debug, Default)]
pub struct StatusCells {
    buffered_samples: AtomicUsize,
    target_samples: AtomicUsize,
}

impl StatusCells {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per render callback with the true buffered sample count
    /// and the freshly recomputed target queue size
    pub fn publish(&self, buffered: usize, target: usize) {
        self.buffered_samples.store(buffered, Ordering::Relaxed);
        self.target_samples.store(target, Ordering::Relaxed);
    }

    pub fn buffered_samples(&self) -> usize {
        self.buffered_samples.load(Ordering::Relaxed)
    }

    pub fn target_samples(&self) -> usize {
        self.target_samples.load(Ordering::Relaxed)
    }
}

/// Advisory telemetry emitted by the render engine and the transport.
///
/// Notices are never control flow: playback continues regardless, and the
/// reporter only holds the text for [`NOTICE_DISPLAY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Data ran out mid-callback and fill masking kicked in
    Underrun { samples: usize },
    /// The backlog exceeded the target and frames were dropped
    Overrun { dropped: usize },
    /// The transport connection closed
    Disconnected,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Underrun { samples } => write!(f, "Underrun by {samples} samples."),
            Notice::Overrun { dropped } => write!(f, "Overrun; dropping {dropped} samples."),
            Notice::Disconnected => write!(f, "Disconnected."),
        }
    }
}

/// One read-only view of the stream for UIs and logs
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Buffered samples over target, clamped to [0, 2]; healthy is near 1.0
    pub buffered_ratio: f32,
    /// Target latency formatted to two decimals, e.g. "0.20 s"
    pub target_latency: String,
    /// Most recent advisory notice, empty when none is active
    pub error: String,
    /// True end-to-end buffered sample count
    pub buffered_samples: usize,
    /// Current target queue size in samples
    pub target_samples: usize,
    /// How many times the hard cap purged the queue
    pub queue_purges: u64,
}

/// Reader-side status aggregator.
///
/// Drains the notice channel, applies the display expiry, and derives the
/// snapshot values from the atomic cells. Owned by whichever thread polls
/// status; the render callback never sees it.
pub struct StatusReporter {
    state: Arc<StreamState>,
    notices: Receiver<Notice>,
    sample_rate: u32,
    current: Option<(String, Instant)>,
}

impl StatusReporter {
    /// Create a reporter over the shared stream state.
    ///
    /// # Arguments
    /// * `state` - the producer/consumer shared state
    /// * `notices` - receiver half of the bounded notice channel
    /// * `sample_rate` - output sample rate, for the latency display
    pub fn new(state: Arc<StreamState>, notices: Receiver<Notice>, sample_rate: u32) -> Self {
        Self {
            state,
            notices,
            sample_rate,
            current: None,
        }
    }

    /// Take a status snapshot now
    pub fn snapshot(&mut self) -> StatusSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&mut self, now: Instant) -> StatusSnapshot {
        while let Ok(notice) = self.notices.try_recv() {
            tracing::debug!(%notice, "stream notice");
            self.current = Some((notice.to_string(), now + NOTICE_DISPLAY));
        }
        if let Some((_, expiry)) = &self.current {
            if now >= *expiry {
                self.current = None;
            }
        }

        let cells = self.state.status();
        let buffered = cells.buffered_samples();
        let target = cells.target_samples();
        let ratio = if target == 0 {
            0.0
        } else {
            (buffered as f32 / target as f32).clamp(0.0, 2.0)
        };

        StatusSnapshot {
            buffered_ratio: ratio,
            target_latency: format!("{:.2} s", target as f64 / f64::from(self.sample_rate)),
            error: self
                .current
                .as_ref()
                .map(|(text, _)| text.clone())
                .unwrap_or_default(),
            buffered_samples: buffered,
            target_samples: target,
            queue_purges: self.state.queue.purge_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use crossbeam_channel::bounded;

    fn reporter() -> (StatusReporter, crossbeam_channel::Sender<Notice>, Arc<StreamState>) {
        let state = Arc::new(StreamState::new());
        let (tx, rx) = bounded(8);
        (StatusReporter::new(Arc::clone(&state), rx, 48_000), tx, state)
    }

    #[test]
    fn test_notice_text() {
        assert_eq!(
            Notice::Underrun { samples: 480 }.to_string(),
            "Underrun by 480 samples."
        );
        assert_eq!(
            Notice::Overrun { dropped: 96 }.to_string(),
            "Overrun; dropping 96 samples."
        );
        assert_eq!(Notice::Disconnected.to_string(), "Disconnected.");
    }

    #[test]
    fn test_snapshot_ratio_and_latency() {
        let (mut reporter, _tx, state) = reporter();
        state.status().publish(4800, 9600);
        let snap = reporter.snapshot();
        assert_relative_eq!(snap.buffered_ratio, 0.5);
        assert_eq!(snap.target_latency, "0.20 s");
        assert_eq!(snap.buffered_samples, 4800);
        assert_eq!(snap.target_samples, 9600);
        assert!(snap.error.is_empty());
    }

    #[test]
    fn test_ratio_clamped_to_two() {
        let (mut reporter, _tx, state) = reporter();
        state.status().publish(100_000, 1000);
        assert_relative_eq!(reporter.snapshot().buffered_ratio, 2.0);
    }

    #[test]
    fn test_ratio_zero_before_first_callback() {
        let (mut reporter, _tx, _state) = reporter();
        let snap = reporter.snapshot();
        assert_relative_eq!(snap.buffered_ratio, 0.0);
        assert_eq!(snap.target_latency, "0.00 s");
    }

    #[test]
    fn test_notice_expires_after_display_duration() {
        let (mut reporter, tx, _state) = reporter();
        tx.send(Notice::Underrun { samples: 128 }).unwrap();

        let start = Instant::now();
        let snap = reporter.snapshot_at(start);
        assert_eq!(snap.error, "Underrun by 128 samples.");

        // Still visible just before expiry
        let snap = reporter.snapshot_at(start + NOTICE_DISPLAY - Duration::from_millis(1));
        assert_eq!(snap.error, "Underrun by 128 samples.");

        // Cleared at expiry
        let snap = reporter.snapshot_at(start + NOTICE_DISPLAY);
        assert!(snap.error.is_empty());
    }

    #[test]
    fn test_latest_notice_wins() {
        let (mut reporter, tx, _state) = reporter();
        tx.send(Notice::Underrun { samples: 1 }).unwrap();
        tx.send(Notice::Disconnected).unwrap();
        assert_eq!(reporter.snapshot().error, "Disconnected.");
    }
}
