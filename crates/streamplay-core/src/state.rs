//! Shared state between the network producer and the render consumer.
//!
//! The original design relied on single-threaded callback ordering; here
//! every cross-thread handoff is explicit. The producer appends to the
//! queue and sets the channel count once per connection; the render
//! callback pops from the front and reads everything else through atomics.

use crate::buffer::queue::ChunkQueue;
use crate::status::StatusCells;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// All state shared across the producer thread, the render callback, and
/// the control thread. One instance per stream, wrapped in an `Arc`.
#[derive(Debug, Default)]
pub struct StreamState {
    /// The jitter buffer proper
    pub queue: ChunkQueue,
    /// Negotiated channel count; 0 means not negotiated
    channels: AtomicUsize,
    /// Set on STOPPED -> STARTED so the next render pass starts from zero
    /// fill instead of a stale sample pair
    fill_reset: AtomicBool,
    /// Set on disconnect so the next render pass discards the active chunk
    flush: AtomicBool,
    /// Guard ensuring at most one stop-check request is in flight
    stop_check_pending: AtomicBool,
    /// Mirror of the idle controller's state, read by the producer to know
    /// whether a data-available wakeup is needed
    render_started: AtomicBool,
    /// Unread samples of the render engine's active chunk, updated once per
    /// callback so the control and status sides can see true occupancy
    active_remaining: AtomicUsize,
    status: StatusCells,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiated channel count, if any
    pub fn channels(&self) -> Option<usize> {
        match self.channels.load(Ordering::Acquire) {
            0 => None,
            n => Some(n),
        }
    }

    /// Record the negotiated channel count (producer, once per connection)
    pub fn set_channels(&self, channels: usize) {
        debug_assert!(channels >= 1);
        self.channels.store(channels, Ordering::Release);
    }

    /// Forget the channel count so a new connection must renegotiate
    pub fn clear_channels(&self) {
        self.channels.store(0, Ordering::Release);
    }

    /// Ask the render engine to zero its fill sample before the next pass
    pub fn request_fill_reset(&self) {
        self.fill_reset.store(true, Ordering::Release);
    }

    /// Consume a pending fill reset (render side)
    pub fn take_fill_reset(&self) -> bool {
        self.fill_reset.swap(false, Ordering::AcqRel)
    }

    /// Ask the render engine to discard its active chunk before the next
    /// pass, so audio from a superseded connection is never stitched to the
    /// new one
    pub fn request_flush(&self) {
        self.flush.store(true, Ordering::Release);
    }

    /// Consume a pending flush (render side)
    pub fn take_flush(&self) -> bool {
        self.flush.swap(false, Ordering::AcqRel)
    }

    /// Try to claim the single stop-check slot. Returns true if this caller
    /// claimed it; the slot stays claimed until [`release_stop_check`].
    ///
    /// [`release_stop_check`]: StreamState::release_stop_check
    pub fn try_claim_stop_check(&self) -> bool {
        !self.stop_check_pending.swap(true, Ordering::AcqRel)
    }

    /// Release the stop-check slot (control side, after the check ran or
    /// was superseded by new data)
    pub fn release_stop_check(&self) {
        self.stop_check_pending.store(false, Ordering::Release);
    }

    /// Whether the render path is currently attached to the audio sink
    pub fn render_started(&self) -> bool {
        self.render_started.load(Ordering::Acquire)
    }

    /// Update the render-path mirror (control side only)
    pub fn set_render_started(&self, started: bool) {
        self.render_started.store(started, Ordering::Release);
    }

    /// Record the unread remainder of the active chunk (render side)
    pub fn set_active_remaining(&self, samples: usize) {
        self.active_remaining.store(samples, Ordering::Relaxed);
    }

    /// Unread samples in the render engine's active chunk
    pub fn active_remaining(&self) -> usize {
        self.active_remaining.load(Ordering::Relaxed)
    }

    /// True end-to-end buffered sample count: queued chunks plus the
    /// unread remainder of the active chunk
    pub fn buffered_samples(&self) -> usize {
        self.queue.queued_samples() + self.active_remaining()
    }

    /// Whether any data is available to render (the idle controller's
    /// start/stop criterion)
    pub fn has_data(&self) -> bool {
        self.queue.chunk_count() > 0 || self.active_remaining() > 0
    }

    /// Raw status cells written by the render callback
    pub fn status(&self) -> &StatusCells {
        &self.status
    }
}
