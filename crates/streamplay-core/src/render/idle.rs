//! Start/stop state machine for the render path.
//!
//! Keeping the audio sink connected while there is nothing to play wastes
//! callbacks and risks clicks from stale fill values; disconnecting too
//! eagerly makes transient underruns flap. The controller starts as soon as
//! data shows up and stops only after a debounced check finds both the
//! queue and the active chunk empty.
//!
//! The controller itself is pure state plus a single cancellable deadline,
//! driven with explicit `Instant`s by a control loop that owns the actual
//! sink handle.

use std::time::{Duration, Instant};

/// Debounce before a stop-check fires, so a momentary gap in delivery does
/// not detach the sink
pub const STOP_DEBOUNCE: Duration = Duration::from_secs(1);

/// Whether the render path is attached to the audio sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Stopped,
    Started,
}

/// What the control loop should do to the sink after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkAction {
    /// Attach the render path (request a fill reset first)
    Connect,
    /// Detach the render path
    Disconnect,
}

/// Events delivered to the control loop over a bounded channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// The producer enqueued a chunk while the render path was stopped
    DataAvailable,
    /// The render callback saw underrun and wants a debounced stop check
    StopCheck,
    /// Tear the control loop down
    Shutdown,
}

/// The idle state machine. Initial state is [`RenderState::Stopped`].
#[derive(Debug)]
pub struct IdleController {
    state: RenderState,
    pending_stop: Option<Instant>,
    debounce: Duration,
}

impl IdleController {
    pub fn new() -> Self {
        Self::with_debounce(STOP_DEBOUNCE)
    }

    /// Controller with a custom debounce (tests)
    pub fn with_debounce(debounce: Duration) -> Self {
        Self {
            state: RenderState::Stopped,
            pending_stop: None,
            debounce,
        }
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    /// Data arrived: cancel any pending stop check and start the render
    /// path if it was stopped.
    pub fn on_data_available(&mut self) -> Option<SinkAction> {
        self.pending_stop = None;
        if self.state == RenderState::Stopped {
            self.state = RenderState::Started;
            Some(SinkAction::Connect)
        } else {
            None
        }
    }

    /// Arm the stop-check deadline. Requests are coalesced: while one is
    /// pending, further calls are no-ops.
    pub fn schedule_stop_check(&mut self, now: Instant) {
        if self.pending_stop.is_none() {
            self.pending_stop = Some(now + self.debounce);
        }
    }

    /// When the control loop should wake up next, if a check is pending
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_stop
    }

    /// Fire the pending deadline if it has elapsed, re-evaluating the
    /// start/stop criterion against current data availability.
    pub fn poll(&mut self, now: Instant, has_data: bool) -> Option<SinkAction> {
        match self.pending_stop {
            Some(deadline) if now >= deadline => {
                self.pending_stop = None;
                self.check(has_data)
            }
            _ => None,
        }
    }

    /// Evaluate the start/stop criterion immediately: data and stopped
    /// means start, no data and started means stop.
    pub fn check(&mut self, has_data: bool) -> Option<SinkAction> {
        if has_data {
            if self.state == RenderState::Stopped {
                self.state = RenderState::Started;
                return Some(SinkAction::Connect);
            }
        } else if self.state == RenderState::Started {
            self.state = RenderState::Stopped;
            return Some(SinkAction::Disconnect);
        }
        None
    }
}

impl Default for IdleController {
    fn default() -> Self {
        Self::new()
    }
}
