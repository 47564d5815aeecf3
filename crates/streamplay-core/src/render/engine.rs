//! The real-time render engine.
//!
//! One `render` call fills one device-requested output buffer. The engine
//! copies from its active chunk, pulls further chunks from the queue as
//! needed, rewinds the write position to burn down overrun backlog, and
//! masks underrun by repeating the last rendered sample pair. It owns all
//! per-callback state; everything crossing threads goes through
//! [`StreamState`] atomics or bounded channels.
//!
//! Nothing in this module may block, perform I/O, or allocate (beyond
//! dropping consumed chunk buffers, which is bounded by the chunk size).

use crate::buffer::history::TargetEstimator;
use crate::buffer::queue::Chunk;
use crate::render::idle::ControlEvent;
use crate::state::StreamState;
use crate::status::Notice;
use crossbeam_channel::Sender;
use std::sync::Arc;

/// Overrun backlog is burned down in units of one frame per this many
/// excess samples, so a large backlog clears over a few callbacks instead
/// of one audible skip
const OVERRUN_DROP_QUANTUM: usize = 1024;

/// Per-callback drops at or below this are written off as clock skew and
/// not reported
const OVERRUN_NOTICE_THRESHOLD: usize = 50;

/// Consumer-side state for the render callback.
///
/// Constructed once per output stream and moved into the callback closure;
/// only the [`StreamState`] handle is shared with other threads.
pub struct RenderEngine {
    state: Arc<StreamState>,
    /// Chunk currently being copied out
    active: Chunk,
    /// Read position within the active chunk, in interleaved samples
    cursor: usize,
    /// Last rendered sample pair, held to mask underrun
    fill: (f32, f32),
    prev_underrun: usize,
    estimator: TargetEstimator,
    /// Most recent device request, in frames
    last_output_frames: usize,
    notices: Sender<Notice>,
    control: Sender<ControlEvent>,
}

impl RenderEngine {
    /// Create an engine over the shared stream state.
    ///
    /// # Arguments
    /// * `state` - producer/consumer shared state
    /// * `sample_rate` - output sample rate, seeds the target estimator
    /// * `notices` - bounded channel for advisory telemetry
    /// * `control` - bounded channel to the idle control loop
    pub fn new(
        state: Arc<StreamState>,
        sample_rate: u32,
        notices: Sender<Notice>,
        control: Sender<ControlEvent>,
    ) -> Self {
        Self {
            state,
            active: Chunk::empty(),
            cursor: 0,
            fill: (0.0, 0.0),
            prev_underrun: 0,
            estimator: TargetEstimator::new(sample_rate),
            last_output_frames: 0,
            notices,
            control,
        }
    }

    /// Current target queue size in samples
    pub fn target_queue_size(&self) -> usize {
        self.estimator.target()
    }

    /// Fill one output buffer. `left` and `right` must be the same length;
    /// every frame is written before returning.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let frames = left.len().min(right.len());
        self.last_output_frames = frames;

        if self.state.take_flush() {
            self.active = Chunk::empty();
            self.cursor = 0;
        }
        if self.state.take_fill_reset() {
            self.fill = (0.0, 0.0);
        }

        let mut total_overrun = 0usize;
        let mut filled = 0usize;

        if let Some(channels) = self.state.channels() {
            filled = self.copy_active(left, right, 0, frames, channels);
            while filled < frames {
                self.active = self.state.queue.pop_front();
                self.cursor = 0;
                if self.active.is_empty() {
                    break;
                }
                filled = self.copy_active(left, right, filled, frames, channels);

                // Burn down backlog: rewind the write position so already
                // written frames get overwritten by later data.
                let queued = self.state.queue.queued_samples();
                let target = self.estimator.target();
                if queued > target {
                    let drop = (queued - target).div_ceil(OVERRUN_DROP_QUANTUM);
                    filled = filled.saturating_sub(drop);
                    total_overrun += drop;
                }
            }
        }

        if filled > 0 {
            self.fill = (left[filled - 1], right[filled - 1]);
        }
        let underrun = frames - filled;
        for i in filled..frames {
            left[i] = self.fill.0;
            right[i] = self.fill.1;
        }

        // Report the previous callback's underrun unless this one is a
        // whole-buffer underrun, which just means the stream has stopped.
        if self.prev_underrun != 0 && underrun != frames {
            let _ = self.notices.try_send(Notice::Underrun {
                samples: self.prev_underrun,
            });
        }
        self.prev_underrun = underrun;

        if total_overrun > OVERRUN_NOTICE_THRESHOLD {
            let _ = self.notices.try_send(Notice::Overrun {
                dropped: total_overrun,
            });
        }

        let remaining = self.active.len().saturating_sub(self.cursor);
        self.state.set_active_remaining(remaining);
        let buffered = self.state.queue.queued_samples() + remaining;
        let target = self.estimator.update(
            buffered,
            self.state.queue.last_input_len(),
            self.last_output_frames,
        );
        self.state.status().publish(buffered, target);

        if underrun > 0 && self.state.try_claim_stop_check() {
            if self.control.try_send(ControlEvent::StopCheck).is_err() {
                self.state.release_stop_check();
            }
        }
    }

    /// Copy frames from the active chunk into the output starting at
    /// `filled`, until the chunk or the output runs out. Left channel reads
    /// at the cursor, right channel at cursor + (channels - 1), so mono
    /// duplicates and multichannel takes its outermost pair.
    fn copy_active(
        &mut self,
        left: &mut [f32],
        right: &mut [f32],
        mut filled: usize,
        frames: usize,
        channels: usize,
    ) -> usize {
        let data = self.active.as_slice();
        let right_offset = channels - 1;
        while self.cursor + right_offset < data.len() && filled < frames {
            left[filled] = data[self.cursor];
            right[filled] = data[self.cursor + right_offset];
            self.cursor += channels;
            filled += 1;
        }
        filled
    }
}
