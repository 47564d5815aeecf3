//! Chunk FIFO shared between the network producer and the render callback.
//!
//! The producer appends chunks as they arrive from the transport; the render
//! callback removes them from the front, possibly consuming one chunk across
//! several callbacks. An aggregate occupancy counter tracks the total number
//! of queued samples without walking the queue, and a hard cap bounds memory
//! growth under catastrophic overrun.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Maximum number of chunks the queue will hold. Pushing beyond this purges
/// the whole queue: once delivery is this far ahead of playback, resyncing
/// from empty beats unbounded buffering.
pub const HARD_CAP_CHUNKS: usize = 100;

/// One chunk of interleaved float samples as received from the transport.
///
/// A chunk is immutable after construction; the render engine tracks its
/// read position externally with a cursor. The empty chunk doubles as the
/// "queue exhausted" sentinel and allocates nothing.
#[derive(Debug, Default)]
pub struct Chunk {
    samples: Vec<f32>,
}

impl Chunk {
    /// Wrap a decoded sample buffer
    pub fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// The empty sentinel chunk
    pub fn empty() -> Self {
        Self { samples: Vec::new() }
    }

    /// Total interleaved sample count (frames x channels)
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True for the sentinel / fully drained case
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Interleaved sample data
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }
}

impl From<Vec<f32>> for Chunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

/// FIFO of [`Chunk`]s with an aggregate occupancy counter.
///
/// Invariant: `queued_samples() == sum(chunk.len() for chunk in queue)`.
///
/// The deque is guarded by a mutex whose critical sections are O(1) pointer
/// moves (push_back/pop_front), so the render callback observes only
/// bounded wait. Occupancy and the last-input-size cell are atomics readable
/// without taking the lock.
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: Mutex<VecDeque<Chunk>>,
    queued_samples: AtomicUsize,
    last_input_len: AtomicUsize,
    purges: AtomicU64,
}

impl ChunkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(HARD_CAP_CHUNKS)),
            queued_samples: AtomicUsize::new(0),
            last_input_len: AtomicUsize::new(0),
            purges: AtomicU64::new(0),
        }
    }

    /// Append a chunk from the producer side.
    ///
    /// Records the chunk length as the last observed input granularity and
    /// updates aggregate occupancy. If the queue already holds
    /// [`HARD_CAP_CHUNKS`] chunks, the entire queue is purged, occupancy is
    /// reset to zero, and the incoming chunk is discarded along with it.
    ///
    /// # Returns
    /// `true` if the chunk was enqueued, `false` if it triggered a purge
    pub fn push(&self, chunk: Chunk) -> bool {
        let len = chunk.len();
        let mut chunks = lock_recover(&self.chunks);
        if chunks.len() >= HARD_CAP_CHUNKS {
            chunks.clear();
            self.queued_samples.store(0, Ordering::Relaxed);
            self.purges.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("extreme audio overrun, purging chunk queue");
            return false;
        }
        chunks.push_back(chunk);
        self.queued_samples.fetch_add(len, Ordering::Relaxed);
        self.last_input_len.store(len, Ordering::Relaxed);
        true
    }

    /// Remove and return the oldest chunk, or the empty sentinel if the
    /// queue is exhausted. Decrements aggregate occupancy by the returned
    /// chunk's length.
    pub fn pop_front(&self) -> Chunk {
        let mut chunks = lock_recover(&self.chunks);
        match chunks.pop_front() {
            Some(chunk) => {
                self.queued_samples.fetch_sub(chunk.len(), Ordering::Relaxed);
                chunk
            }
            None => Chunk::empty(),
        }
    }

    /// Aggregate occupancy in samples across all queued chunks
    pub fn queued_samples(&self) -> usize {
        self.queued_samples.load(Ordering::Relaxed)
    }

    /// Length of the most recently pushed chunk, in interleaved samples
    pub fn last_input_len(&self) -> usize {
        self.last_input_len.load(Ordering::Relaxed)
    }

    /// Number of chunks currently queued
    pub fn chunk_count(&self) -> usize {
        lock_recover(&self.chunks).len()
    }

    /// True when no chunks are queued
    pub fn is_empty(&self) -> bool {
        self.chunk_count() == 0
    }

    /// How many times the hard cap forced a purge
    pub fn purge_count(&self) -> u64 {
        self.purges.load(Ordering::Relaxed)
    }

    /// Drop all queued chunks and reset occupancy (connection teardown)
    pub fn clear(&self) {
        let mut chunks = lock_recover(&self.chunks);
        chunks.clear();
        self.queued_samples.store(0, Ordering::Relaxed);
    }
}

/// Take the deque lock, recovering the data if a panicking thread poisoned it
fn lock_recover(chunks: &Mutex<VecDeque<Chunk>>) -> std::sync::MutexGuard<'_, VecDeque<Chunk>> {
    chunks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(len: usize) -> Chunk {
        Chunk::new(vec![0.5; len])
    }

    #[test]
    fn test_empty_queue() {
        let queue = ChunkQueue::new();
        assert_eq!(queue.queued_samples(), 0);
        assert_eq!(queue.chunk_count(), 0);
        assert!(queue.pop_front().is_empty());
        // Popping the sentinel leaves occupancy untouched
        assert_eq!(queue.queued_samples(), 0);
    }

    #[test]
    fn test_occupancy_tracks_sum_of_queued_chunks() {
        let queue = ChunkQueue::new();
        queue.push(chunk(128));
        queue.push(chunk(256));
        queue.push(chunk(64));
        assert_eq!(queue.queued_samples(), 448);

        let first = queue.pop_front();
        assert_eq!(first.len(), 128);
        assert_eq!(queue.queued_samples(), 320);

        queue.pop_front();
        queue.pop_front();
        assert_eq!(queue.queued_samples(), 0);
        assert!(queue.pop_front().is_empty());
    }

    #[test]
    fn test_occupancy_invariant_under_mixed_ops() {
        let queue = ChunkQueue::new();
        let mut expected: Vec<usize> = Vec::new();
        for (i, &len) in [100usize, 7, 512, 1, 300, 64].iter().enumerate() {
            queue.push(chunk(len));
            expected.push(len);
            if i % 2 == 1 {
                let popped = queue.pop_front();
                assert_eq!(popped.len(), expected.remove(0));
            }
            assert_eq!(queue.queued_samples(), expected.iter().sum::<usize>());
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = ChunkQueue::new();
        for i in 0..5 {
            queue.push(Chunk::new(vec![i as f32; 4]));
        }
        for i in 0..5 {
            assert_eq!(queue.pop_front().as_slice()[0], i as f32);
        }
    }

    #[test]
    fn test_last_input_len() {
        let queue = ChunkQueue::new();
        assert_eq!(queue.last_input_len(), 0);
        queue.push(chunk(96));
        assert_eq!(queue.last_input_len(), 96);
        queue.push(chunk(2048));
        assert_eq!(queue.last_input_len(), 2048);
        // Popping does not change the input granularity estimate
        queue.pop_front();
        assert_eq!(queue.last_input_len(), 2048);
    }

    #[test]
    fn test_hard_cap_purges_everything() {
        let queue = ChunkQueue::new();
        for _ in 0..HARD_CAP_CHUNKS {
            assert!(queue.push(chunk(10)));
        }
        assert_eq!(queue.chunk_count(), HARD_CAP_CHUNKS);
        assert_eq!(queue.queued_samples(), HARD_CAP_CHUNKS * 10);

        // The chunk that exceeds the cap triggers the purge and is itself
        // discarded: nothing survives.
        assert!(!queue.push(chunk(10)));
        assert_eq!(queue.chunk_count(), 0);
        assert_eq!(queue.queued_samples(), 0);
        assert_eq!(queue.purge_count(), 1);

        // The queue keeps working after a purge
        assert!(queue.push(chunk(10)));
        assert_eq!(queue.queued_samples(), 10);
    }

    #[test]
    fn test_clear() {
        let queue = ChunkQueue::new();
        queue.push(chunk(32));
        queue.push(chunk(32));
        queue.clear();
        assert_eq!(queue.chunk_count(), 0);
        assert_eq!(queue.queued_samples(), 0);
        assert_eq!(queue.purge_count(), 0);
    }
}
