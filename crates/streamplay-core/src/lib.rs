//! Streamplay Core - Adaptive jitter buffer and real-time render engine
//!
//! This library provides the receiving half of a continuous audio stream:
//! chunks of interleaved float samples arrive from a network transport with
//! variable timing, and a periodic hardware audio callback pulls rendered
//! stereo frames out at a fixed rate. In between sit an adaptively sized
//! chunk queue, an overrun/underrun recovery policy, an idle state machine
//! that detaches the render path when there is nothing to play, and a
//! status surface derived from queue occupancy.
//!
//! The crate is transport- and device-independent: the companion client
//! crate supplies the WebSocket producer and the cpal consumer.

pub mod buffer;
pub mod protocol;
pub mod render;
pub mod state;
pub mod status;

pub use buffer::history::TargetEstimator;
pub use buffer::queue::{Chunk, ChunkQueue};
pub use protocol::{ChannelNegotiator, ProtocolError};
pub use render::engine::RenderEngine;
pub use render::idle::{ControlEvent, IdleController, RenderState, SinkAction};
pub use state::StreamState;
pub use status::{Notice, StatusReporter, StatusSnapshot};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
