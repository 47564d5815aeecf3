//! Jitter buffering module
//!
//! This module contains the data half of the jitter buffer:
//! - Chunk FIFO with aggregate occupancy and hard-cap purge ([`queue`])
//! - Occupancy history ring and adaptive target sizing ([`history`])

pub mod history;
pub mod queue;
