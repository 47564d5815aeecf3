//! Streamplay Client - WebSocket transport and cpal playback
//!
//! Wires the core jitter buffer to real I/O: a reconnecting WebSocket task
//! produces chunks, a dedicated output thread owns the cpal stream and the
//! idle control loop, and a status reporter exposes the buffered ratio,
//! target latency, and transient notices for display.

pub mod output;
pub mod transport;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use streamplay_core::{ControlEvent, StatusReporter, StatusSnapshot, StreamState};
use url::Url;

/// Capacity of the callback-to-control and notice channels
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Stream URL; the negotiated sample rate is appended as `?rate=`
    pub url: String,
    /// Output device name, or the system default when unset
    pub device: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8920/audio".to_string(),
            device: None,
        }
    }
}

/// A running audio client: output thread, transport task, status surface.
///
/// Dropping the client (or calling [`shutdown`]) stops the transport and
/// detaches from the audio device.
///
/// [`shutdown`]: AudioClient::shutdown
pub struct AudioClient {
    status: StatusReporter,
    control_tx: Sender<ControlEvent>,
    shutdown: Arc<AtomicBool>,
    transport_task: tokio::task::JoinHandle<()>,
    output_thread: Option<std::thread::JoinHandle<()>>,
    sample_rate: u32,
}

impl AudioClient {
    /// Open the output device, start the control loop and the reconnecting
    /// transport. Must be called within a tokio runtime.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let mut url = Url::parse(&config.url).context("invalid stream URL")?;
        let state = Arc::new(StreamState::new());
        let (control_tx, control_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let (notice_tx, notice_rx) = bounded(EVENT_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();

        let thread_state = Arc::clone(&state);
        let thread_control_tx = control_tx.clone();
        let thread_notice_tx = notice_tx.clone();
        let device = config.device.clone();
        let output_thread = std::thread::Builder::new()
            .name("streamplay-output".to_string())
            .spawn(move || {
                output::run(
                    thread_state,
                    control_rx,
                    thread_control_tx,
                    thread_notice_tx,
                    device,
                    ready_tx,
                )
            })
            .context("spawn output thread")?;

        let sample_rate = ready_rx
            .await
            .context("output thread died during setup")??;

        // The device rate travels to the server out-of-band; both sides
        // assume nominally equal rates afterwards.
        url.query_pairs_mut()
            .append_pair("rate", &sample_rate.to_string());

        let shutdown = Arc::new(AtomicBool::new(false));
        let transport_task = tokio::spawn(transport::run(
            Arc::clone(&state),
            control_tx.clone(),
            notice_tx,
            url,
            Arc::clone(&shutdown),
        ));

        Ok(Self {
            status: StatusReporter::new(state, notice_rx, sample_rate),
            control_tx,
            shutdown,
            transport_task,
            output_thread: Some(output_thread),
            sample_rate,
        })
    }

    /// Sample rate of the opened output device
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current status: buffered ratio, target latency, transient errors
    pub fn status_snapshot(&mut self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Stop the transport and detach from the audio device
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.transport_task.abort();
        let _ = self.control_tx.try_send(ControlEvent::Shutdown);
        if let Some(handle) = self.output_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioClient {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClientConfig::default();
        assert_eq!(config.url, "ws://127.0.0.1:8920/audio");
        assert!(config.device.is_none());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.url, ClientConfig::default().url);

        let config: ClientConfig =
            serde_json::from_str(r#"{"url":"ws://radio:9000/live","device":"USB DAC"}"#).unwrap();
        assert_eq!(config.url, "ws://radio:9000/live");
        assert_eq!(config.device.as_deref(), Some("USB DAC"));
    }
}
