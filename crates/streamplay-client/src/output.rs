//! cpal output sink and the idle control loop.
//!
//! The output stream, the render engine, and the idle controller all live
//! on one dedicated thread: `cpal::Stream` is not `Send` on every host, so
//! the device handle stays in one place. The render callback owns the
//! engine; the loop below owns play/pause and the debounced stop checks.

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};
use streamplay_core::{
    ControlEvent, IdleController, Notice, RenderEngine, SinkAction, StreamState,
};

/// Delay budget the requested callback buffer is derived from
const MAX_DEVICE_DELAY_SECONDS: f64 = 0.15;

/// Largest buffer we will ever request, and the render scratch size
const MAX_BUFFER_FRAMES: u32 = 16384;

/// Smallest buffer worth requesting
const MIN_BUFFER_FRAMES: u32 = 256;

/// Control loop wakeup period when no stop-check deadline is armed
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Power-of-two callback buffer size for a delay budget, clamped to the
/// [256, 16384] range devices commonly accept
pub fn buffer_size_for_delay(max_delay_seconds: f64, sample_rate: u32) -> u32 {
    let max_buffer = (f64::from(sample_rate) * max_delay_seconds).max(1.0);
    let exponent = (max_buffer.log2().floor() as u32).min(31);
    (1u32 << exponent).clamp(MIN_BUFFER_FRAMES, MAX_BUFFER_FRAMES)
}

/// Output thread entry point: open the device, report the sample rate back
/// through `ready`, then run the control loop until shutdown.
pub(crate) fn run(
    state: Arc<StreamState>,
    control_rx: Receiver<ControlEvent>,
    control_tx: Sender<ControlEvent>,
    notice_tx: Sender<Notice>,
    device_name: Option<String>,
    ready: tokio::sync::oneshot::Sender<Result<u32>>,
) {
    let (stream, sample_rate) =
        match open_stream(&state, control_tx, notice_tx, device_name.as_deref()) {
            Ok(pair) => pair,
            Err(e) => {
                let _ = ready.send(Err(e));
                return;
            }
        };

    // Initial state is idle; hosts that cannot pause just play silence
    // until the first data arrives.
    if let Err(e) = stream.pause() {
        tracing::debug!("initial pause not supported: {e}");
    }
    let _ = ready.send(Ok(sample_rate));

    control_loop(&stream, &state, &control_rx);
    let _ = stream.pause();
    tracing::info!("output thread stopped");
}

fn open_stream(
    state: &Arc<StreamState>,
    control_tx: Sender<ControlEvent>,
    notice_tx: Sender<Notice>,
    device_name: Option<&str>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = match device_name {
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("output device not found: {name}"))?,
        None => host
            .default_output_device()
            .ok_or_else(|| anyhow!("no default output device"))?,
    };

    let default_config = device
        .default_output_config()
        .context("query default output config")?;
    let sample_rate = default_config.sample_rate();
    let channels = default_config.channels();
    let requested = buffer_size_for_delay(MAX_DEVICE_DELAY_SECONDS, sample_rate);

    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        requested_buffer = requested,
        "opening output stream"
    );

    let mut config = StreamConfig {
        channels,
        sample_rate,
        buffer_size: BufferSize::Fixed(requested),
    };

    // Try the derived buffer size first, fall back to the device default
    for buffer_size in [BufferSize::Fixed(requested), BufferSize::Default] {
        config.buffer_size = buffer_size;
        let engine = RenderEngine::new(
            Arc::clone(state),
            sample_rate,
            notice_tx.clone(),
            control_tx.clone(),
        );
        match device.build_output_stream(
            &config,
            render_callback(engine, channels as usize),
            |err| tracing::error!("output stream error: {err}"),
            None,
        ) {
            Ok(stream) => return Ok((stream, sample_rate)),
            Err(e) => tracing::warn!(?buffer_size, "output stream rejected: {e}"),
        }
    }
    Err(anyhow!("could not open an output stream"))
}

/// Build the real-time callback: render L/R into preallocated scratch and
/// interleave into the device layout, silencing channels past the first two
fn render_callback(
    mut engine: RenderEngine,
    channels: usize,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    let channels = channels.max(1);
    let mut left = vec![0.0f32; MAX_BUFFER_FRAMES as usize];
    let mut right = vec![0.0f32; MAX_BUFFER_FRAMES as usize];

    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        let frames = data.len() / channels;
        if left.len() < frames {
            left.resize(frames, 0.0);
            right.resize(frames, 0.0);
        }
        engine.render(&mut left[..frames], &mut right[..frames]);

        for (i, frame) in data.chunks_mut(channels).enumerate() {
            if i >= frames {
                break;
            }
            frame[0] = left[i];
            if frame.len() > 1 {
                frame[1] = right[i];
            }
            for sample in frame.iter_mut().skip(2) {
                *sample = 0.0;
            }
        }
    }
}

fn control_loop(stream: &cpal::Stream, state: &StreamState, control_rx: &Receiver<ControlEvent>) {
    let mut controller = IdleController::new();
    loop {
        let timeout = controller
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
            .unwrap_or(IDLE_POLL);

        match control_rx.recv_timeout(timeout) {
            Ok(ControlEvent::DataAvailable) => {
                // New data supersedes any pending stop check
                state.release_stop_check();
                if controller.on_data_available() == Some(SinkAction::Connect) {
                    connect_sink(stream, state);
                }
            }
            Ok(ControlEvent::StopCheck) => controller.schedule_stop_check(Instant::now()),
            Ok(ControlEvent::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if controller.next_deadline().is_some_and(|d| Instant::now() >= d) {
            state.release_stop_check();
            match controller.poll(Instant::now(), state.has_data()) {
                Some(SinkAction::Connect) => connect_sink(stream, state),
                Some(SinkAction::Disconnect) => {
                    disconnect_sink(stream, state);
                    // A chunk may have raced in between the emptiness check
                    // and the pause; restart rather than strand it.
                    if state.has_data() && controller.check(true) == Some(SinkAction::Connect) {
                        connect_sink(stream, state);
                    }
                }
                None => {}
            }
        }
    }
}

fn connect_sink(stream: &cpal::Stream, state: &StreamState) {
    // Zero the fill before the first callback so a stale pair from the
    // previous epoch cannot click.
    state.request_fill_reset();
    if let Err(e) = stream.play() {
        tracing::error!("failed to start output stream: {e}");
    }
    state.set_render_started(true);
    tracing::debug!("render path connected");
}

fn disconnect_sink(stream: &cpal::Stream, state: &StreamState) {
    if let Err(e) = stream.pause() {
        tracing::debug!("pause not supported, leaving stream running: {e}");
    }
    state.set_render_started(false);
    tracing::debug!("render path idle");
}
