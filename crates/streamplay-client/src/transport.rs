//! Reconnecting WebSocket transport (the producer side of the stream).
//!
//! Each connection delivers one channel-count control message and then raw
//! f32 chunks; this task negotiates, enqueues, and wakes the idle control
//! loop when data arrives while the render path is stopped. Protocol
//! violations close the socket with the application close code and the
//! reconnect loop takes over with exponential backoff.

use crossbeam_channel::Sender;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamplay_core::protocol::{self, ChannelNegotiator, ProtocolError, PROTOCOL_CLOSE_CODE};
use streamplay_core::{Chunk, ControlEvent, Notice, StreamState};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

/// First reconnect delay; doubles per attempt
const BACKOFF_BASE_MS: u64 = 500;

/// Reconnect delay ceiling
const BACKOFF_CAP_MS: u64 = 5000;

/// Errors ending one connection epoch
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Reconnect delay for the given attempt (1-based).
///
/// Schedule: 500 ms -> 1000 ms -> 2000 ms -> 4000 ms, capped at 5000 ms.
pub fn backoff_ms(attempt: u32) -> u64 {
    let exponent = attempt.saturating_sub(1).min(4);
    (BACKOFF_BASE_MS << exponent).min(BACKOFF_CAP_MS)
}

/// Connect-and-stream loop. Runs until aborted or the shutdown flag is set;
/// every connection epoch ends with a full flush so audio from a superseded
/// connection is never stitched to the next one.
pub async fn run(
    state: Arc<StreamState>,
    control_tx: Sender<ControlEvent>,
    notice_tx: Sender<Notice>,
    url: Url,
    shutdown: Arc<AtomicBool>,
) {
    let mut attempt = 0u32;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        match connect_once(Arc::clone(&state), control_tx.clone(), &url).await {
            Ok(()) => {
                attempt = 0;
                tracing::info!("audio stream closed by server");
            }
            Err(TransportError::Protocol(e)) => {
                attempt = 0;
                tracing::error!(error = %e, "audio stream torn down after protocol violation");
            }
            Err(TransportError::WebSocket(e)) => {
                attempt += 1;
                tracing::warn!(error = %e, attempt, "audio stream connection failed");
            }
        }

        // End of a connection epoch: renegotiate from a clean slate and
        // never mix audio across epochs.
        state.clear_channels();
        state.queue.clear();
        state.request_flush();
        let _ = notice_tx.try_send(Notice::Disconnected);

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let delay = backoff_ms(attempt.max(1));
        tracing::debug!(delay_ms = delay, "reconnecting after backoff");
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
}

/// Run a single connection to completion.
///
/// Returns `Ok(())` on a server-initiated close, or the error that ended
/// the connection. Does not flush stream state; the caller owns epoch
/// cleanup.
pub async fn connect_once(
    state: Arc<StreamState>,
    control_tx: Sender<ControlEvent>,
    url: &Url,
) -> Result<(), TransportError> {
    let (mut ws, _response) = connect_async(url.as_str()).await?;
    tracing::info!(%url, "audio transport connected");

    match serve_connection(&mut ws, &state, &control_tx).await {
        Err(TransportError::Protocol(e)) => {
            tracing::error!(error = %e, "closing audio stream: protocol violation");
            let frame = CloseFrame {
                code: CloseCode::from(PROTOCOL_CLOSE_CODE),
                reason: e.to_string().into(),
            };
            let _ = ws.close(Some(frame)).await;
            Err(TransportError::Protocol(e))
        }
        other => other,
    }
}

async fn serve_connection(
    ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    state: &StreamState,
    control_tx: &Sender<ControlEvent>,
) -> Result<(), TransportError> {
    let mut negotiator = ChannelNegotiator::new();

    while let Some(message) = ws.next().await {
        match message? {
            Message::Text(text) => {
                let channels = negotiator.handle_control(&text)?;
                state.set_channels(channels);
                tracing::info!(channels, "stream negotiated");
            }
            Message::Binary(payload) => {
                negotiator.accept_chunk()?;
                let samples = protocol::decode_samples(&payload);
                if state.queue.push(Chunk::new(samples)) && !state.render_started() {
                    // Wake the idle controller; losing this on a full
                    // channel only delays the start to the next chunk.
                    if control_tx.try_send(ControlEvent::DataAvailable).is_err() {
                        tracing::warn!("control channel full, start deferred");
                    }
                }
            }
            Message::Close(frame) => {
                tracing::debug!(?frame, "server closed audio stream");
                return Ok(());
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_from_500ms() {
        assert_eq!(backoff_ms(1), 500);
        assert_eq!(backoff_ms(2), 1000);
        assert_eq!(backoff_ms(3), 2000);
        assert_eq!(backoff_ms(4), 4000);
    }

    #[test]
    fn test_backoff_capped_at_5s() {
        assert_eq!(backoff_ms(5), 5000);
        assert_eq!(backoff_ms(6), 5000);
        assert_eq!(backoff_ms(100), 5000);
    }
}
