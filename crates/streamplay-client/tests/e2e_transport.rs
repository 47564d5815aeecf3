//! E2E tests for the WebSocket transport against a loopback server
//!
//! Runs a real tokio-tungstenite server on 127.0.0.1 and drives single
//! connection epochs through `connect_once`, verifying negotiation, chunk
//! delivery, and protocol-violation teardown with close code 4000.

use crossbeam_channel::bounded;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use streamplay_client::transport::{connect_once, TransportError};
use streamplay_core::{ControlEvent, ProtocolError, StreamState};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// Spawn a loopback WebSocket server running `serve` on the first accepted
/// connection; returns the URL to connect to
async fn loopback<F, Fut>(serve: F) -> (Url, tokio::task::JoinHandle<()>)
where
    F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        serve(ws).await;
    });
    let url = Url::parse(&format!("ws://{addr}/audio")).unwrap();
    (url, handle)
}

fn chunk_payload(samples: &[f32]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(samples.len() * 4);
    for v in samples {
        payload.extend_from_slice(&v.to_le_bytes());
    }
    payload
}

#[tokio::test]
async fn test_negotiation_then_chunks_fill_queue() {
    let (url, server) = loopback(|mut ws| async move {
        ws.send(Message::text("2")).await.unwrap();
        ws.send(Message::binary(chunk_payload(&[0.1, -0.1, 0.2, -0.2])))
            .await
            .unwrap();
        ws.send(Message::binary(chunk_payload(&[0.3, -0.3])))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let state = Arc::new(StreamState::new());
    let (control_tx, control_rx) = bounded(8);
    connect_once(Arc::clone(&state), control_tx, &url)
        .await
        .expect("clean server close");
    server.await.unwrap();

    assert_eq!(state.channels(), Some(2));
    assert_eq!(state.queue.queued_samples(), 6);
    assert_eq!(state.queue.chunk_count(), 2);
    assert_eq!(state.queue.pop_front().as_slice(), &[0.1, -0.1, 0.2, -0.2]);
    assert_eq!(state.queue.pop_front().as_slice(), &[0.3, -0.3]);

    // The first chunk while stopped wakes the idle controller
    assert!(matches!(
        control_rx.try_recv(),
        Ok(ControlEvent::DataAvailable)
    ));
}

#[tokio::test]
async fn test_binary_before_negotiation_closes_with_4000() {
    let (url, server) = loopback(|mut ws| async move {
        // Chunk first: a protocol violation
        ws.send(Message::binary(chunk_payload(&[0.1, 0.2])))
            .await
            .unwrap();
        // The client must answer with an application-level close
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => {
                    let frame = frame.expect("close frame with code");
                    assert_eq!(u16::from(frame.code), 4000);
                    break;
                }
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await;

    let state = Arc::new(StreamState::new());
    let (control_tx, _control_rx) = bounded(8);
    let result = connect_once(Arc::clone(&state), control_tx, &url).await;

    assert!(matches!(
        result,
        Err(TransportError::Protocol(
            ProtocolError::ChunkBeforeNegotiation
        ))
    ));
    assert_eq!(state.queue.queued_samples(), 0, "no chunk may be enqueued");
    server.await.unwrap();
}

#[tokio::test]
async fn test_second_control_message_closes_with_4000() {
    let (url, server) = loopback(|mut ws| async move {
        ws.send(Message::text("2")).await.unwrap();
        ws.send(Message::text("2")).await.unwrap();
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => {
                    let frame = frame.expect("close frame with code");
                    assert_eq!(u16::from(frame.code), 4000);
                    break;
                }
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        }
    })
    .await;

    let state = Arc::new(StreamState::new());
    let (control_tx, _control_rx) = bounded(8);
    let result = connect_once(Arc::clone(&state), control_tx, &url).await;

    assert!(matches!(
        result,
        Err(TransportError::Protocol(ProtocolError::AlreadyNegotiated))
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_control_message_is_fatal() {
    let (url, server) = loopback(|mut ws| async move {
        ws.send(Message::text("\"stereo\"")).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    })
    .await;

    let state = Arc::new(StreamState::new());
    let (control_tx, _control_rx) = bounded(8);
    let result = connect_once(Arc::clone(&state), control_tx, &url).await;

    assert!(matches!(
        result,
        Err(TransportError::Protocol(ProtocolError::MalformedControl(_)))
    ));
    assert_eq!(state.channels(), None);
    server.await.unwrap();
}
