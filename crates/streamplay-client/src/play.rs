//! Streamplay playback binary
//!
//! Connects to a stream URL, plays it on the default (or named) output
//! device, and logs a status line once per second until Ctrl-C.
//!
//! Usage: `streamplay [URL]`, or set `STREAMPLAY_URL`; the output device
//! can be overridden with `STREAMPLAY_DEVICE`.

use std::time::Duration;
use streamplay_client::{AudioClient, ClientConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamplay_core=debug".parse().unwrap())
                .add_directive("streamplay_client=debug".parse().unwrap()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("STREAMPLAY_URL").ok())
        .unwrap_or_else(|| ClientConfig::default().url);
    let device = std::env::var("STREAMPLAY_DEVICE").ok();

    let config = ClientConfig {
        url: url.clone(),
        device,
    };
    let mut client = match AudioClient::connect(config).await {
        Ok(client) => client,
        Err(e) => {
            tracing::error!("client start failed: {e:#}");
            std::process::exit(1);
        }
    };
    tracing::info!(%url, sample_rate = client.sample_rate(), "streamplay running");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {
                let status = client.status_snapshot();
                if status.error.is_empty() {
                    tracing::info!(
                        buffered = %format!("{:.2}", status.buffered_ratio),
                        target = %status.target_latency,
                        "stream status"
                    );
                } else {
                    tracing::warn!(
                        buffered = %format!("{:.2}", status.buffered_ratio),
                        target = %status.target_latency,
                        error = %status.error,
                        "stream status"
                    );
                }
            }
        }
    }

    tracing::info!("shutting down");
    client.shutdown();
}
