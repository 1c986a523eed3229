//! Reference client for the Pulse realtime protocol.
//!
//! Connects to a server, watches the connection lifecycle, subscribes to a
//! couple of domain events, sends a hello message, and disconnects cleanly
//! on Ctrl-C. The hosting application — here, `main` — owns the lifecycle:
//! it builds the client explicitly and decides when to connect and
//! disconnect.
//!
//! Usage:
//!   PULSE_TOKEN=secret pulse-hello ws://localhost:9100/rt
//!
//! Env vars:
//!   PULSE_TOKEN — auth token (must match the server)

use std::time::Duration;

use pulse_client::{lifecycle, Client};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "ws://localhost:9100/rt".into());
    let token = std::env::var("PULSE_TOKEN").unwrap_or_default();

    let client = Client::builder()
        .endpoint(endpoint.clone())
        .token(token)
        .heartbeat_interval(Duration::from_secs(30))
        .build()?;

    client
        .on(lifecycle::AUTHENTICATED, |_| {
            tracing::info!("connection ready");
        })
        .await?;
    client
        .on(lifecycle::RECONNECTING, |env| {
            tracing::warn!(data = %env.data, "connection lost, reconnecting");
        })
        .await?;
    client
        .on(lifecycle::MAX_RECONNECT_ATTEMPTS, |env| {
            tracing::error!(data = %env.data, "gave up reconnecting, run connect() to resume");
        })
        .await?;
    client
        .on("job.progress", |env| {
            tracing::info!(data = %env.data, "job progress");
        })
        .await?;
    client
        .on("alert", |env| {
            tracing::warn!(data = %env.data, "server alert");
        })
        .await?;

    tracing::info!(endpoint = %endpoint, "connecting");
    client.connect().await?;

    let id = client
        .send(
            "client.hello",
            serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
        )
        .await?;
    tracing::info!(id = %id, "hello sent (queued if not yet ready)");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.disconnect().await?;

    let status = client.status().await?;
    tracing::info!(
        sent = status.stats.sent,
        received = status.stats.received,
        reconnects = status.stats.reconnect_count,
        "session stats"
    );
    client.shutdown();
    Ok(())
}
