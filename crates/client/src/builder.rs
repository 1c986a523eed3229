//! Builder pattern for constructing a [`Client`].

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::conn::{ClientConfig, Driver};
use crate::queue::MessageQueue;
use crate::reconnect::ReconnectPolicy;
use crate::types::ClientError;

/// Fluent builder for [`Client`].
///
/// Every timing and capacity knob is configurable per deployment; the
/// defaults below are the recommended starting point.
///
/// # Example
///
/// ```rust,no_run
/// # use pulse_client::ClientBuilder;
/// # async fn example() -> Result<(), pulse_client::ClientError> {
/// let client = ClientBuilder::new()
///     .endpoint("wss://rt.example.com/ws")
///     .token("secret")
///     .heartbeat_interval(std::time::Duration::from_secs(30))
///     .queue_capacity(100)
///     .build()?;
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    endpoint: String,
    token: String,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    auth_timeout: Duration,
    queue_capacity: usize,
    reconnect: ReconnectPolicy,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            endpoint: String::new(),
            token: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(10),
            queue_capacity: MessageQueue::DEFAULT_CAPACITY,
            reconnect: ReconnectPolicy::default(),
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    /// Set the server endpoint (e.g. `wss://rt.example.com/ws`).
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = url.into();
        self
    }

    /// Set the authentication token presented on every connection attempt.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the interval between liveness pings (default 30 s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Override how long to wait for a pong before declaring the
    /// connection dead (default 5 s).
    pub fn heartbeat_timeout(mut self, d: Duration) -> Self {
        self.heartbeat_timeout = d;
        self
    }

    /// Override how long to wait for the server's auth acknowledgment
    /// (default 10 s).
    pub fn auth_timeout(mut self, d: Duration) -> Self {
        self.auth_timeout = d;
        self
    }

    /// Override the outbound queue capacity (default 100). Past capacity
    /// the oldest entry is dropped.
    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n;
        self
    }

    /// Override the reconnect back-off policy.
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Build the [`Client`] and spawn its driver task. Must be called from
    /// within a Tokio runtime. The client stays `Disconnected` until
    /// [`connect`](Client::connect) is called.
    pub fn build(self) -> Result<Client, ClientError> {
        if self.endpoint.is_empty() {
            return Err(ClientError::Config("endpoint is required".into()));
        }

        let cfg = ClientConfig {
            endpoint: self.endpoint,
            token: self.token,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            auth_timeout: self.auth_timeout,
            queue_capacity: self.queue_capacity,
            reconnect: self.reconnect,
        };

        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let shutdown = CancellationToken::new();
        let driver = Driver::new(cfg, cmd_rx, shutdown.clone());
        tokio::spawn(driver.run());

        Ok(Client::new(cmd_tx, shutdown))
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_requires_endpoint() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn built_client_starts_disconnected() {
        let client = ClientBuilder::new()
            .endpoint("ws://localhost:1/never")
            .build()
            .unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.state, crate::ConnectionState::Disconnected);
        assert_eq!(status.queue_len, 0);
        assert_eq!(status.stats.sent, 0);
        client.shutdown();
    }

    #[tokio::test]
    async fn sends_queue_while_disconnected() {
        let client = ClientBuilder::new()
            .endpoint("ws://localhost:1/never")
            .queue_capacity(2)
            .build()
            .unwrap();
        client.send("a", serde_json::json!({})).await.unwrap();
        client.send("b", serde_json::json!({})).await.unwrap();
        client.send("c", serde_json::json!({})).await.unwrap();
        let status = client.status().await.unwrap();
        // Capacity 2: the oldest was evicted.
        assert_eq!(status.queue_len, 2);
        client.shutdown();
    }
}
