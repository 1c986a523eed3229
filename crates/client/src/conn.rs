//! Connection driver — owns the state machine, the message queue, the
//! subscription registry, and the statistics.
//!
//! Runs as a single task; the [`Client`](crate::Client) handle talks to it
//! over the command channel, so every mutation of connection state happens
//! in one place and nothing needs a lock. Suspension points are I/O only:
//! opening the transport, the auth acknowledgment, and heartbeat timers.

use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use pulse_protocol::{lifecycle, reserved, AuthRequest, Envelope};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{EventCallback, EventDispatcher, SubscriptionId};
use crate::heartbeat::{HeartbeatEvent, HeartbeatMonitor};
use crate::queue::{MessageQueue, QueueEntry};
use crate::reconnect::ReconnectPolicy;
use crate::types::{ClientError, ConnectionState, Stats, Status};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Requests from the handle to the driver.
pub(crate) enum Command {
    Connect,
    Disconnect,
    Send(Envelope),
    Subscribe {
        kind: String,
        callback: EventCallback,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        kind: String,
        id: SubscriptionId,
    },
    Status {
        reply: oneshot::Sender<Status>,
    },
}

/// Resolved configuration, assembled by the builder.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub endpoint: String,
    pub token: String,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub auth_timeout: Duration,
    pub queue_capacity: usize,
    pub reconnect: ReconnectPolicy,
}

/// How one connection cycle ended.
enum SessionEnd {
    /// Caller-initiated `disconnect()`; suppresses reconnection.
    Explicit,
    /// Server rejected the auth handshake; fatal for this connect cycle.
    AuthRejected,
    /// Transport-level loss: open failure, close, error, or heartbeat
    /// timeout. `reached_ready` controls reconnect accounting.
    Transport { reached_ready: bool, error: String },
    /// Every handle is gone; the driver should exit.
    HandleDropped,
}

enum BackoffOutcome {
    Elapsed,
    Cancelled,
    HandleDropped,
}

pub(crate) struct Driver {
    cfg: ClientConfig,
    cmd_rx: mpsc::Receiver<Command>,
    shutdown: CancellationToken,
    dispatcher: EventDispatcher,
    queue: MessageQueue,
    stats: Stats,
    state: ConnectionState,
    /// Consecutive failed attempts since the last ready connection.
    failures: u32,
}

impl Driver {
    pub(crate) fn new(
        cfg: ClientConfig,
        cmd_rx: mpsc::Receiver<Command>,
        shutdown: CancellationToken,
    ) -> Self {
        let queue = MessageQueue::new(cfg.queue_capacity);
        Self {
            cfg,
            cmd_rx,
            shutdown,
            dispatcher: EventDispatcher::new(),
            queue,
            stats: Stats::default(),
            state: ConnectionState::Disconnected,
            failures: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("driver stopped by shutdown token");
            }
            _ = self.run_inner() => {}
        }
    }

    /// Top-level lifecycle: idle until `connect()`, then cycle through
    /// sessions and reconnect back-off until told otherwise.
    async fn run_inner(&mut self) {
        loop {
            if !self.wait_for_connect().await {
                return;
            }
            self.failures = 0;

            loop {
                match self.run_session().await {
                    SessionEnd::HandleDropped => return,
                    SessionEnd::Explicit => {
                        self.set_state(ConnectionState::Closing);
                        self.stats.connected_since = None;
                        self.emit_lifecycle(
                            lifecycle::DISCONNECT,
                            serde_json::json!({ "explicit": true }),
                        );
                        self.set_state(ConnectionState::Disconnected);
                        break;
                    }
                    SessionEnd::AuthRejected => {
                        tracing::error!(endpoint = %self.cfg.endpoint, "authentication rejected");
                        self.set_state(ConnectionState::Closing);
                        self.stats.last_error = Some(ClientError::AuthRejected.to_string());
                        self.emit_lifecycle(lifecycle::AUTH_FAILED, serde_json::json!({}));
                        self.set_state(ConnectionState::Disconnected);
                        break;
                    }
                    SessionEnd::Transport {
                        reached_ready,
                        error,
                    } => {
                        tracing::warn!(error = %error, reached_ready, "connection lost");
                        self.stats.last_error = Some(error);
                        if reached_ready {
                            self.stats.reconnect_count += 1;
                            self.stats.connected_since = None;
                            self.failures = 0;
                            self.emit_lifecycle(
                                lifecycle::DISCONNECT,
                                serde_json::json!({ "explicit": false }),
                            );
                        }
                        self.set_state(ConnectionState::Disconnected);
                        self.failures += 1;

                        if self.cfg.reconnect.should_give_up(self.failures) {
                            tracing::error!(
                                attempts = self.failures,
                                "max reconnect attempts exhausted"
                            );
                            self.emit_lifecycle(
                                lifecycle::MAX_RECONNECT_ATTEMPTS,
                                serde_json::json!({ "attempts": self.failures }),
                            );
                            break;
                        }

                        let attempt = self.failures - 1;
                        let delay = self.cfg.reconnect.delay_for_attempt(attempt);
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "reconnecting"
                        );
                        self.emit_lifecycle(
                            lifecycle::RECONNECTING,
                            serde_json::json!({
                                "attempt": attempt,
                                "delay_ms": delay.as_millis() as u64,
                            }),
                        );
                        match self.backoff(delay).await {
                            BackoffOutcome::Elapsed => continue,
                            BackoffOutcome::Cancelled => {
                                self.set_state(ConnectionState::Disconnected);
                                break;
                            }
                            BackoffOutcome::HandleDropped => return,
                        }
                    }
                }
            }
        }
    }

    /// Idle in `Disconnected`, serving commands until `connect()` arrives.
    /// Returns `false` once every handle is gone.
    async fn wait_for_connect(&mut self) -> bool {
        loop {
            match self.cmd_rx.recv().await {
                None => return false,
                Some(Command::Connect) => return true,
                Some(Command::Disconnect) => {} // already disconnected
                Some(cmd) => self.handle_passive(cmd),
            }
        }
    }

    /// Sleep before the next attempt while still serving commands.
    /// `disconnect()` cancels the pending attempt in the same tick;
    /// `connect()` retries immediately.
    async fn backoff(&mut self, delay: Duration) -> BackoffOutcome {
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return BackoffOutcome::Elapsed,
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return BackoffOutcome::HandleDropped,
                    Some(Command::Disconnect) => return BackoffOutcome::Cancelled,
                    Some(Command::Connect) => return BackoffOutcome::Elapsed,
                    Some(cmd) => self.handle_passive(cmd),
                }
            }
        }
    }

    /// One connection lifecycle: open → authenticate → ready loop.
    async fn run_session(&mut self) -> SessionEnd {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %self.cfg.endpoint, "connecting");

        // ── Open the transport ───────────────────────────────────────
        let connect = tokio_tungstenite::connect_async(self.cfg.endpoint.clone());
        tokio::pin!(connect);
        let ws = loop {
            tokio::select! {
                result = &mut connect => match result {
                    Ok((ws, _response)) => break ws,
                    Err(e) => {
                        return SessionEnd::Transport {
                            reached_ready: false,
                            error: format!("transport open failed: {e}"),
                        };
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return SessionEnd::HandleDropped,
                    Some(Command::Disconnect) => return SessionEnd::Explicit,
                    Some(Command::Connect) => {} // already connecting
                    Some(cmd) => self.handle_passive(cmd),
                }
            }
        };

        self.set_state(ConnectionState::Connected);
        self.emit_lifecycle(lifecycle::CONNECT, serde_json::json!({}));

        let (mut sink, mut stream) = ws.split();

        // ── Authentication handshake ─────────────────────────────────
        let auth = AuthRequest::new(self.cfg.token.clone()).into_envelope();
        if let Err(e) = send_envelope(&mut sink, &auth).await {
            return SessionEnd::Transport {
                reached_ready: false,
                error: e.to_string(),
            };
        }
        self.set_state(ConnectionState::Authenticating);

        let deadline = tokio::time::Instant::now() + self.cfg.auth_timeout;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return SessionEnd::Transport {
                        reached_ready: false,
                        error: "authentication timed out".into(),
                    };
                }
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<Envelope>(&text) {
                            Ok(env) if env.kind == reserved::AUTH_SUCCESS => break,
                            Ok(env) if env.kind == reserved::AUTH_FAILED => {
                                return SessionEnd::AuthRejected;
                            }
                            Ok(env) => {
                                tracing::debug!(kind = %env.kind, "ignoring message before auth");
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, "dropping malformed envelope");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return SessionEnd::Transport {
                            reached_ready: false,
                            error: "closed during authentication".into(),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Transport {
                            reached_ready: false,
                            error: e.to_string(),
                        };
                    }
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return SessionEnd::HandleDropped,
                    Some(Command::Disconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Explicit;
                    }
                    Some(Command::Connect) => {}
                    Some(cmd) => self.handle_passive(cmd),
                }
            }
        }

        // ── Ready ────────────────────────────────────────────────────
        self.set_state(ConnectionState::Ready);
        self.failures = 0;
        self.stats.connected_since = Some(Utc::now());
        self.emit_lifecycle(lifecycle::AUTHENTICATED, serde_json::json!({}));
        tracing::info!(endpoint = %self.cfg.endpoint, "authenticated, connection ready");

        // Flush messages queued while offline, oldest first. Stop at the
        // first failure so delivery order survives the next reconnect.
        while let Some(entry) = self.queue.pop_front() {
            if let Err(e) = send_envelope(&mut sink, &entry.envelope).await {
                self.queue.requeue_front(entry);
                return SessionEnd::Transport {
                    reached_ready: true,
                    error: e.to_string(),
                };
            }
            self.stats.sent += 1;
        }

        self.ready_loop(sink, stream).await
    }

    /// Steady state: serve commands, dispatch inbound envelopes, and keep
    /// the heartbeat alive, until something ends the session.
    async fn ready_loop(&mut self, mut sink: WsSink, mut stream: WsStream) -> SessionEnd {
        let mut heartbeat =
            HeartbeatMonitor::new(self.cfg.heartbeat_interval, self.cfg.heartbeat_timeout);

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    None => return SessionEnd::HandleDropped,
                    Some(Command::Connect) => {} // already connected
                    Some(Command::Disconnect) => {
                        self.set_state(ConnectionState::Closing);
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Explicit;
                    }
                    Some(Command::Send(envelope)) => {
                        match send_envelope(&mut sink, &envelope).await {
                            Ok(()) => self.stats.sent += 1,
                            Err(e) => {
                                // Keep the message for the next session.
                                self.queue.requeue_front(QueueEntry::new(envelope));
                                return SessionEnd::Transport {
                                    reached_ready: true,
                                    error: e.to_string(),
                                };
                            }
                        }
                    }
                    Some(cmd) => self.handle_passive(cmd),
                },
                msg = stream.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) = self.handle_inbound(&text, &mut sink, &mut heartbeat).await {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("server closed connection");
                        return SessionEnd::Transport {
                            reached_ready: true,
                            error: "connection closed by server".into(),
                        };
                    }
                    Some(Ok(_)) => {} // ws-level ping/pong handled by tungstenite
                    Some(Err(e)) => {
                        return SessionEnd::Transport {
                            reached_ready: true,
                            error: e.to_string(),
                        };
                    }
                    None => {
                        return SessionEnd::Transport {
                            reached_ready: true,
                            error: "connection closed".into(),
                        };
                    }
                },
                hb = heartbeat.event() => match hb {
                    HeartbeatEvent::SendPing => {
                        let ping = Envelope::new(reserved::PING, serde_json::json!({}));
                        let id = ping.id.clone();
                        if let Err(e) = send_envelope(&mut sink, &ping).await {
                            return SessionEnd::Transport {
                                reached_ready: true,
                                error: e.to_string(),
                            };
                        }
                        heartbeat.arm(id);
                    }
                    HeartbeatEvent::Timeout => {
                        tracing::warn!(
                            timeout_ms = self.cfg.heartbeat_timeout.as_millis() as u64,
                            "heartbeat timed out, forcing close"
                        );
                        let _ = sink.send(Message::Close(None)).await;
                        return SessionEnd::Transport {
                            reached_ready: true,
                            error: "heartbeat timeout".into(),
                        };
                    }
                },
            }
        }
    }

    /// Route one inbound envelope: reserved types are handled internally,
    /// everything else goes to domain subscribers in arrival order.
    async fn handle_inbound(
        &mut self,
        text: &str,
        sink: &mut WsSink,
        heartbeat: &mut HeartbeatMonitor,
    ) -> Option<SessionEnd> {
        let envelope = match serde_json::from_str::<Envelope>(text) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed envelope");
                return None;
            }
        };
        self.stats.received += 1;

        match envelope.kind.as_str() {
            reserved::PING => {
                let pong = Envelope::pong_for(&envelope);
                if let Err(e) = send_envelope(sink, &pong).await {
                    return Some(SessionEnd::Transport {
                        reached_ready: true,
                        error: e.to_string(),
                    });
                }
            }
            reserved::PONG => {
                if !heartbeat.on_pong(&envelope.id) {
                    tracing::trace!(id = %envelope.id, "unmatched pong");
                }
            }
            reserved::ERROR => {
                tracing::warn!(data = %envelope.data, "server reported error");
                self.emit_lifecycle(lifecycle::SERVER_ERROR, envelope.data.clone());
            }
            // Remaining reserved kinds are the auth handshake messages;
            // outside the handshake they never reach subscribers.
            _ if envelope.is_reserved() => {
                tracing::debug!(kind = %envelope.kind, "ignoring reserved message outside handshake");
            }
            _ => self.dispatcher.emit(&envelope),
        }
        None
    }

    /// Commands that are valid in every phase.
    fn handle_passive(&mut self, cmd: Command) {
        match cmd {
            Command::Send(envelope) => self.enqueue(envelope),
            Command::Subscribe {
                kind,
                callback,
                reply,
            } => {
                let id = self.dispatcher.subscribe(kind, callback);
                let _ = reply.send(id);
            }
            Command::Unsubscribe { kind, id } => self.dispatcher.unsubscribe(&kind, id),
            Command::Status { reply } => {
                let _ = reply.send(Status {
                    state: self.state,
                    stats: self.stats.clone(),
                    queue_len: self.queue.len(),
                });
            }
            // Handled by the phase loops before delegating here.
            Command::Connect | Command::Disconnect => {}
        }
    }

    fn enqueue(&mut self, envelope: Envelope) {
        if let Some(evicted) = self.queue.enqueue(envelope) {
            tracing::warn!(
                kind = %evicted.envelope.kind,
                id = %evicted.envelope.id,
                "queue full, dropping oldest message"
            );
            self.emit_lifecycle(
                lifecycle::QUEUE_OVERFLOW,
                serde_json::json!({
                    "dropped_id": evicted.envelope.id,
                    "dropped_type": evicted.envelope.kind,
                }),
            );
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "state transition");
            self.state = next;
        }
    }

    fn emit_lifecycle(&self, kind: &str, data: serde_json::Value) {
        self.dispatcher.emit(&Envelope::new(kind, data));
    }
}

async fn send_envelope(sink: &mut WsSink, envelope: &Envelope) -> anyhow::Result<()> {
    let json = serde_json::to_string(envelope)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
