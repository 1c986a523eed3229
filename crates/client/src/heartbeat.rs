//! Heartbeat monitor: periodic liveness pings with a pong deadline.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// What the session loop should do next for liveness.
#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Interval elapsed: send a ping and [`arm`](HeartbeatMonitor::arm)
    /// the pong deadline.
    SendPing,
    /// No matching pong arrived in time; the connection is dead.
    Timeout,
}

struct PendingPing {
    id: String,
    deadline: Instant,
}

/// Tracks the ping cadence and the outstanding pong deadline for one
/// session.
///
/// The monitor is owned by the session scope, so leaving the ready state
/// for any reason drops it and disarms the pending deadline with it — a
/// stale timer can never force a second, redundant close.
pub struct HeartbeatMonitor {
    interval: Interval,
    timeout: Duration,
    pending: Option<PendingPing>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        // First ping one full interval after ready, not immediately.
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval: ticker,
            timeout,
            pending: None,
        }
    }

    /// Resolves on the next liveness event. When both a tick and the pong
    /// deadline are due, the timeout wins.
    pub async fn event(&mut self) -> HeartbeatEvent {
        match self.pending.as_ref().map(|p| p.deadline) {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = time::sleep_until(deadline) => {
                        self.pending = None;
                        HeartbeatEvent::Timeout
                    }
                    _ = self.interval.tick() => HeartbeatEvent::SendPing,
                }
            }
            None => {
                self.interval.tick().await;
                HeartbeatEvent::SendPing
            }
        }
    }

    /// Arm the pong deadline for a ping that was just sent.
    pub fn arm(&mut self, ping_id: impl Into<String>) {
        self.pending = Some(PendingPing {
            id: ping_id.into(),
            deadline: Instant::now() + self.timeout,
        });
    }

    /// Cancel the deadline if `id` matches the outstanding ping. Returns
    /// whether this pong was the one being waited for.
    pub fn on_pong(&mut self, id: &str) -> bool {
        match &self.pending {
            Some(p) if p.id == id => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    /// Whether a ping is outstanding.
    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(30);
    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test(start_paused = true)]
    async fn first_ping_after_one_interval() {
        let mut hb = HeartbeatMonitor::new(INTERVAL, TIMEOUT);
        let started = Instant::now();
        assert_eq!(hb.event().await, HeartbeatEvent::SendPing);
        assert!(Instant::now() - started >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_without_pong() {
        let mut hb = HeartbeatMonitor::new(INTERVAL, TIMEOUT);
        assert_eq!(hb.event().await, HeartbeatEvent::SendPing);
        hb.arm("ping-1");
        // Deadline (5 s) is closer than the next tick (30 s).
        let armed_at = Instant::now();
        assert_eq!(hb.event().await, HeartbeatEvent::Timeout);
        assert!(Instant::now() - armed_at >= TIMEOUT);
        assert!(!hb.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn matching_pong_cancels_deadline() {
        let mut hb = HeartbeatMonitor::new(INTERVAL, TIMEOUT);
        hb.event().await;
        hb.arm("ping-1");
        assert!(hb.on_pong("ping-1"));
        assert!(!hb.is_armed());
        // Next event is the following ping, not a timeout.
        assert_eq!(hb.event().await, HeartbeatEvent::SendPing);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_pong_keeps_deadline() {
        let mut hb = HeartbeatMonitor::new(INTERVAL, TIMEOUT);
        hb.event().await;
        hb.arm("ping-1");
        assert!(!hb.on_pong("something-else"));
        assert!(hb.is_armed());
        assert_eq!(hb.event().await, HeartbeatEvent::Timeout);
    }
}
