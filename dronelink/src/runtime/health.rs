//! Link health accounting.
//!
//! Steady-state sends are fire-and-forget: a lost or rejected packet is
//! replaced by the next tick. Failures are still counted, and a run of
//! consecutive send failures reaching the threshold marks the link degraded
//! until a send succeeds again.
//!
//! The controller thread is the only writer ([`LinkHealth`]). Anyone holding
//! the shared [`LinkStats`] can read. Degraded and recovered transitions are
//! also published as [`HealthEvent`]s to subscribers.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use flume::{Receiver, Sender, TrySendError};

use crate::trace::{debug, error, info};

/// Consecutive send failures after which the link is reported degraded.
pub const DEFAULT_DEGRADED_THRESHOLD: u32 = 10;

/// Unread events kept per subscriber before new ones are dropped.
const EVENT_BACKLOG: usize = 16;

/// Counters shared between the controller thread and observers.
#[derive(Debug, Default)]
pub struct LinkStats {
    sent: AtomicU64,
    send_failures: AtomicU64,
    received: AtomicU64,
    timeouts: AtomicU64,
    receive_failures: AtomicU64,
    consecutive_failures: AtomicU32,
    degraded: AtomicBool,
}

impl LinkStats {
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Point-in-time copy of every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent(),
            send_failures: self.send_failures(),
            received: self.received(),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
        }
    }
}

/// Copy of [`LinkStats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub sent: u64,
    pub send_failures: u64,
    pub received: u64,
    pub timeouts: u64,
    pub receive_failures: u64,
    pub consecutive_failures: u32,
    pub degraded: bool,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent={} send_failures={} received={} timeouts={} receive_failures={}{}",
            self.sent,
            self.send_failures,
            self.received,
            self.timeouts,
            self.receive_failures,
            if self.degraded { " DEGRADED" } else { "" }
        )
    }
}

/// A change in link condition worth surfacing beyond a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    /// Consecutive send failures reached the threshold.
    Degraded { consecutive: u32 },
    /// A send succeeded after the link was degraded.
    Recovered { after: u32 },
}

/// Writer side of the link counters, owned by the controller thread.
#[derive(Debug)]
pub struct LinkHealth {
    stats: Arc<LinkStats>,
    threshold: u32,
    events: Option<Sender<HealthEvent>>,
}

impl LinkHealth {
    /// Creates fresh counters. A `threshold` of 0 is treated as 1.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            stats: Arc::new(LinkStats::default()),
            threshold: threshold.max(1),
            events: None,
        }
    }

    /// Returns a receiver for degraded and recovered transitions.
    ///
    /// Every call replaces the previous channel. A subscriber that falls
    /// behind loses new events, never blocks the controller.
    pub fn subscribe(&mut self) -> Receiver<HealthEvent> {
        let (tx, rx) = flume::bounded(EVENT_BACKLOG);
        self.events = Some(tx);
        rx
    }

    /// Read handle for observers.
    #[must_use]
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    pub fn record_send_ok(&self) -> Option<HealthEvent> {
        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        let after = self.stats.consecutive_failures.swap(0, Ordering::Relaxed);
        if self.stats.degraded.swap(false, Ordering::AcqRel) {
            info!(failures = after, "link recovered");
            self.publish(HealthEvent::Recovered { after })
        } else {
            None
        }
    }

    pub fn record_send_failure(&self) -> Option<HealthEvent> {
        self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
        let consecutive = self
            .stats
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        if consecutive >= self.threshold && !self.stats.degraded.swap(true, Ordering::AcqRel) {
            error!(consecutive, threshold = self.threshold, "link degraded");
            self.publish(HealthEvent::Degraded { consecutive })
        } else {
            None
        }
    }

    pub fn record_received(&self) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_failure(&self) {
        self.stats.receive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn publish(&self, event: HealthEvent) -> Option<HealthEvent> {
        if let Some(events) = &self.events {
            match events.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(_)) => debug!(?event, "health event dropped, backlog full"),
            }
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degrades_once_at_threshold_and_recovers_on_success() {
        let health = LinkHealth::new(3);
        let stats = health.stats();

        assert_eq!(health.record_send_failure(), None);
        assert_eq!(health.record_send_failure(), None);
        assert_eq!(
            health.record_send_failure(),
            Some(HealthEvent::Degraded { consecutive: 3 })
        );
        assert!(stats.is_degraded());

        // stays degraded without repeating the event
        assert_eq!(health.record_send_failure(), None);

        assert_eq!(
            health.record_send_ok(),
            Some(HealthEvent::Recovered { after: 4 })
        );
        assert!(!stats.is_degraded());
        assert_eq!(health.record_send_ok(), None);

        let snap = stats.snapshot();
        assert_eq!(snap.sent, 2);
        assert_eq!(snap.send_failures, 4);
        assert_eq!(snap.consecutive_failures, 0);
    }

    #[test]
    fn intermittent_failures_never_degrade() {
        let health = LinkHealth::new(3);
        for _ in 0..10 {
            assert_eq!(health.record_send_failure(), None);
            assert_eq!(health.record_send_failure(), None);
            assert_eq!(health.record_send_ok(), None);
        }
        assert!(!health.stats().is_degraded());
    }

    #[test]
    fn subscribers_see_each_transition_once() {
        let mut health = LinkHealth::new(2);
        let events = health.subscribe();

        for _ in 0..5 {
            health.record_send_failure();
        }
        health.record_send_ok();
        health.record_send_ok();

        let seen: Vec<_> = events.try_iter().collect();
        assert_eq!(
            seen,
            [
                HealthEvent::Degraded { consecutive: 2 },
                HealthEvent::Recovered { after: 5 },
            ]
        );
    }

    #[test]
    fn slow_or_gone_subscriber_never_blocks() {
        let mut health = LinkHealth::new(1);
        let events = health.subscribe();
        for _ in 0..EVENT_BACKLOG + 4 {
            health.record_send_failure();
            health.record_send_ok();
        }
        assert_eq!(events.len(), EVENT_BACKLOG);

        drop(events);
        assert_eq!(
            health.record_send_failure(),
            Some(HealthEvent::Degraded { consecutive: 1 })
        );
    }

    #[test]
    fn receive_counters() {
        let health = LinkHealth::new(DEFAULT_DEGRADED_THRESHOLD);
        health.record_received();
        health.record_timeout();
        health.record_timeout();
        health.record_receive_failure();

        let snap = health.stats().snapshot();
        assert_eq!((snap.received, snap.timeouts, snap.receive_failures), (1, 2, 1));
        assert_eq!(
            snap.to_string(),
            "sent=0 send_failures=0 received=1 timeouts=2 receive_failures=1"
        );
    }
}
