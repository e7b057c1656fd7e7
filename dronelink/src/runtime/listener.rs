//! Receive-only monitor.
//!
//! Waits on a receiver link for datagrams and logs each one. Quiet periods
//! and socket errors back off exponentially (bounded, jittered) so a dead
//! peer does not turn into a tight poll loop; the backoff resets on the next
//! datagram.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use minstant::Instant;

use crate::net::{Link, LinkError, Transport};
use crate::protocol::classify;
use crate::trace::{debug, info, warn};

use super::backoff::Backoff;
use super::health::LinkHealth;

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Bound on each receive call.
    pub receive_timeout: Duration,
    /// Pause schedule after a timeout or receive error.
    pub backoff: Backoff,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            receive_timeout: Duration::from_millis(100),
            backoff: Backoff::new(Duration::from_millis(50), Duration::from_secs(1)),
        }
    }
}

pub struct Listener<T: Transport> {
    link: Link<T>,
    health: LinkHealth,
    config: ListenerConfig,
    shutdown_flag: Arc<AtomicBool>,
}

impl<T: Transport> Listener<T> {
    #[must_use]
    pub fn new(
        link: Link<T>,
        health: LinkHealth,
        config: ListenerConfig,
        shutdown_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            link,
            health,
            config,
            shutdown_flag,
        }
    }

    /// Receives until shutdown, then closes the link.
    ///
    /// # Errors
    ///
    /// Returns non-transient link errors, e.g. [`LinkError::WrongRole`] on a
    /// sender link.
    pub fn run(mut self) -> Result<(), LinkError> {
        let mut backoff = self.config.backoff.clone();
        info!(
            timeout_ms = self.config.receive_timeout.as_millis() as u64,
            "listening"
        );

        let result = loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                break Ok(());
            }
            match self.link.receive(self.config.receive_timeout) {
                Ok((bytes, from)) => {
                    self.health.record_received();
                    backoff.reset();
                    info!(from = %from, "{}", classify(&bytes));
                    continue;
                }
                Err(LinkError::Timeout) => self.health.record_timeout(),
                Err(e) if e.is_transient() => self.health.record_receive_failure(),
                Err(e) => break Err(e),
            }
            let delay = backoff.next_delay();
            debug!(
                delay_ms = delay.as_millis() as u64,
                attempt = backoff.attempt(),
                "nothing received, backing off"
            );
            self.pause(delay);
        };

        if let Err(e) = &result {
            warn!(error = %e, "listener stopped on error");
        }
        self.link.close();
        info!(stats = %self.health.stats().snapshot(), "listener stopped");
        result
    }

    /// Sleeps for `delay` in short slices, returning early on shutdown.
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}
