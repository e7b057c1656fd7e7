//! Autonomous hover policy.
//!
//! Holds a constant hover setpoint and re-sends it every period until the
//! shutdown flag is raised. Manual input is never consulted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::control::ControlState;
use crate::net::{Link, LinkError, Transport};
use crate::protocol::encode;
use crate::trace::{debug, info};

use super::commander::Commander;
use super::health::LinkHealth;
use super::ticker::Ticker;

/// Hover loop tunables.
#[derive(Debug, Clone, Copy)]
pub struct HoverConfig {
    /// Time between two setpoints.
    pub period: Duration,
    /// How long to wait for a reply after each send on a duplex link.
    pub ack_timeout: Duration,
    /// Send a motor cutoff before closing the link.
    pub cutoff_on_stop: bool,
}

impl Default for HoverConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(20),
            cutoff_on_stop: true,
        }
    }
}

/// Sends the hover setpoint on a fixed period.
pub struct HoverController<T: Transport> {
    commander: Commander<T>,
    state: ControlState,
    config: HoverConfig,
    shutdown_flag: Arc<AtomicBool>,
}

impl<T: Transport> HoverController<T> {
    /// `link` must already be open.
    #[must_use]
    pub fn new(
        link: Link<T>,
        health: LinkHealth,
        config: HoverConfig,
        shutdown_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commander: Commander::new(link, health),
            state: ControlState::hover(),
            config,
            shutdown_flag,
        }
    }

    /// Runs until shutdown, then sends the cutoff (if configured) and closes
    /// the link.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient link error, e.g.
    /// [`LinkError::NotInitialized`] if the link was never opened.
    pub fn run(self) -> Result<(), LinkError> {
        let Self {
            mut commander,
            state,
            config,
            shutdown_flag,
        } = self;

        // the setpoint never changes, encode it once
        let packet = encode(&state);
        let ack_timeout = config.ack_timeout.min(config.period);
        let mut ticker = Ticker::new(config.period);
        info!(
            period_ms = config.period.as_millis() as u64,
            "hover: holding {state}"
        );

        let result = loop {
            let tick = ticker.wait();
            if shutdown_flag.load(Ordering::Relaxed) {
                break Ok(());
            }
            if let Err(e) = commander
                .transmit(&packet)
                .and_then(|()| commander.poll_reply(ack_timeout))
            {
                break Err(e);
            }
            debug!(tick, "hover setpoint sent");
        };

        if ticker.skipped() > 0 {
            debug!(skipped = ticker.skipped(), "hover: ticks skipped on overrun");
        }
        commander.finish(config.cutoff_on_stop);
        info!(ticks = ticker.ticks(), "hover stopped");
        result
    }
}
