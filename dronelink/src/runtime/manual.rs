//! Keyboard-driven flight.
//!
//! Key presses arrive over a channel and are applied to the controller's own
//! [`ControlState`]. Every change is sent at once; between presses the current
//! setpoint is re-sent each keepalive period so the flight controller keeps
//! receiving commands. Dropping every sender of the channel stops the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};

use crate::control::{ControlState, Key};
use crate::net::{Link, LinkError, Transport};
use crate::protocol::encode;
use crate::trace::{debug, info};

use super::commander::Commander;
use super::health::LinkHealth;
use super::ticker::Ticker;

/// Manual loop tunables.
#[derive(Debug, Clone, Copy)]
pub struct ManualConfig {
    /// Re-send interval while no key is pressed.
    pub keepalive: Duration,
    /// How long to wait for a reply after each send on a duplex link.
    pub ack_timeout: Duration,
    /// Send a motor cutoff before closing the link.
    pub cutoff_on_stop: bool,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(20),
            cutoff_on_stop: true,
        }
    }
}

/// Applies operator keys and sends the resulting setpoints.
pub struct ManualController<T: Transport> {
    commander: Commander<T>,
    state: ControlState,
    keys: Receiver<Key>,
    config: ManualConfig,
    shutdown_flag: Arc<AtomicBool>,
}

impl<T: Transport> ManualController<T> {
    /// Starts from [`ControlState::neutral`]. `link` must already be open.
    #[must_use]
    pub fn new(
        link: Link<T>,
        health: LinkHealth,
        keys: Receiver<Key>,
        config: ManualConfig,
        shutdown_flag: Arc<AtomicBool>,
    ) -> Self {
        Self {
            commander: Commander::new(link, health),
            state: ControlState::neutral(),
            keys,
            config,
            shutdown_flag,
        }
    }

    /// Runs until shutdown or until the key channel closes.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient link error.
    pub fn run(self) -> Result<(), LinkError> {
        let Self {
            mut commander,
            mut state,
            keys,
            config,
            shutdown_flag,
        } = self;

        let ack_timeout = config.ack_timeout.min(config.keepalive);
        let mut ticker = Ticker::new(config.keepalive);
        info!("manual: starting at {state}");

        // announce the starting setpoint before any key is read
        let mut result = Ok(());
        if !shutdown_flag.load(Ordering::Relaxed) {
            ticker.advance();
            result = commander
                .transmit(&encode(&state))
                .and_then(|()| commander.poll_reply(ack_timeout));
        }

        while result.is_ok() {
            if shutdown_flag.load(Ordering::Relaxed) {
                break;
            }
            let next = if ticker.is_scheduled() {
                keys.recv_timeout(ticker.remaining())
            } else {
                // keepalive too long to schedule, wait for keys only
                keys.recv().map_err(|_| RecvTimeoutError::Disconnected)
            };
            match next {
                Ok(key) => {
                    state = key.apply(state);
                    info!("{key} -> {state}");
                }
                Err(RecvTimeoutError::Timeout) => {
                    ticker.advance();
                    debug!("keepalive {state}");
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("manual: input closed");
                    break;
                }
            }
            result = commander
                .transmit(&encode(&state))
                .and_then(|()| commander.poll_reply(ack_timeout));
        }

        commander.finish(config.cutoff_on_stop);
        info!(final_state = %state, "manual stopped");
        result
    }
}
