//! Command uplink shared by the hover and manual controllers.
//!
//! Wraps the session's [`Link`] together with its [`LinkHealth`] and applies
//! the steady-state error policy: transient failures are counted and
//! swallowed, anything else is handed back to the controller as fatal.

use std::time::Duration;

use crate::control::ControlState;
use crate::net::{Link, LinkError, Transport};
use crate::protocol::{WirePacket, classify, encode};
use crate::trace::{debug, info, warn};

use super::health::LinkHealth;

pub(crate) struct Commander<T: Transport> {
    link: Link<T>,
    health: LinkHealth,
}

impl<T: Transport> Commander<T> {
    pub(crate) fn new(link: Link<T>, health: LinkHealth) -> Self {
        Self { link, health }
    }

    /// Sends one packet. Transient send failures are counted and reported
    /// as success so the loop moves on to the next tick. Degraded and
    /// recovered transitions reach the session through [`LinkHealth`].
    pub(crate) fn transmit(&mut self, packet: &WirePacket) -> Result<(), LinkError> {
        match self.link.send_packet(packet) {
            Ok(_) => {
                self.health.record_send_ok();
                Ok(())
            }
            Err(e) if e.is_transient() => {
                self.health.record_send_failure();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Waits up to `timeout` for a reply on links that can receive, and logs
    /// what arrived. A sender link returns immediately.
    pub(crate) fn poll_reply(&mut self, timeout: Duration) -> Result<(), LinkError> {
        if !self.link.role().can_receive() || timeout.is_zero() {
            return Ok(());
        }
        match self.link.receive(timeout) {
            Ok((bytes, from)) => {
                self.health.record_received();
                info!(from = %from, "reply: {}", classify(&bytes));
                Ok(())
            }
            Err(LinkError::Timeout) => {
                self.health.record_timeout();
                Ok(())
            }
            Err(e) if e.is_transient() => {
                self.health.record_receive_failure();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Sends the motor cutoff if asked to, then closes the link.
    pub(crate) fn finish(mut self, cutoff: bool) {
        if cutoff && self.link.is_open() {
            let packet = encode(&ControlState::neutral());
            match self.link.send_packet(&packet) {
                Ok(_) => debug!("cutoff sent"),
                Err(e) => warn!(error = %e, "cutoff not sent"),
            }
        }
        self.link.close();
    }
}
