//! Role-aware datagram link to the flight controller.
//!
//! A [`Link`] is created closed, opened once for a session, and closed when
//! the session ends. Its [`Role`] decides what it may do:
//!
//! | Role       | binds to          | send | receive |
//! |------------|-------------------|------|---------|
//! | `Sender`   | ephemeral port    | yes  | no      |
//! | `Receiver` | configured local  | no   | yes     |
//! | `Duplex`   | configured local  | yes  | yes     |
//!
//! Receives always take a timeout; there is no way to block forever.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::WirePacket;
use crate::trace::{debug, info, trace, warn};

use super::{Endpoint, Transport, UdpSocket};

/// What a link is used for, fixed when the link is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Send-only. The local side binds an ephemeral port.
    Sender { peer: Endpoint },
    /// Receive-only on a fixed local endpoint.
    Receiver { local: Endpoint },
    /// Send to `peer` and receive replies on `local`.
    Duplex { local: Endpoint, peer: Endpoint },
}

impl Role {
    /// Local endpoint the socket is bound to on open.
    #[must_use]
    pub const fn local(&self) -> Endpoint {
        match *self {
            Self::Sender { .. } => Endpoint::any(0),
            Self::Receiver { local } | Self::Duplex { local, .. } => local,
        }
    }

    /// Destination of sends, if this role sends at all.
    #[must_use]
    pub const fn peer(&self) -> Option<Endpoint> {
        match *self {
            Self::Sender { peer } | Self::Duplex { peer, .. } => Some(peer),
            Self::Receiver { .. } => None,
        }
    }

    #[must_use]
    pub const fn can_receive(&self) -> bool {
        matches!(self, Self::Receiver { .. } | Self::Duplex { .. })
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender { .. } => f.write_str("sender"),
            Self::Receiver { .. } => f.write_str("receiver"),
            Self::Duplex { .. } => f.write_str("duplex"),
        }
    }
}

/// Link operation, used to report role violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOp {
    Send,
    Receive,
}

impl fmt::Display for LinkOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => f.write_str("send"),
            Self::Receive => f.write_str("receive"),
        }
    }
}

/// Link failures.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Operation attempted before `open` (or after `close`).
    #[error("link not initialized")]
    NotInitialized,
    /// `open` called on a link that already holds a socket.
    #[error("link already open")]
    AlreadyOpen,
    /// The socket could not be created or bound.
    #[error("failed to open link: {0}")]
    OpenFailed(#[source] io::Error),
    /// The datagram could not be handed to the kernel.
    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),
    /// The socket reported an error while receiving.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),
    /// Nothing arrived before the receive timeout.
    #[error("receive timed out")]
    Timeout,
    /// The operation is not available for this link's role.
    #[error("cannot {op} on a {role} link")]
    WrongRole { op: LinkOp, role: Role },
}

impl LinkError {
    /// Whether the error is expected to clear on its own at the next attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::SendFailed(_) | Self::ReceiveFailed(_) | Self::Timeout
        )
    }
}

/// Tunables applied when a link is opened.
#[derive(Debug, Clone, Copy)]
pub struct LinkOptions {
    /// Longest a send may wait for kernel buffer space.
    pub send_timeout: Duration,
    /// Receive buffer length; longer datagrams are truncated.
    pub max_datagram: usize,
    /// Kernel receive buffer size (`SO_RCVBUF`), if it should be changed.
    pub recv_buffer_size: Option<usize>,
    /// Kernel send buffer size (`SO_SNDBUF`), if it should be changed.
    pub send_buffer_size: Option<usize>,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_millis(10),
            max_datagram: 1024,
            recv_buffer_size: None,
            send_buffer_size: None,
        }
    }
}

/// A datagram link owned by exactly one controller.
pub struct Link<T: Transport = UdpSocket> {
    role: Role,
    options: LinkOptions,
    socket: Option<T>,
    recv_buf: Vec<u8>,
}

impl<T: Transport> Link<T> {
    /// Creates a closed link for `role` with default options.
    #[must_use]
    pub fn new(role: Role) -> Self {
        Self::with_options(role, LinkOptions::default())
    }

    /// Creates a closed link for `role`.
    #[must_use]
    pub fn with_options(role: Role, options: LinkOptions) -> Self {
        Self {
            role,
            options,
            socket: None,
            recv_buf: Vec::new(),
        }
    }

    /// Opens the link with a caller-supplied transport constructor.
    ///
    /// `bind` receives the role's local endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyOpen`] if the link is open, or
    /// [`LinkError::OpenFailed`] if `bind` fails.
    pub fn open_with<F>(&mut self, bind: F) -> Result<(), LinkError>
    where
        F: FnOnce(Endpoint) -> io::Result<T>,
    {
        if self.socket.is_some() {
            return Err(LinkError::AlreadyOpen);
        }
        let local = self.role.local();
        let socket = bind(local).map_err(|e| {
            warn!(role = %self.role, local = %local, error = %e, "failed to open link");
            LinkError::OpenFailed(e)
        })?;
        let bound = socket.local_addr().unwrap_or(local);
        match self.role.peer() {
            Some(peer) => info!(role = %self.role, local = %bound, peer = %peer, "link open"),
            None => info!(role = %self.role, local = %bound, "link open"),
        }
        self.recv_buf = vec![0u8; self.options.max_datagram];
        self.socket = Some(socket);
        Ok(())
    }

    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Returns the bound local address.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::NotInitialized`] if the link is closed.
    pub fn local_addr(&self) -> Result<Endpoint, LinkError> {
        let socket = self.socket.as_ref().ok_or(LinkError::NotInitialized)?;
        socket.local_addr().map_err(LinkError::OpenFailed)
    }

    /// Sends `bytes` as one datagram to the role's peer.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotInitialized`] before `open` (no I/O is attempted),
    /// [`LinkError::WrongRole`] on a receiver link, and
    /// [`LinkError::SendFailed`] when the kernel rejects the datagram.
    pub fn send(&mut self, bytes: &[u8]) -> Result<usize, LinkError> {
        let socket = self.socket.as_mut().ok_or(LinkError::NotInitialized)?;
        let peer = self.role.peer().ok_or(LinkError::WrongRole {
            op: LinkOp::Send,
            role: self.role,
        })?;
        match socket.send_to(bytes, peer, self.options.send_timeout) {
            Ok(n) => {
                debug!(peer = %peer, len = n, "sent datagram");
                Ok(n)
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "send failed");
                Err(LinkError::SendFailed(e))
            }
        }
    }

    /// Sends an encoded command packet.
    ///
    /// # Errors
    ///
    /// Same as [`Link::send`].
    pub fn send_packet(&mut self, packet: &WirePacket) -> Result<usize, LinkError> {
        self.send(packet.as_bytes())
    }

    /// Receives one datagram, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// [`LinkError::NotInitialized`] before `open`, [`LinkError::WrongRole`]
    /// on a sender link, [`LinkError::Timeout`] when nothing arrived, and
    /// [`LinkError::ReceiveFailed`] on socket errors.
    pub fn receive(&mut self, timeout: Duration) -> Result<(Vec<u8>, Endpoint), LinkError> {
        let socket = self.socket.as_mut().ok_or(LinkError::NotInitialized)?;
        if !self.role.can_receive() {
            return Err(LinkError::WrongRole {
                op: LinkOp::Receive,
                role: self.role,
            });
        }
        match socket.recv_from(&mut self.recv_buf, timeout) {
            Ok(Some((n, from))) => {
                debug!(from = %from, len = n, "received datagram");
                Ok((self.recv_buf[..n].to_vec(), from))
            }
            Ok(None) => {
                trace!(timeout_ms = timeout.as_millis() as u64, "receive timed out");
                Err(LinkError::Timeout)
            }
            Err(e) => {
                warn!(error = %e, "receive failed");
                Err(LinkError::ReceiveFailed(e))
            }
        }
    }

    /// Releases the socket. Safe to call repeatedly and on a never-opened link.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            info!(role = %self.role, "link closed");
        }
    }
}

impl Link<UdpSocket> {
    /// Opens the link on a real UDP socket, applying buffer-size options.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::AlreadyOpen`] or [`LinkError::OpenFailed`].
    pub fn open(&mut self) -> Result<(), LinkError> {
        let options = self.options;
        self.open_with(|local| {
            let socket = UdpSocket::bind(local)?;
            if let Some(size) = options.recv_buffer_size {
                socket.set_recv_buffer_size(size)?;
            }
            if let Some(size) = options.send_buffer_size {
                socket.set_send_buffer_size(size)?;
            }
            Ok(socket)
        })
    }

    /// Creates and opens a UDP link in one step.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::OpenFailed`] if the socket cannot be bound.
    pub fn open_udp(role: Role, options: LinkOptions) -> Result<Self, LinkError> {
        let mut link = Self::with_options(role, options);
        link.open()?;
        Ok(link)
    }
}

impl<T: Transport> Drop for Link<T> {
    fn drop(&mut self) {
        self.close();
    }
}
