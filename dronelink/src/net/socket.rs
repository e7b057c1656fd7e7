//! Datagram transport for the command link.
//!
//! [`Transport`] is the seam the [`Link`](super::Link) talks to. The
//! production implementation is [`UdpSocket`], a non-blocking mio socket
//! that owns a private [`Poll`] so every send and receive can wait for
//! readiness with a hard deadline instead of blocking indefinitely.

use std::io::{self, ErrorKind};
use std::os::fd::AsFd;
use std::time::Duration;

use minstant::Instant;
use mio::net::UdpSocket as MioUdpSocket;
use mio::{Events, Interest, Poll, Token};

use super::Endpoint;
use crate::clock::deadline_after;

const SOCKET: Token = Token(0);

/// Readiness events buffered per poll. One socket is registered, so a handful is plenty.
const EVENT_CAPACITY: usize = 8;

/// A datagram socket with bounded blocking operations.
///
/// Implemented by [`UdpSocket`] and by in-memory fakes in tests.
pub trait Transport: Send {
    /// Returns the local address the transport is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be retrieved.
    fn local_addr(&self) -> io::Result<Endpoint>;

    /// Sends one datagram to `dest`, waiting at most `timeout` for buffer space.
    ///
    /// # Errors
    ///
    /// Returns `TimedOut` if the socket never became writable, or the
    /// underlying I/O error.
    fn send_to(&mut self, buf: &[u8], dest: Endpoint, timeout: Duration) -> io::Result<usize>;

    /// Receives one datagram, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when the timeout elapsed with no datagram.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, Endpoint)>>;
}

/// A non-blocking UDP socket with its own readiness poller.
pub struct UdpSocket {
    inner: MioUdpSocket,
    poll: Poll,
    events: Events,
}

impl UdpSocket {
    /// Creates a new UDP socket bound to the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound (e.g., address in use)
    /// or the poller cannot be created.
    pub fn bind(endpoint: Endpoint) -> io::Result<Self> {
        let mut inner = MioUdpSocket::bind(endpoint.into())?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut inner, SOCKET, Interest::READABLE | Interest::WRITABLE)?;
        Ok(Self {
            inner,
            poll,
            events: Events::with_capacity(EVENT_CAPACITY),
        })
    }

    /// Attempts to send, returning `Ok(None)` instead of `WouldBlock`.
    pub fn try_send_to(&self, buf: &[u8], dest: Endpoint) -> io::Result<Option<usize>> {
        match self.inner.send_to(buf, dest.into()) {
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Attempts to receive, returning `Ok(None)` instead of `WouldBlock`.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Endpoint)>> {
        match self.inner.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, Endpoint::from(addr)))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Waits until the socket reports `interest` or `deadline` passes.
    ///
    /// Returns `false` on deadline; `None` waits without one. The socket is
    /// edge-triggered, so callers must have drained it (seen `WouldBlock`)
    /// before waiting.
    fn wait_ready(&mut self, interest: Interest, deadline: Option<Instant>) -> io::Result<bool> {
        loop {
            let timeout = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
            let ready = self.events.iter().any(|event| {
                event.token() == SOCKET
                    && ((interest.is_readable() && event.is_readable())
                        || (interest.is_writable() && event.is_writable()))
            });
            if ready {
                return Ok(true);
            }
        }
    }

    /// Sets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_send_buffer_size(&self, size: usize) -> io::Result<()> {
        // mio doesn't expose socket options
        rustix::net::sockopt::set_socket_send_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }

    /// Sets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be set.
    pub fn set_recv_buffer_size(&self, size: usize) -> io::Result<()> {
        rustix::net::sockopt::set_socket_recv_buffer_size(self.inner.as_fd(), size)?;
        Ok(())
    }

    /// Gets the socket's send buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn send_buffer_size(&self) -> io::Result<usize> {
        Ok(rustix::net::sockopt::socket_send_buffer_size(
            self.inner.as_fd(),
        )?)
    }

    /// Gets the socket's receive buffer size.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be retrieved.
    pub fn recv_buffer_size(&self) -> io::Result<usize> {
        Ok(rustix::net::sockopt::socket_recv_buffer_size(
            self.inner.as_fd(),
        )?)
    }
}

impl Transport for UdpSocket {
    fn local_addr(&self) -> io::Result<Endpoint> {
        self.inner.local_addr().map(Endpoint::from)
    }

    fn send_to(&mut self, buf: &[u8], dest: Endpoint, timeout: Duration) -> io::Result<usize> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            if let Some(n) = self.try_send_to(buf, dest)? {
                return Ok(n);
            }
            if !self.wait_ready(Interest::WRITABLE, deadline)? {
                return Err(io::Error::new(
                    ErrorKind::TimedOut,
                    "socket not writable before deadline",
                ));
            }
        }
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, Endpoint)>> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            if let Some(received) = self.try_recv_from(buf)? {
                return Ok(Some(received));
            }
            if !self.wait_ready(Interest::READABLE, deadline)? {
                return Ok(None);
            }
        }
    }
}
