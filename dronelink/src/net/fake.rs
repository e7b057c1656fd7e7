//! In-memory transport for tests that must not touch the network.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Endpoint, Transport};

/// Shared view of everything a [`FakeTransport`] did.
///
/// Clone it before handing the transport to a link, then inspect it from the test.
#[derive(Clone, Default)]
pub(crate) struct FakeWire {
    binds: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<(Vec<u8>, Endpoint)>>>,
    inbound: Arc<Mutex<VecDeque<(Vec<u8>, Endpoint)>>>,
    fail_sends: Arc<AtomicBool>,
    send_calls: Arc<AtomicUsize>,
    recv_calls: Arc<AtomicUsize>,
}

impl FakeWire {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Bind function for [`Link::open_with`](super::Link::open_with).
    pub(crate) fn bind(&self, local: Endpoint) -> io::Result<FakeTransport> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTransport {
            local,
            wire: self.clone(),
        })
    }

    pub(crate) fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<(Vec<u8>, Endpoint)> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn sent_payloads(&self) -> Vec<Vec<u8>> {
        self.sent().into_iter().map(|(bytes, _)| bytes).collect()
    }

    /// Every `send_to`, including failed ones.
    pub(crate) fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn recv_calls(&self) -> usize {
        self.recv_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn push_inbound(&self, bytes: &[u8], from: Endpoint) {
        self.inbound
            .lock()
            .unwrap()
            .push_back((bytes.to_vec(), from));
    }

    pub(crate) fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

pub(crate) struct FakeTransport {
    local: Endpoint,
    wire: FakeWire,
}

impl Transport for FakeTransport {
    fn local_addr(&self) -> io::Result<Endpoint> {
        Ok(self.local)
    }

    fn send_to(&mut self, buf: &[u8], dest: Endpoint, _timeout: Duration) -> io::Result<usize> {
        self.wire.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.wire.fail_sends.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::NetworkUnreachable,
                "fake network down",
            ));
        }
        self.wire.sent.lock().unwrap().push((buf.to_vec(), dest));
        Ok(buf.len())
    }

    fn recv_from(
        &mut self,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> io::Result<Option<(usize, Endpoint)>> {
        self.wire.recv_calls.fetch_add(1, Ordering::SeqCst);
        let Some((bytes, from)) = self.wire.inbound.lock().unwrap().pop_front() else {
            return Ok(None);
        };
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(Some((n, from)))
    }
}
