//! Flight session: one link, one controller, one thread.
//!
//! [`Session::spawn`] opens the link on the caller's thread, so a bad bind
//! address fails startup instead of a background thread. The opened link and
//! the controller's [`ControlState`](crate::control::ControlState) are then
//! moved into a dedicated thread. Nothing outside that thread can reach
//! either one: manual keys travel over a bounded channel, and the handle
//! only exposes read-only stats and the shutdown flag.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::control::Key;
use crate::net::{Endpoint, EndpointParseError, Link, LinkError, LinkOptions, Role, Transport};
use crate::trace::{debug, error, info};

use super::backoff::Backoff;
use super::health::{DEFAULT_DEGRADED_THRESHOLD, HealthEvent, LinkHealth, LinkStats};
use super::hover::{HoverConfig, HoverController};
use super::listener::{Listener, ListenerConfig};
use super::manual::{ManualConfig, ManualController};

/// Flight controller address of the reference deployment.
pub const DEFAULT_PEER: Endpoint = Endpoint::new_v4(192, 168, 43, 42, 2390);

/// Local port commands are sent from and replies arrive on.
pub const DEFAULT_LOCAL_PORT: u16 = 2399;

/// Longest accepted period. Bounds how long a stop request can wait.
pub const MAX_PERIOD: Duration = Duration::from_secs(60);

/// Environment variable overriding the peer (`udp://ip:port` or `ip:port`).
pub const PEER_ENV: &str = "DRONELINK_PEER";

/// Reads the peer override from [`PEER_ENV`].
///
/// # Errors
///
/// Returns an error if the variable is set but is not a valid endpoint.
pub fn peer_from_env() -> Result<Option<Endpoint>, EndpointParseError> {
    match std::env::var(PEER_ENV) {
        Ok(value) if !value.trim().is_empty() => value.trim().parse().map(Some),
        _ => Ok(None),
    }
}

/// Which controller drives the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Operator keys.
    Manual,
    /// Constant hover setpoint.
    Hover,
    /// Receive and log only.
    Listen,
}

impl Mode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Hover => "hover",
            Self::Listen => "listen",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown mode {0:?}, expected manual, hover or listen")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "hover" => Ok(Self::Hover),
            "listen" => Ok(Self::Listen),
            other => Err(UnknownMode(other.to_owned())),
        }
    }
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub mode: Mode,
    pub role: Role,
    /// Send period for hover, keepalive period for manual, receive timeout
    /// for listen.
    pub period: Duration,
    /// Reply wait after each send on a duplex link.
    pub ack_timeout: Duration,
    /// Consecutive send failures before the link is reported degraded.
    pub degraded_threshold: u32,
    /// Send a motor cutoff on stop.
    pub cutoff_on_stop: bool,
    /// Pending manual keys before presses are rejected.
    pub input_capacity: usize,
    pub link: LinkOptions,
    /// Listener pause schedule.
    pub backoff: Backoff,
}

impl SessionConfig {
    /// Defaults for `mode`: listen binds the local command port as a
    /// receiver, the flying modes talk duplex to [`DEFAULT_PEER`].
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        let local = Endpoint::any(DEFAULT_LOCAL_PORT);
        let role = match mode {
            Mode::Listen => Role::Receiver { local },
            Mode::Manual | Mode::Hover => Role::Duplex {
                local,
                peer: DEFAULT_PEER,
            },
        };
        Self {
            mode,
            role,
            period: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(20),
            degraded_threshold: DEFAULT_DEGRADED_THRESHOLD,
            cutoff_on_stop: true,
            input_capacity: 64,
            link: LinkOptions::default(),
            backoff: Backoff::default(),
        }
    }

    /// Checks the settings are usable together.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |msg: String| Err(SessionError::InvalidConfig(msg));
        if self.period.is_zero() {
            return invalid("period must be > 0".into());
        }
        if self.period > MAX_PERIOD {
            return invalid(format!(
                "period ({:?}) must be at most {MAX_PERIOD:?}",
                self.period
            ));
        }
        // listen mode never waits for replies
        if self.mode != Mode::Listen && self.ack_timeout >= self.period {
            return invalid(format!(
                "ack timeout ({:?}) must be shorter than the period ({:?})",
                self.ack_timeout, self.period
            ));
        }
        if self.input_capacity == 0 {
            return invalid("input capacity must be > 0".into());
        }
        if self.link.max_datagram == 0 {
            return invalid("max datagram size must be > 0".into());
        }
        match (self.mode, self.role) {
            (Mode::Listen, role) if !role.can_receive() => {
                invalid(format!("{} mode needs a receiving link, got {role}", self.mode))
            }
            (Mode::Manual | Mode::Hover, role) if role.peer().is_none() => {
                invalid(format!("{} mode needs a peer, got a {role} link", self.mode))
            }
            _ => Ok(()),
        }
    }

    fn hover(&self) -> HoverConfig {
        HoverConfig {
            period: self.period,
            ack_timeout: self.ack_timeout,
            cutoff_on_stop: self.cutoff_on_stop,
        }
    }

    fn manual(&self) -> ManualConfig {
        ManualConfig {
            keepalive: self.period,
            ack_timeout: self.ack_timeout,
            cutoff_on_stop: self.cutoff_on_stop,
        }
    }

    fn listener(&self) -> ListenerConfig {
        ListenerConfig {
            receive_timeout: self.period,
            backoff: self.backoff.clone(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Mode::Hover)
    }
}

/// Whether the network is up (e.g. Wi-Fi associated) before a session starts.
pub trait NetworkStatus {
    fn is_network_ready(&self) -> bool;
}

/// Reports the network as always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl NetworkStatus for AlwaysReady {
    fn is_network_ready(&self) -> bool {
        true
    }
}

impl<F: Fn() -> bool> NetworkStatus for F {
    fn is_network_ready(&self) -> bool {
        self()
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("network not ready")]
    NetworkNotReady,
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
    /// The link could not be opened.
    #[error(transparent)]
    Open(LinkError),
    /// The controller stopped on a non-transient link error.
    #[error("controller failed: {0}")]
    Controller(#[source] LinkError),
    #[error("failed to spawn controller thread: {0}")]
    Spawn(#[source] io::Error),
    #[error("controller thread panicked")]
    Panicked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    /// The manual controller has stopped.
    #[error("manual controller is not running")]
    Closed,
    /// Too many presses are queued.
    #[error("input queue full")]
    Full,
}

/// Sending half of the manual key channel.
#[derive(Debug, Clone)]
pub struct KeyInput {
    tx: Sender<Key>,
}

impl KeyInput {
    /// Queues the key bound to `c`. Returns `Ok(false)` for unbound keys,
    /// which are dropped.
    ///
    /// # Errors
    ///
    /// See [`KeyInput::send`].
    pub fn press(&self, c: char) -> Result<bool, InputError> {
        match Key::from_char(c) {
            Some(key) => self.send(key).map(|()| true),
            None => Ok(false),
        }
    }

    /// Queues `key` without blocking.
    ///
    /// # Errors
    ///
    /// [`InputError::Full`] when the queue is at capacity and
    /// [`InputError::Closed`] once the controller has stopped.
    pub fn send(&self, key: Key) -> Result<(), InputError> {
        self.tx.try_send(key).map_err(|e| match e {
            TrySendError::Full(_) => InputError::Full,
            TrySendError::Disconnected(_) => InputError::Closed,
        })
    }
}

type ControllerResult = Result<(), LinkError>;

/// Handle to a running session.
///
/// Dropping the handle signals shutdown but does not wait for the controller.
/// Use [`Session::shutdown`] to stop and wait.
pub struct Session {
    mode: Mode,
    shutdown_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<ControllerResult>>,
    stats: Arc<LinkStats>,
    health_events: Receiver<HealthEvent>,
    input: Option<KeyInput>,
}

impl Session {
    /// Opens a UDP link for `config.role` and starts the controller.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidConfig`], [`SessionError::NetworkNotReady`],
    /// [`SessionError::Open`] when the socket cannot be bound, or
    /// [`SessionError::Spawn`].
    pub fn spawn(config: SessionConfig, network: &dyn NetworkStatus) -> Result<Self, SessionError> {
        config.validate()?;
        if !network.is_network_ready() {
            error!("network not ready, session not started");
            return Err(SessionError::NetworkNotReady);
        }
        let link = Link::open_udp(config.role, config.link).map_err(|e| {
            error!(role = %config.role, error = %e, "failed to open link");
            SessionError::Open(e)
        })?;
        Self::spawn_with_link(config, link)
    }

    /// Starts the controller on an already constructed link.
    ///
    /// The link should be open; a closed link makes the controller stop with
    /// [`LinkError::NotInitialized`] on its first send or receive.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidConfig`] or [`SessionError::Spawn`].
    pub fn spawn_with_link<T>(config: SessionConfig, link: Link<T>) -> Result<Self, SessionError>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        info!(
            mode = %config.mode,
            role = %config.role,
            period_ms = config.period.as_millis() as u64,
            "session starting"
        );

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let mut health = LinkHealth::new(config.degraded_threshold);
        let stats = health.stats();
        let health_events = health.subscribe();
        let flag = Arc::clone(&shutdown_flag);

        let mut input = None;
        let controller: Box<dyn FnOnce() -> ControllerResult + Send> = match config.mode {
            Mode::Hover => {
                let hover = HoverController::new(link, health, config.hover(), flag);
                Box::new(move || hover.run())
            }
            Mode::Manual => {
                let (tx, rx) = flume::bounded(config.input_capacity);
                input = Some(KeyInput { tx });
                let manual = ManualController::new(link, health, rx, config.manual(), flag);
                Box::new(move || manual.run())
            }
            Mode::Listen => {
                let listener = Listener::new(link, health, config.listener(), flag);
                Box::new(move || listener.run())
            }
        };

        let mode = config.mode;
        let handle = thread::Builder::new()
            .name(format!("dronelink-{mode}"))
            .spawn(move || {
                info!("controller thread started");
                let result = controller();
                match &result {
                    Ok(()) => info!("controller thread exiting"),
                    Err(e) => error!(error = %e, "controller thread exiting on error"),
                }
                result
            })
            .map_err(SessionError::Spawn)?;

        Ok(Self {
            mode,
            shutdown_flag,
            handle: Some(handle),
            stats,
            health_events,
            input,
        })
    }

    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Read-only link counters.
    #[must_use]
    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Degraded and recovered transitions of the link.
    ///
    /// All clones share one queue, so each event is seen by one reader.
    #[must_use]
    pub fn health_events(&self) -> Receiver<HealthEvent> {
        self.health_events.clone()
    }

    /// Takes the manual key handle. `None` outside manual mode or once taken.
    ///
    /// Dropping every clone of the handle stops the manual controller.
    pub fn take_input(&mut self) -> Option<KeyInput> {
        self.input.take()
    }

    /// Returns a clone of the shutdown flag for external signal handling.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    /// Whether the controller thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signals shutdown and waits for the controller to send its cutoff and
    /// close the link.
    ///
    /// # Errors
    ///
    /// [`SessionError::Controller`] if the controller had already stopped on
    /// a link error, [`SessionError::Panicked`] if it panicked.
    pub fn shutdown(mut self) -> Result<(), SessionError> {
        info!(mode = %self.mode, "session shutdown initiated");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        let result = self.wait();
        info!(stats = %self.stats.snapshot(), "session shutdown complete");
        result
    }

    /// Waits for the controller to stop on its own (closed key input, a
    /// fatal error, or the shutdown flag raised elsewhere).
    ///
    /// # Errors
    ///
    /// Same as [`Session::shutdown`].
    pub fn join(mut self) -> Result<(), SessionError> {
        // our own input handle would keep a manual controller alive
        self.input = None;
        self.wait()
    }

    fn wait(&mut self) -> Result<(), SessionError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        debug!("waiting for controller thread to exit");
        match handle.join() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Controller(e)),
            Err(_) => Err(SessionError::Panicked),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::fake::{FakeTransport, FakeWire};

    const HOVER: [u8; 5] = [0x03, 127, 127, 127, 150];
    const CUTOFF: [u8; 5] = [0x03, 127, 127, 127, 0];

    fn fast(mode: Mode) -> SessionConfig {
        SessionConfig {
            period: Duration::from_millis(5),
            ack_timeout: Duration::from_millis(1),
            ..SessionConfig::new(mode)
        }
    }

    fn fake_link(wire: &FakeWire, role: Role) -> Link<FakeTransport> {
        let mut link = Link::new(role);
        link.open_with(|local| wire.bind(local)).unwrap();
        link
    }

    #[test]
    fn hover_session_sends_until_shutdown() {
        let wire = FakeWire::new();
        let config = fast(Mode::Hover);
        let link = fake_link(&wire, config.role);
        let mut session = Session::spawn_with_link(config, link).unwrap();
        assert!(session.take_input().is_none());

        std::thread::sleep(Duration::from_millis(40));
        let stats = session.stats();
        session.shutdown().unwrap();

        let sent = wire.sent_payloads();
        let (last, ticks) = sent.split_last().unwrap();
        assert!(ticks.len() >= 3);
        assert!(ticks.iter().all(|p| p == &HOVER));
        assert_eq!(last, &CUTOFF);
        assert_eq!(stats.sent(), ticks.len() as u64);
    }

    #[test]
    fn manual_session_follows_keys_and_ends_when_input_drops() {
        let wire = FakeWire::new();
        let config = SessionConfig {
            period: Duration::from_secs(10),
            ..fast(Mode::Manual)
        };
        let link = fake_link(&wire, config.role);
        let mut session = Session::spawn_with_link(config, link).unwrap();

        let input = session.take_input().unwrap();
        assert!(session.take_input().is_none());
        assert_eq!(input.press('w'), Ok(true));
        assert_eq!(input.press('x'), Ok(false));
        assert_eq!(input.press('d'), Ok(true));
        drop(input);
        session.join().unwrap();

        let sent = wire.sent_payloads();
        assert_eq!(
            sent,
            [
                CUTOFF.to_vec(),
                vec![0x03, 127, 127, 127, 10],
                vec![0x03, 137, 127, 127, 10],
                CUTOFF.to_vec(),
            ]
        );
    }

    #[test]
    fn degraded_and_recovered_reach_the_handle() {
        let wire = FakeWire::new();
        wire.set_fail_sends(true);
        let config = SessionConfig {
            degraded_threshold: 2,
            ..fast(Mode::Hover)
        };
        let link = fake_link(&wire, config.role);
        let session = Session::spawn_with_link(config, link).unwrap();
        let events = session.health_events();

        let degraded = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(degraded, HealthEvent::Degraded { consecutive: 2 });
        assert!(session.stats().is_degraded());

        wire.set_fail_sends(false);
        let recovered = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(matches!(recovered, HealthEvent::Recovered { after } if after >= 2));
        session.shutdown().unwrap();
    }

    #[test]
    fn controller_error_surfaces_on_join() {
        let config = fast(Mode::Manual);
        let link = Link::<FakeTransport>::new(config.role);
        let mut session = Session::spawn_with_link(config, link).unwrap();
        let input = session.take_input().unwrap();

        let result = session.join();
        assert!(matches!(
            result,
            Err(SessionError::Controller(LinkError::NotInitialized))
        ));
        assert_eq!(input.press('w'), Err(InputError::Closed));
    }

    #[test]
    fn network_must_be_ready() {
        let result = Session::spawn(SessionConfig::default(), &|| false);
        assert!(matches!(result, Err(SessionError::NetworkNotReady)));
    }

    #[test]
    fn validation() {
        let ok = SessionConfig::default();
        assert!(ok.validate().is_ok());
        assert!(SessionConfig::new(Mode::Listen).validate().is_ok());

        let zero_period = SessionConfig {
            period: Duration::ZERO,
            ..ok.clone()
        };
        assert!(matches!(
            zero_period.validate(),
            Err(SessionError::InvalidConfig(_))
        ));

        let slow_ack = SessionConfig {
            ack_timeout: ok.period,
            ..ok.clone()
        };
        assert!(slow_ack.validate().is_err());

        let hover_without_peer = SessionConfig {
            role: Role::Receiver {
                local: Endpoint::any(DEFAULT_LOCAL_PORT),
            },
            ..ok.clone()
        };
        assert!(hover_without_peer.validate().is_err());

        let deaf_listener = SessionConfig {
            role: Role::Sender { peer: DEFAULT_PEER },
            ..SessionConfig::new(Mode::Listen)
        };
        let err = deaf_listener.validate().unwrap_err().to_string();
        assert!(err.contains("listen mode needs a receiving link"), "{err}");
    }

    #[test]
    fn listen_ignores_ack_timeout() {
        let fast_listen = SessionConfig {
            period: Duration::from_millis(20),
            ack_timeout: Duration::from_millis(20),
            ..SessionConfig::new(Mode::Listen)
        };
        assert!(fast_listen.validate().is_ok());

        let fast_hover = SessionConfig {
            mode: Mode::Hover,
            role: Role::Duplex {
                local: Endpoint::any(DEFAULT_LOCAL_PORT),
                peer: DEFAULT_PEER,
            },
            ..fast_listen
        };
        assert!(fast_hover.validate().is_err());
    }

    #[test]
    fn huge_period_is_rejected_not_scheduled() {
        let config = SessionConfig {
            period: Duration::from_millis(u64::MAX),
            ..SessionConfig::new(Mode::Hover)
        };
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must be at most"), "{err}");

        let wire = FakeWire::new();
        let link = fake_link(&wire, config.role);
        assert!(matches!(
            Session::spawn_with_link(config, link),
            Err(SessionError::InvalidConfig(_))
        ));
        assert!(wire.sent().is_empty());

        let longest = SessionConfig {
            period: MAX_PERIOD,
            ..SessionConfig::new(Mode::Listen)
        };
        assert!(longest.validate().is_ok());
    }

    #[test]
    fn mode_parsing() {
        for mode in [Mode::Manual, Mode::Hover, Mode::Listen] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert!("fly".parse::<Mode>().is_err());
    }

    #[test]
    fn dropping_the_handle_raises_the_flag() {
        let wire = FakeWire::new();
        let config = fast(Mode::Hover);
        let link = fake_link(&wire, config.role);
        let session = Session::spawn_with_link(config, link).unwrap();
        let flag = session.shutdown_flag();
        drop(session);
        assert!(flag.load(Ordering::Relaxed));
    }
}
