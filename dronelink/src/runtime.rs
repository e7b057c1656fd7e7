//! Flight session runtime.
//!
//! - `session`: picks one controller at startup, opens the link and runs the
//!   controller on its own thread. The controller exclusively owns the
//!   `ControlState` and the `Link`; nothing else can send.
//! - `hover` / `manual`: the two mutually exclusive command policies.
//! - `listener`: receive-only monitor for a bound port.
//! - `health`: consecutive-failure tracking and the degraded-link flag.
//! - `ticker` / `backoff`: fixed-period scheduling and bounded retry delays.
//! - `commander`: send/reply helper shared by the two flying controllers.

pub mod backoff;
mod commander;
pub mod health;
pub mod hover;
pub mod listener;
pub mod manual;
pub mod session;
pub mod ticker;

pub use backoff::Backoff;
pub use health::{DEFAULT_DEGRADED_THRESHOLD, HealthEvent, LinkHealth, LinkStats, StatsSnapshot};
pub use hover::{HoverConfig, HoverController};
pub use listener::{Listener, ListenerConfig};
pub use manual::{ManualConfig, ManualController};
pub use session::{
    AlwaysReady, DEFAULT_LOCAL_PORT, DEFAULT_PEER, InputError, KeyInput, MAX_PERIOD, Mode,
    NetworkStatus, PEER_ENV, Session, SessionConfig, SessionError, UnknownMode, peer_from_env,
};
pub use ticker::Ticker;
