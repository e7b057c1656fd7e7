//! Command link for CRTP quadrotors over UDP.
//!
//! A flight session turns operator keys or a constant hover policy into
//! 5-byte commander packets and sends them to the flight controller:
//!
//! ```text
//! keys ──► control::apply_key ─┐
//!                              ├─► ControlState ─► protocol::encode ─► net::Link ─► UDP
//! hover policy ────────────────┘
//! ```
//!
//! [`runtime::Session`] wires it together: it opens one [`net::Link`], starts
//! exactly one controller thread that owns the link and the state, and stops
//! it gracefully with a final motor cutoff.
//!
//! ```no_run
//! use dronelink::runtime::{AlwaysReady, Mode, Session, SessionConfig};
//!
//! let session = Session::spawn(SessionConfig::new(Mode::Hover), &AlwaysReady)?;
//! std::thread::sleep(std::time::Duration::from_secs(5));
//! session.shutdown()?;
//! # Ok::<(), dronelink::runtime::SessionError>(())
//! ```

mod clock;
pub mod control;
pub mod net;
pub mod protocol;
pub mod runtime;
mod trace;

pub use trace::init_tracing;
