//! Network transport primitives.
//!
//! [`Endpoint`] names a peer, [`UdpSocket`] moves datagrams with bounded
//! waits, and [`Link`] ties a socket to a [`Role`] for the lifetime of a
//! flight session.

pub mod endpoint;
pub mod link;
pub mod socket;

#[cfg(test)]
pub(crate) mod fake;

pub use endpoint::{Endpoint, EndpointParseError};
pub use link::{Link, LinkError, LinkOp, LinkOptions, Role};
pub use socket::{Transport, UdpSocket};
