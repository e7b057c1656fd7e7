//! Addresses of the two link ends.

use std::fmt;
use std::net::{AddrParseError, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::str::FromStr;

use thiserror::Error;

/// URI scheme accepted in front of an `ip:port` pair (`udp://192.168.43.42:2390`).
pub const UDP_SCHEME: &str = "udp://";

/// A UDP address of the controller or the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    #[must_use]
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port)))
    }

    /// `0.0.0.0:port`, every local interface.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self::new_v4(0, 0, 0, 0, port)
    }

    /// `127.0.0.1:port`.
    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::new_v4(127, 0, 0, 1, port)
    }
}

/// Failure to parse an endpoint from text.
#[derive(Debug, Error)]
#[error("invalid endpoint {input:?}: {source}")]
pub struct EndpointParseError {
    input: String,
    #[source]
    source: AddrParseError,
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    /// Parses `ip:port`, optionally prefixed with `udp://`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let addr = trimmed.strip_prefix(UDP_SCHEME).unwrap_or(trimmed);
        addr.parse::<SocketAddr>()
            .map(Self)
            .map_err(|source| EndpointParseError {
                input: s.to_owned(),
                source,
            })
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_build_ipv4_addresses() {
        let drone = SocketAddr::from(Endpoint::new_v4(192, 168, 43, 42, 2390));
        assert_eq!(drone, "192.168.43.42:2390".parse::<SocketAddr>().unwrap());

        let any = SocketAddr::from(Endpoint::any(2399));
        assert!(any.ip().is_unspecified());
        assert_eq!(any.port(), 2399);

        assert!(SocketAddr::from(Endpoint::localhost(0)).ip().is_loopback());
    }

    #[test]
    fn endpoint_parses_plain_and_uri_forms() {
        let plain: Endpoint = "192.168.43.42:2390".parse().unwrap();
        let uri: Endpoint = " udp://192.168.43.42:2390 ".parse().unwrap();
        assert_eq!(plain, uri);
        assert_eq!(plain, Endpoint::new_v4(192, 168, 43, 42, 2390));
    }

    #[test]
    fn endpoint_rejects_missing_port() {
        let err = "udp://192.168.43.42".parse::<Endpoint>().unwrap_err();
        assert!(err.to_string().contains("192.168.43.42"));
        assert!("udp://[::1]".parse::<Endpoint>().is_err());
    }

    #[test]
    fn endpoint_display() {
        let ep = Endpoint::localhost(8080);
        assert_eq!(format!("{ep}"), "127.0.0.1:8080");
    }
}
