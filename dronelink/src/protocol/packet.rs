//! Commander packet encode/decode.

use std::fmt;

use thiserror::Error;

use crate::control::ControlState;

/// Size of a commander packet on the wire.
pub const PACKET_LEN: usize = 5;

/// Tag byte carried by every command packet sent to the flight controller.
pub const COMMANDER_HEADER: u8 = 0x03;

/// CRTP tag byte: port in the high nibble, channel in the low two bits.
///
/// ```text
///  7   6   5   4   3   2   1   0
/// ┌───────────────┬───────┬───────┐
/// │     Port      │ Link  │ Chan  │
/// └───────────────┴───────┴───────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header(u8);

impl Header {
    /// The commander tag used by both controllers.
    pub const COMMANDER: Self = Self(COMMANDER_HEADER);

    /// Builds a header from port (0..=15) and channel (0..=3); extra bits are masked off.
    #[must_use]
    pub const fn from_parts(port: u8, channel: u8) -> Self {
        Self(((port & 0x0f) << 4) | (channel & 0x03))
    }

    #[must_use]
    pub const fn port(self) -> u8 {
        self.0 >> 4
    }

    #[must_use]
    pub const fn channel(self) -> u8 {
        self.0 & 0x03
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for Header {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x} (port {}, channel {})", self.0, self.port(), self.channel())
    }
}

/// An encoded command, exactly as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WirePacket([u8; PACKET_LEN]);

impl WirePacket {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }

    #[must_use]
    pub const fn header(&self) -> Header {
        Header(self.0[0])
    }
}

impl AsRef<[u8]> for WirePacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Errors decoding an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The datagram is not exactly [`PACKET_LEN`] bytes.
    #[error("malformed packet: expected {} bytes, got {len}", PACKET_LEN)]
    MalformedPacket { len: usize },
}

/// Serializes `state` as `[header, roll, pitch, yaw, thrust]`.
#[must_use]
pub const fn encode(state: &ControlState) -> WirePacket {
    WirePacket([
        state.header,
        state.roll,
        state.pitch,
        state.yaw,
        state.thrust,
    ])
}

/// Parses a commander packet.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedPacket`] unless `bytes` is exactly
/// [`PACKET_LEN`] long. The header byte is not checked.
pub fn decode(bytes: &[u8]) -> Result<ControlState, DecodeError> {
    let &[header, roll, pitch, yaw, thrust] = bytes else {
        return Err(DecodeError::MalformedPacket { len: bytes.len() });
    };
    Ok(ControlState {
        header,
        roll,
        pitch,
        yaw,
        thrust,
    })
}
