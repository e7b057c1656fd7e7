//! Wire format for commander packets.
//!
//! Every command is one 5-byte datagram:
//!
//! ```text
//! ┌───────────┬─────────┬──────────┬────────┬───────────┐
//! │ Header(1) │ Roll(1) │ Pitch(1) │ Yaw(1) │ Thrust(1) │
//! └───────────┴─────────┴──────────┴────────┴───────────┘
//! ```
//!
//! All fields are unsigned bytes, so there is no padding and no byte order.
//! There is no checksum or sequence number; a lost packet is simply replaced
//! by the next periodic one.

pub mod inbound;
pub mod packet;

pub use inbound::{Inbound, classify};
pub use packet::{COMMANDER_HEADER, DecodeError, Header, PACKET_LEN, WirePacket, decode, encode};
