//! Classification of datagrams arriving on the receive path.
//!
//! Inbound traffic is only inspected for logging: a 5-byte datagram carrying
//! the commander tag is shown as a command echo, anything else as raw bytes.

use std::fmt;

use crate::control::ControlState;

use super::packet::{COMMANDER_HEADER, decode};

/// What a received datagram looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A commander packet, e.g. the flight controller echoing a setpoint.
    Command(ControlState),
    /// Any other payload.
    Raw { len: usize, preview: String },
}

/// Longest payload prefix rendered in logs.
const PREVIEW_LEN: usize = 32;

/// Classifies `bytes` for logging.
#[must_use]
pub fn classify(bytes: &[u8]) -> Inbound {
    match decode(bytes) {
        Ok(state) if state.header == COMMANDER_HEADER => Inbound::Command(state),
        _ => Inbound::Raw {
            len: bytes.len(),
            preview: preview(bytes),
        },
    }
}

/// Hex rendering of the first [`PREVIEW_LEN`] bytes.
fn preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(PREVIEW_LEN)];
    let mut out = shown
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > PREVIEW_LEN {
        out.push_str(" ..");
    }
    out
}

impl fmt::Display for Inbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(state) => write!(f, "command {state}"),
            Self::Raw { len, preview } => write!(f, "{len} bytes [{preview}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode;

    #[test]
    fn commander_packet_is_a_command() {
        let bytes = encode(&ControlState::hover());
        assert_eq!(
            classify(bytes.as_bytes()),
            Inbound::Command(ControlState::hover())
        );
    }

    #[test]
    fn other_payloads_are_raw() {
        assert_eq!(
            classify(b"ok"),
            Inbound::Raw {
                len: 2,
                preview: "6f 6b".into()
            }
        );
        // right length, foreign header
        assert!(matches!(
            classify(&[0x30, 0, 0, 0, 0]),
            Inbound::Raw { len: 5, .. }
        ));
    }

    #[test]
    fn long_payload_preview_is_truncated() {
        let text = classify(&[0xab; 100]).to_string();
        assert!(text.starts_with("100 bytes [ab ab"));
        assert!(text.ends_with(" ..]"));
    }
}
