//! Keyboard mapping for manual flight.
//!
//! | key | effect         |
//! |-----|----------------|
//! | `w` | thrust + step  |
//! | `s` | thrust - step  |
//! | `a` | roll - step    |
//! | `d` | roll + step    |
//! | `z` | yaw - step     |
//! | `c` | yaw + step     |
//!
//! Any other key leaves the state unchanged.

use std::fmt;

use super::state::{Axis, ControlState};

/// Amount one key press moves its axis.
pub const KEY_STEP: i16 = 10;

/// A recognized control key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    ThrustUp,
    ThrustDown,
    RollLeft,
    RollRight,
    YawLeft,
    YawRight,
}

impl Key {
    pub const ALL: [Self; 6] = [
        Self::ThrustUp,
        Self::ThrustDown,
        Self::RollLeft,
        Self::RollRight,
        Self::YawLeft,
        Self::YawRight,
    ];

    /// Maps a keyboard character to a key; `None` for anything unbound.
    #[must_use]
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'w' => Some(Self::ThrustUp),
            's' => Some(Self::ThrustDown),
            'a' => Some(Self::RollLeft),
            'd' => Some(Self::RollRight),
            'z' => Some(Self::YawLeft),
            'c' => Some(Self::YawRight),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::ThrustUp => 'w',
            Self::ThrustDown => 's',
            Self::RollLeft => 'a',
            Self::RollRight => 'd',
            Self::YawLeft => 'z',
            Self::YawRight => 'c',
        }
    }

    /// The axis this key moves and the signed step.
    #[must_use]
    pub const fn delta(self) -> (Axis, i16) {
        match self {
            Self::ThrustUp => (Axis::Thrust, KEY_STEP),
            Self::ThrustDown => (Axis::Thrust, -KEY_STEP),
            Self::RollLeft => (Axis::Roll, -KEY_STEP),
            Self::RollRight => (Axis::Roll, KEY_STEP),
            Self::YawLeft => (Axis::Yaw, -KEY_STEP),
            Self::YawRight => (Axis::Yaw, KEY_STEP),
        }
    }

    /// Returns `state` with this key applied.
    #[must_use]
    pub fn apply(self, state: ControlState) -> ControlState {
        let (axis, delta) = self.delta();
        state.adjusted(axis, delta)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (axis, delta) = self.delta();
        write!(f, "'{}' ({axis} {delta:+})", self.as_char())
    }
}

/// Applies a raw key press to `state`. Unbound keys are a no-op.
#[must_use]
pub fn apply_key(state: ControlState, key: char) -> ControlState {
    match Key::from_char(key) {
        Some(key) => key.apply(state),
        None => state,
    }
}
