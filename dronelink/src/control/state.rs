//! Roll/pitch/yaw/thrust setpoint owned by the active controller.

use std::fmt;

use crate::protocol::COMMANDER_HEADER;

/// Centre value for roll, pitch and yaw.
pub const NEUTRAL: u8 = 127;

/// Thrust the hover policy holds.
pub const HOVER_THRUST: u8 = 150;

/// A control axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Roll,
    Pitch,
    Yaw,
    Thrust,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Roll => "roll",
            Self::Pitch => "pitch",
            Self::Yaw => "yaw",
            Self::Thrust => "thrust",
        })
    }
}

/// The command the controller is currently asking the drone to fly.
///
/// Invariant: every axis stays within `[0, 255]`. Fields are bytes, and all
/// mutation goes through [`ControlState::adjust`], which saturates instead of
/// wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlState {
    /// CRTP tag byte, constant for a session.
    pub header: u8,
    pub roll: u8,
    pub pitch: u8,
    pub yaw: u8,
    pub thrust: u8,
}

impl ControlState {
    /// Level attitude, motors off.
    #[must_use]
    pub const fn neutral() -> Self {
        Self::with_thrust(0)
    }

    /// Level attitude at hover thrust.
    #[must_use]
    pub const fn hover() -> Self {
        Self::with_thrust(HOVER_THRUST)
    }

    /// Level attitude at the given thrust.
    #[must_use]
    pub const fn with_thrust(thrust: u8) -> Self {
        Self {
            header: COMMANDER_HEADER,
            roll: NEUTRAL,
            pitch: NEUTRAL,
            yaw: NEUTRAL,
            thrust,
        }
    }

    #[must_use]
    pub const fn axis(&self, axis: Axis) -> u8 {
        match axis {
            Axis::Roll => self.roll,
            Axis::Pitch => self.pitch,
            Axis::Yaw => self.yaw,
            Axis::Thrust => self.thrust,
        }
    }

    /// Adds `delta` to one axis, saturating at 0 and 255.
    pub fn adjust(&mut self, axis: Axis, delta: i16) {
        let slot = match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Yaw => &mut self.yaw,
            Axis::Thrust => &mut self.thrust,
        };
        *slot = saturate(i16::from(*slot).saturating_add(delta));
    }

    /// Copy of `self` with one axis adjusted.
    #[must_use]
    pub fn adjusted(mut self, axis: Axis, delta: i16) -> Self {
        self.adjust(axis, delta);
        self
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::neutral()
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thrust={} roll={} pitch={} yaw={}",
            self.thrust, self.roll, self.pitch, self.yaw
        )
    }
}

#[inline]
fn saturate(value: i16) -> u8 {
    // clamp keeps the value in u8 range
    value.clamp(0, i16::from(u8::MAX)) as u8
}
