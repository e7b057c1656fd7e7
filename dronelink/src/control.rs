//! Control state and the manual input mapping that mutates it.

pub mod input;
pub mod state;

pub use input::{KEY_STEP, Key, apply_key};
pub use state::{Axis, ControlState, HOVER_THRUST, NEUTRAL};
