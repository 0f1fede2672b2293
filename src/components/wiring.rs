//! Tunnels and pull resistors. Both are resolved by the bundle map.

use crate::circuit::{BitWidth, ComponentId, Location, Value};

/// Connects every tunnel sharing its label, wherever they are placed.
#[derive(Debug, Clone)]
pub struct Tunnel {
    pub id: ComponentId,
    pub loc: Location,
    pub label: String,
    pub width: BitWidth,
}

/// Weak driver applied to the floating bits of its bundle.
#[derive(Debug, Clone)]
pub struct PullResistor {
    pub id: ComponentId,
    pub loc: Location,
    /// One of [`Value::FALSE`], [`Value::TRUE`] or [`Value::ERROR`].
    pub pull: Value,
}
