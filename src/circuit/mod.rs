//! Circuit representation: geometry, values, wires and the netlist itself.
//!
//! A [`Circuit`] holds wires and non-wire components behind its locker.
//! Structural edits happen inside transactions (see [`crate::txn`]); the
//! derived [`BundleMap`](crate::wires::BundleMap) is cached per structural
//! generation.

mod appearance;
mod graph;
mod types;
mod validate;
mod value;
mod wire;

pub use appearance::CircuitPins;
pub use graph::{Circuit, CircuitContents};
pub use types::*;
pub use validate::validate_circuit;
pub use value::{BitState, Value};
pub use wire::Wire;
