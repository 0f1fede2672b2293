//! Event-driven simulation of circuits.
//!
//! A [`Propagator`] owns a tree of [`CircuitState`]s, one per circuit
//! instance, and a time-ordered queue of [`SetData`] events. Each step pops
//! every event of the earliest time slot, folds them into the per-point
//! causes, resolves the changed points through the bundle map and re-runs
//! the components whose inputs moved. Components see the simulation through
//! an [`InstanceState`].

mod instance;
mod points;
mod propagator;
mod state;

pub use instance::InstanceState;
pub use points::PropagationPoints;
pub use propagator::{Propagator, SetData, SimulatorConfig};
pub use state::{CircuitState, ComponentData, StateId};
