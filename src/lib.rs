//! # Gatesim Core
//!
//! A simulation kernel for digital logic circuits.
//!
//! This library provides:
//! - A netlist DSL for describing gate-level circuits and subcircuit hierarchies
//! - Wire resolution into multi-bit bundles with per-bit threads across splitters
//! - Event-driven signal propagation with oscillation detection
//! - Transactional structural editing under per-circuit locks
//! - Truth-table and Boolean-expression analysis of combinational circuits
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`dsl`] - Parser for the netlist language
//! - [`project`] - Builds circuits from a parsed netlist
//! - [`circuit`] - Circuit model, values and locations
//! - [`components`] - Gates, pins, clocks, splitters, tunnels and subcircuits
//! - [`wires`] - Bundle maps derived from wiring data
//! - [`txn`] - Locks, transactions and wire repair
//! - [`sim`] - Event queue and per-instance signal state
//! - [`analyze`] - Truth tables and output expressions
//! - [`owner`] - The thread that owns bundle-map recomputation
//! - `tty` - Terminal output (CLI only)
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! gatesim adder.gsn --mode expr
//! ```
//!
//! ### Library
//!
//! ```ignore
//! use gatesim_core::{dsl, Project, Propagator, SimContext};
//!
//! let ast = dsl::parse(source)?;
//! let project = Project::from_ast(&ast, &SimContext::new()?)?;
//! let mut prop = Propagator::new(project.main_circuit().clone());
//! prop.propagate();
//! ```
//!
//! ### WASM
//!
//! ```javascript
//! import { WasmLogicSim } from 'gatesim_core';
//!
//! const sim = new WasmLogicSim(netlist);
//! console.log(sim.truth_table());
//! ```
//!
//! ## Propagation Model
//!
//! Components never write wires directly. A component schedules a value for
//! one of its ends some ticks in the future; the propagator pops events in
//! time order, records each driver's contribution at the location, and
//! re-evaluates every component attached to a bundle whose resolved value
//! changed. A run that keeps producing events past the iteration limit is
//! flagged as oscillating rather than failing.

pub mod analyze;
pub mod circuit;
pub mod components;
pub mod dsl;
pub mod error;
pub mod owner;
pub mod project;
pub mod sim;
pub mod txn;
pub mod wires;

#[cfg(feature = "cli")]
pub mod tty;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use error::{GatesimError, Result};
pub use project::{Project, SimContext};
pub use sim::{Propagator, SimulatorConfig};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmLogicSim;

/// Time slots one `propagate` call may process before reporting oscillation
pub const DEFAULT_ITERATION_LIMIT: usize = 1000;

/// Largest number of input bits enumerated into a truth table
pub const MAX_TABLE_INPUTS: usize = 20;
