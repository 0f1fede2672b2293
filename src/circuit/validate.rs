//! Circuit validation.

use std::sync::Arc;

use tracing::warn;

use crate::error::{GatesimError, Result};

use super::Circuit;

/// Validate a circuit for simulation.
///
/// Checks:
/// - The circuit has at least one component
/// - Width conflicts are reported as warnings; the affected bundles simply
///   carry no value during simulation
pub fn validate_circuit(circuit: &Arc<Circuit>) -> Result<()> {
    if circuit.component_count() == 0 {
        return Err(GatesimError::topology(format!(
            "circuit '{}' has no components",
            circuit.name()
        )));
    }

    let map = circuit.bundle_map();
    if !map.is_valid() {
        warn!(circuit = circuit.name(), "wiring could not be resolved; all points are unconnected");
    }
    for incompat in map.width_incompatibility() {
        warn!(circuit = circuit.name(), "{}", incompat);
    }

    Ok(())
}
