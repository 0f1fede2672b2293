//! WASM bindings for Gatesim Core.
//!
//! This module provides JavaScript-friendly bindings for analyzing and
//! stepping logic circuits in a browser.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmLogicSim } from 'gatesim_core';
//!
//! await init();
//!
//! const netlist = `
//!   PIN a (0,0) in
//!   NOT (40,0) (20,0)
//!   W (0,0) (20,0)
//!   W (40,0) (60,0)
//!   PIN y (60,0) out
//! `;
//!
//! const sim = new WasmLogicSim(netlist);
//! console.log(sim.truth_table());
//! console.log(sim.expressions());
//!
//! sim.set_input("a", 1);
//! console.log(sim.output("y"));
//! ```
//!
//! Browsers cannot host the owner thread, so circuits are built with an
//! inline owner that runs requests on the calling thread.

use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::analyze::{compute_expression, compute_table, pin_labels};
use crate::circuit::{validate_circuit, Circuit, Value};
use crate::components::Pin;
use crate::dsl;
use crate::error::GatesimError;
use crate::project::{Project, SimContext};
use crate::sim::{Propagator, SimulatorConfig};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn js_error(e: GatesimError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-compatible logic circuit simulator.
///
/// Wraps the main circuit of a netlist together with a live propagator.
#[wasm_bindgen]
pub struct WasmLogicSim {
    circuit: Arc<Circuit>,
    labels: Vec<(Pin, String)>,
    propagator: Propagator,
}

#[wasm_bindgen]
impl WasmLogicSim {
    /// Create a new simulator from netlist source.
    ///
    /// # Example
    /// ```javascript
    /// const sim = new WasmLogicSim(netlist);
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(netlist: &str) -> Result<WasmLogicSim, JsValue> {
        let ast = dsl::parse(netlist).map_err(js_error)?;
        let ctx = SimContext::inline();
        let project = Project::from_ast(&ast, &ctx).map_err(js_error)?;
        let circuit = Arc::clone(project.main_circuit());
        validate_circuit(&circuit).map_err(js_error)?;

        let labels = pin_labels(&circuit);
        let mut propagator = Propagator::new(Arc::clone(&circuit));
        propagator.propagate();
        Ok(WasmLogicSim {
            circuit,
            labels,
            propagator,
        })
    }

    /// Truth table of the main circuit, one line per row.
    #[wasm_bindgen]
    pub fn truth_table(&self) -> Result<String, JsValue> {
        let table = compute_table(&self.circuit, &self.labels, &SimulatorConfig::default()).map_err(js_error)?;
        Ok(table.to_string())
    }

    /// One `name = expression` line per output bit; `?` where no
    /// expression could be derived.
    #[wasm_bindgen]
    pub fn expressions(&self) -> Result<String, JsValue> {
        let model = compute_expression(&self.circuit, &self.labels).map_err(js_error)?;
        let mut text = String::new();
        for (name, expr) in &model.expressions {
            match expr {
                Some(e) => text.push_str(&format!("{} = {}\n", name, e)),
                None => text.push_str(&format!("{} = ?\n", name)),
            }
        }
        Ok(text)
    }

    /// Drive an input pin by label and propagate.
    #[wasm_bindgen]
    pub fn set_input(&mut self, label: &str, value: u32) -> Result<(), JsValue> {
        let pin = self
            .labels
            .iter()
            .find(|(p, l)| p.is_input() && l == label)
            .map(|(p, _)| p.clone())
            .ok_or_else(|| {
                js_error(GatesimError::WasmError {
                    message: format!("no input pin labeled '{}'", label),
                })
            })?;
        self.propagator
            .set_pin(pin.id, Value::known(pin.width, u64::from(value)))
            .map_err(js_error)?;
        self.propagator.propagate();
        Ok(())
    }

    /// Current value of a pin by label, most significant bit first, or
    /// `undefined` when no pin has that label.
    #[wasm_bindgen]
    pub fn output(&self, label: &str) -> Option<String> {
        let (pin, _) = self.labels.iter().find(|(_, l)| l == label)?;
        self.propagator.pin_value(pin.id).map(|v| v.to_string())
    }

    /// Advance the clocks by half a cycle and propagate.
    ///
    /// Returns `false` when the circuit oscillates.
    #[wasm_bindgen]
    pub fn tick(&mut self) -> bool {
        self.propagator.toggle_clocks();
        self.propagator.propagate();
        !self.propagator.is_oscillating()
    }

    /// Drop all signal values and start over.
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.propagator.reset();
        self.propagator.propagate();
    }

    /// Half clock cycles elapsed since creation or the last reset.
    #[wasm_bindgen(getter)]
    pub fn tick_count(&self) -> u32 {
        self.propagator.tick_count()
    }
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
