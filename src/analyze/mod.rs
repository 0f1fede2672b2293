//! Symbolic analysis of combinational circuits.
//!
//! [`compute_expression`] pushes Boolean expressions instead of values
//! through the same bundle and thread graph the propagator uses.
//! [`compute_table`] enumerates every input combination with a fresh
//! [`Propagator`] per row.

mod expr;
mod table;

pub use expr::Expression;
pub use table::{is_input_set, Entry, TruthTable, Var};

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::circuit::{BitState, Circuit, ComponentId, Location, Value};
use crate::components::{Component, ExpressionMap, Pin};
use crate::error::{GatesimError, Result};
use crate::sim::{Propagator, SimulatorConfig};
use crate::MAX_TABLE_INPUTS;

/// Rounds of wire and component propagation before giving up.
const MAX_ROUNDS: usize = 100;

/// Expressions larger than this are taken as feeding back on themselves.
const MAX_EXPRESSION_NODES: usize = 1 << 16;

/// Pins of `circuit` with analysis labels, in canonical order: top-down,
/// ties broken left-right.
///
/// User labels are turned into identifiers and de-duplicated with a numeric
/// suffix. Unlabeled inputs take the first free name of `a..h`, unlabeled
/// outputs of `x, y, z, u, v, w, s, t`, then `x2, x3, ...`.
pub fn pin_labels(circuit: &Circuit) -> Vec<(Pin, String)> {
    let mut pins = circuit.port_pins();
    pins.sort_by(|a, b| a.loc.cmp_vertical(&b.loc));

    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut labels: Vec<Option<String>> = Vec::with_capacity(pins.len());
    for pin in &pins {
        let label = pin.label.as_deref().and_then(to_valid_label).map(|base| {
            if !taken.contains(&base) {
                return base;
            }
            let mut i = 2;
            while taken.contains(&format!("{}{}", base, i)) {
                i += 1;
            }
            format!("{}{}", base, i)
        });
        if let Some(l) = &label {
            taken.insert(l.clone());
        }
        labels.push(label);
    }

    pins.into_iter()
        .zip(labels)
        .map(|(pin, label)| {
            let label = label.unwrap_or_else(|| {
                let defaults: &[&str] = if pin.is_input() {
                    &["a", "b", "c", "d", "e", "f", "g", "h"]
                } else {
                    &["x", "y", "z", "u", "v", "w", "s", "t"]
                };
                let picked = defaults
                    .iter()
                    .find(|d| !taken.contains(**d))
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| {
                        let mut i = 2;
                        while taken.contains(&format!("x{}", i)) {
                            i += 1;
                        }
                        format!("x{}", i)
                    });
                taken.insert(picked.clone());
                picked
            });
            (pin, label)
        })
        .collect()
}

/// Identifier form of a user label: later words capitalized, characters
/// that cannot appear in an identifier dropped, leading digits moved to the
/// end. `None` when nothing usable remains.
fn to_valid_label(label: &str) -> Option<String> {
    let mut out = String::new();
    let mut tail = String::new();
    let mut after_space = false;
    for c in label.chars() {
        if c.is_alphabetic() || c == '_' {
            if after_space {
                out.extend(c.to_uppercase());
                after_space = false;
            } else {
                out.push(c);
            }
        } else if c.is_alphanumeric() {
            if out.is_empty() {
                tail.push(c);
            } else {
                out.push(c);
            }
            after_space = false;
        } else if c.is_whitespace() {
            after_space = true;
        }
    }
    if out.is_empty() {
        return None;
    }
    out.push_str(&tail);
    Some(out)
}

/// Boolean expressions for every output bit of a circuit.
#[derive(Debug, Clone)]
pub struct OutputExpressions {
    pub inputs: Vec<Var>,
    pub outputs: Vec<Var>,
    /// One entry per output bit, most significant bit of each pin first.
    /// `None` when nothing drives the bit.
    pub expressions: Vec<(String, Option<Expression>)>,
}

/// Component that wrote a point, and the round it did so in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DriverTag {
    origin: ComponentId,
    epoch: usize,
}

struct SymbolicMap<'a> {
    circuit: &'a Arc<Circuit>,
    values: HashMap<(Location, usize), Expression>,
    drivers: HashMap<(Location, usize), DriverTag>,
    dirty: BTreeSet<(Location, usize)>,
    current: Option<DriverTag>,
}

impl<'a> SymbolicMap<'a> {
    fn new(circuit: &'a Arc<Circuit>) -> Self {
        Self {
            circuit,
            values: HashMap::new(),
            drivers: HashMap::new(),
            dirty: BTreeSet::new(),
            current: None,
        }
    }

    fn store(&mut self, point: (Location, usize), expr: Expression, tag: Option<DriverTag>) {
        if let Some(tag) = tag {
            self.drivers.insert(point, tag);
        }
        if self.values.get(&point) != Some(&expr) {
            self.values.insert(point, expr);
            self.dirty.insert(point);
        }
    }
}

impl ExpressionMap for SymbolicMap<'_> {
    fn get(&self, loc: Location, bit: usize) -> Option<Expression> {
        self.values.get(&(loc, bit)).cloned()
    }

    fn put(&mut self, loc: Location, bit: usize, expr: Expression) {
        let tag = self.current;
        self.store((loc, bit), expr, tag);
    }
}

/// Derive a Boolean expression for each output bit.
///
/// Input pins are seeded with one variable per bit (`name` or `name[b]`).
/// Fails with [`GatesimError::Circular`] when expressions keep changing,
/// [`GatesimError::Conflict`] when two drivers put different expressions on
/// one net, and [`GatesimError::CannotHandle`] for components without a
/// symbolic model.
pub fn compute_expression(circuit: &Arc<Circuit>, labels: &[(Pin, String)]) -> Result<OutputExpressions> {
    let mut map = SymbolicMap::new(circuit);
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for (pin, label) in labels {
        let width = pin.width.bits();
        if pin.is_input() {
            let tag = DriverTag {
                origin: pin.id,
                epoch: 0,
            };
            for b in 0..width {
                let name = if width > 1 { format!("{}[{}]", label, b) } else { label.clone() };
                map.store((pin.loc, b), Expression::variable(name), Some(tag));
            }
            inputs.push(Var::new(label.clone(), width));
        } else {
            outputs.push((pin, Var::new(label.clone(), width)));
        }
    }

    propagate_components(&mut map, &circuit.non_wires(), 0)?;

    let mut round = 0;
    while !map.dirty.is_empty() {
        round += 1;
        if round > MAX_ROUNDS {
            debug!(circuit = circuit.name(), rounds = MAX_ROUNDS, "expressions did not settle");
            return Err(GatesimError::Circular);
        }

        let points = std::mem::take(&mut map.dirty);
        propagate_wires(&mut map, &points, round)?;

        let mut touched: BTreeSet<Location> = points.iter().map(|(loc, _)| *loc).collect();
        touched.extend(map.dirty.iter().map(|(loc, _)| *loc));
        map.dirty.clear();

        let mut dirty_components: Vec<Component> = Vec::new();
        for loc in touched {
            for comp in circuit.components_at(loc) {
                if !matches!(comp, Component::Wire(_)) && !dirty_components.contains(&comp) {
                    dirty_components.push(comp);
                }
            }
        }
        propagate_components(&mut map, &dirty_components, round)?;

        if map
            .dirty
            .iter()
            .any(|p| map.values.get(p).is_some_and(|e| e.node_count() > MAX_EXPRESSION_NODES))
        {
            return Err(GatesimError::Circular);
        }
    }
    debug!(circuit = circuit.name(), rounds = round, "expressions settled");

    let mut expressions = Vec::new();
    for (pin, var) in &outputs {
        for b in (0..var.width).rev() {
            let name = if var.width > 1 { format!("{}[{}]", var.name, b) } else { var.name.clone() };
            expressions.push((name, map.values.get(&(pin.loc, b)).cloned()));
        }
    }

    Ok(OutputExpressions {
        inputs,
        outputs: outputs.into_iter().map(|(_, v)| v).collect(),
        expressions,
    })
}

fn propagate_components(map: &mut SymbolicMap<'_>, components: &[Component], epoch: usize) -> Result<()> {
    for comp in components {
        if let Some(computer) = comp.expression_computer() {
            map.current = comp.id().map(|origin| DriverTag { origin, epoch });
            computer.compute_expression(map);
            map.current = None;
            continue;
        }
        match comp {
            // handled through seeding and the bundle map
            Component::Pin(_) | Component::Splitter(_) | Component::Tunnel(_) | Component::Wire(_) => {}
            _ => {
                return Err(GatesimError::CannotHandle {
                    component: comp.kind_name().to_string(),
                })
            }
        }
    }
    Ok(())
}

/// Copy each point's expression to every point sharing its thread.
fn propagate_wires(map: &mut SymbolicMap<'_>, points: &BTreeSet<(Location, usize)>, epoch: usize) -> Result<()> {
    let bundles = map.circuit.bundle_map();
    if !bundles.is_valid() {
        return Ok(());
    }
    for &(loc, bit) in points {
        let Some(expr) = map.values.get(&(loc, bit)).cloned() else {
            continue;
        };
        let Some(bundle) = bundles.bundle_at(loc) else {
            continue;
        };
        let Some(threads) = bundle.threads.as_ref().filter(|_| bundle.is_valid()) else {
            continue;
        };
        let thread = *threads.get(bit).ok_or_else(|| GatesimError::CannotHandle {
            component: "incompatible widths".to_string(),
        })?;
        let tag = map.drivers.get(&(loc, bit)).map(|t| DriverTag { epoch, ..*t });

        for tb in bundles.thread_bundles(thread) {
            for &p2 in &bundles.bundle(tb.bundle).points {
                if p2 == loc {
                    continue;
                }
                let target = (p2, tb.bit);
                if let (Some(old), Some(old_tag)) = (map.values.get(&target), map.drivers.get(&target)) {
                    match tag {
                        Some(t) if t.origin == old_tag.origin => {
                            // an older pass of the same driver never overrides a newer one
                            if old_tag.epoch > t.epoch {
                                continue;
                            }
                        }
                        _ if *old != expr => {
                            trace!(%p2, bit = tb.bit, "conflicting drivers");
                            return Err(GatesimError::Conflict);
                        }
                        _ => {}
                    }
                }
                map.store(target, expr.clone(), tag);
            }
        }
    }
    Ok(())
}

/// Build a truth table by simulating every input combination.
///
/// Rows whose simulation oscillates have every output set to
/// [`Entry::OscillateError`].
pub fn compute_table(circuit: &Arc<Circuit>, labels: &[(Pin, String)], config: &SimulatorConfig) -> Result<TruthTable> {
    let (input_pins, output_pins): (Vec<_>, Vec<_>) = labels.iter().partition(|(p, _)| p.is_input());
    let inputs: Vec<Var> = input_pins.iter().map(|(p, l)| Var::new(l.clone(), p.width.bits())).collect();
    let outputs: Vec<Var> = output_pins.iter().map(|(p, l)| Var::new(l.clone(), p.width.bits())).collect();

    let input_count: usize = inputs.iter().map(|v| v.width).sum();
    if input_count > MAX_TABLE_INPUTS {
        return Err(GatesimError::TooManyInputs {
            bits: input_count,
            limit: MAX_TABLE_INPUTS,
        });
    }
    let output_count: usize = outputs.iter().map(|v| v.width).sum();
    let row_count = 1usize << input_count;
    debug!(circuit = circuit.name(), rows = row_count, "computing truth table");

    let mut rows = Vec::with_capacity(row_count);
    for row in 0..row_count {
        let mut prop = Propagator::with_config(Arc::clone(circuit), config.clone());
        let mut column = 0;
        for (pin, _) in &input_pins {
            let width = pin.width.bits();
            let mut bits = vec![Value::FALSE; width];
            for b in (0..width).rev() {
                bits[b] = Value::from_bool(is_input_set(row, column, input_count));
                column += 1;
            }
            prop.set_pin(pin.id, Value::from_bits(&bits))?;
        }
        prop.propagate();

        if prop.is_oscillating() {
            rows.push(vec![Entry::OscillateError; output_count]);
            continue;
        }
        let mut entries = Vec::with_capacity(output_count);
        for (pin, _) in &output_pins {
            let value = prop.pin_value(pin.id).unwrap_or(Value::NIL);
            for b in (0..pin.width.bits()).rev() {
                entries.push(match value.bit_state(b) {
                    BitState::One => Entry::One,
                    BitState::Zero => Entry::Zero,
                    BitState::Error => Entry::BusError,
                    BitState::Unknown => Entry::DontCare,
                });
            }
        }
        rows.push(entries);
    }

    Ok(TruthTable::new(inputs, outputs, rows))
}
