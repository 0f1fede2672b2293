//! Runtime values of one circuit along one instantiation path.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::circuit::{Circuit, ComponentId, Location, Value};
use crate::components::Component;
use crate::wires::{BundleId, BundleMap, ThreadId};

/// Index of a [`CircuitState`] inside its propagator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub usize);

impl StateId {
    pub const ROOT: StateId = StateId(0);
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

/// Per-component runtime data kept across propagations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentData {
    /// Value driven by an input pin, or last seen by an output pin.
    Pin(Value),
    /// Current clock phase.
    Clock(Value),
}

/// Thread values derived from one bundle map.
#[derive(Debug)]
struct WireData {
    map: Arc<BundleMap>,
    thread_values: HashMap<ThreadId, Value>,
}

/// Value holder for one circuit instance.
///
/// `causes` records what each component drives at each point; `values`
/// records what the wiring makes of it. Dirty points are re-resolved through
/// the bundle map; dirty components are re-evaluated by the propagator.
#[derive(Debug)]
pub struct CircuitState {
    circuit: Arc<Circuit>,
    parent: Option<(StateId, ComponentId)>,
    pub(crate) substates: BTreeMap<ComponentId, StateId>,
    released: Vec<StateId>,
    causes: BTreeMap<Location, Vec<(ComponentId, Value)>>,
    values: BTreeMap<Location, Value>,
    wire_data: Option<WireData>,
    pub(crate) component_data: HashMap<ComponentId, ComponentData>,
    dirty_points: BTreeSet<Location>,
    dirty_components: BTreeSet<ComponentId>,
    seen_generation: u64,
}

impl CircuitState {
    pub(crate) fn new(circuit: Arc<Circuit>, parent: Option<(StateId, ComponentId)>) -> Self {
        let mut state = Self {
            seen_generation: circuit.generation(),
            circuit,
            parent,
            substates: BTreeMap::new(),
            released: Vec::new(),
            causes: BTreeMap::new(),
            values: BTreeMap::new(),
            wire_data: None,
            component_data: HashMap::new(),
            dirty_points: BTreeSet::new(),
            dirty_components: BTreeSet::new(),
        };
        state.mark_all_components_dirty();
        state
    }

    pub fn circuit(&self) -> &Arc<Circuit> {
        &self.circuit
    }

    /// Parent state and the subcircuit component this state instantiates.
    pub fn parent(&self) -> Option<(StateId, ComponentId)> {
        self.parent
    }

    pub fn substate(&self, component: ComponentId) -> Option<StateId> {
        self.substates.get(&component).copied()
    }

    /// Combined output of every component driving `loc`; NIL when none does.
    pub fn component_output_at(&self, loc: Location) -> Value {
        self.causes
            .get(&loc)
            .map(|causes| causes.iter().fold(Value::NIL, |acc, (_, v)| acc.combine(v)))
            .unwrap_or(Value::NIL)
    }

    pub fn causes_at(&self, loc: Location) -> &[(ComponentId, Value)] {
        self.causes.get(&loc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every point with at least one cause.
    pub fn driven_points(&self) -> impl Iterator<Item = Location> + '_ {
        self.causes.keys().copied()
    }

    /// Value at a point as resolved by the wiring. Points never reached read
    /// as floating at the point's width.
    pub fn value_at(&self, loc: Location) -> Value {
        match self.values.get(&loc) {
            Some(v) => *v,
            None => Value::unknown(self.circuit.width(loc)),
        }
    }

    pub fn value_by_wire(&self, loc: Location) -> Option<Value> {
        self.values.get(&loc).copied()
    }

    pub fn data(&self, component: ComponentId) -> Option<&ComponentData> {
        self.component_data.get(&component)
    }

    pub(crate) fn set_data(&mut self, component: ComponentId, data: ComponentData) {
        self.component_data.insert(component, data);
    }

    pub fn mark_point_dirty(&mut self, loc: Location) {
        self.dirty_points.insert(loc);
    }

    pub fn mark_component_dirty(&mut self, component: ComponentId) {
        self.dirty_components.insert(component);
    }

    pub fn has_dirty_components(&self) -> bool {
        !self.dirty_components.is_empty()
    }

    fn mark_all_components_dirty(&mut self) {
        self.dirty_components
            .extend(self.circuit.non_wires().iter().filter_map(Component::id));
    }

    pub(crate) fn take_dirty_components(&mut self) -> BTreeSet<ComponentId> {
        std::mem::take(&mut self.dirty_components)
    }

    /// Update one cause at a point. `None` removes it. Returns whether the
    /// combined output at the point changed.
    pub(crate) fn set_cause(&mut self, loc: Location, cause: ComponentId, value: Option<Value>) -> bool {
        let old = self.component_output_at(loc);
        match value {
            Some(v) => {
                let causes = self.causes.entry(loc).or_default();
                match causes.iter_mut().find(|(c, _)| *c == cause) {
                    Some(entry) => entry.1 = v,
                    None => causes.push((cause, v)),
                }
            }
            None => {
                if let Some(causes) = self.causes.get_mut(&loc) {
                    causes.retain(|(c, _)| *c != cause);
                    if causes.is_empty() {
                        self.causes.remove(&loc);
                    }
                }
            }
        }
        self.component_output_at(loc) != old
    }

    /// Resolve dirty points through the wiring, after catching up with any
    /// structural change of the circuit.
    pub(crate) fn process_dirty_points(&mut self) {
        self.sync_generation();
        if self.dirty_points.is_empty() {
            return;
        }
        let points = std::mem::take(&mut self.dirty_points);
        self.propagate_wires(&points);
    }

    /// Drop causes and data of components that left the circuit, and mark
    /// everything for re-evaluation.
    fn sync_generation(&mut self) {
        let generation = self.circuit.generation();
        if generation == self.seen_generation {
            return;
        }
        debug!(
            circuit = self.circuit.name(),
            from = self.seen_generation,
            to = generation,
            "circuit changed under simulation"
        );
        self.seen_generation = generation;

        let present: BTreeMap<ComponentId, Component> = self
            .circuit
            .non_wires()
            .into_iter()
            .filter_map(|c| c.id().map(|id| (id, c)))
            .collect();

        self.dirty_points.extend(self.causes.keys().copied());
        self.dirty_points.extend(self.values.keys().copied());
        for (loc, causes) in self.causes.iter_mut() {
            causes.retain(|(id, _)| {
                present
                    .get(id)
                    .is_some_and(|c| c.ends().iter().any(|e| e.loc == *loc))
            });
        }
        self.causes.retain(|_, causes| !causes.is_empty());
        self.component_data.retain(|id, _| present.contains_key(id));
        let gone: Vec<ComponentId> = self
            .substates
            .keys()
            .filter(|id| !matches!(present.get(id), Some(Component::Subcircuit(_))))
            .copied()
            .collect();
        for id in gone {
            self.released.extend(self.substates.remove(&id));
        }
        self.dirty_components.extend(present.keys().copied());
    }

    /// Recompute wire-driven values at `points`.
    fn propagate_wires(&mut self, points: &BTreeSet<Location>) {
        let map = self.circuit.bundle_map();
        let mut dirty_threads: BTreeSet<ThreadId> = BTreeSet::new();

        let current = self
            .wire_data
            .as_ref()
            .is_some_and(|w| Arc::ptr_eq(&w.map, &map));
        if !current {
            // a new map invalidates every thread value
            self.wire_data = Some(WireData {
                map: Arc::clone(&map),
                thread_values: HashMap::new(),
            });
            for (_, bundle) in map.bundles() {
                if let (true, Some(threads)) = (bundle.is_valid(), &bundle.threads) {
                    dirty_threads.extend(threads.iter().copied());
                }
            }
        }

        for &loc in points {
            match map.bundle_at(loc) {
                None => {
                    let v = self.component_output_at(loc);
                    self.set_value_by_wire(loc, v);
                }
                Some(bundle) => match (&bundle.threads, bundle.is_valid()) {
                    (Some(threads), true) => dirty_threads.extend(threads.iter().copied()),
                    _ => {
                        for &p in &bundle.points {
                            self.set_value_by_wire(p, Value::NIL);
                        }
                    }
                },
            }
        }

        if dirty_threads.is_empty() {
            return;
        }

        let mut touched: BTreeSet<BundleId> = BTreeSet::new();
        let mut computed = Vec::with_capacity(dirty_threads.len());
        for thread in dirty_threads {
            computed.push((thread, self.thread_value(&map, thread)));
            touched.extend(map.thread_bundles(thread).iter().map(|tb| tb.bundle));
        }

        let mut updates: Vec<(Location, Value)> = Vec::new();
        if let Some(wire_data) = self.wire_data.as_mut() {
            wire_data.thread_values.extend(computed);
            for id in touched {
                let bundle = map.bundle(id);
                let Some(threads) = bundle.threads.as_ref().filter(|_| bundle.is_valid()) else {
                    continue;
                };
                let values: Option<Vec<Value>> = threads
                    .iter()
                    .map(|t| wire_data.thread_values.get(t).copied())
                    .collect();
                let Some(values) = values else {
                    continue;
                };
                let value = match values.as_slice() {
                    [single] => *single,
                    bits => Value::from_bits(bits),
                };
                updates.extend(bundle.points.iter().map(|&p| (p, value)));
            }
        }
        for (loc, value) in updates {
            self.set_value_by_wire(loc, value);
        }
    }

    /// Combined value of one bit everywhere it runs, after pull resistors.
    fn thread_value(&self, map: &BundleMap, thread: ThreadId) -> Value {
        let mut ret = Value::UNKNOWN;
        let mut pull = Value::UNKNOWN;
        for tb in map.thread_bundles(thread) {
            let bundle = map.bundle(tb.bundle);
            for &p in &bundle.points {
                let v = self.component_output_at(p);
                if !v.is_nil() {
                    ret = ret.combine(&v.get(tb.bit));
                }
            }
            if bundle.pull != Value::UNKNOWN {
                pull = pull.combine(&bundle.pull);
            }
        }
        if pull != Value::UNKNOWN {
            ret = ret.pull(&pull);
        }
        ret
    }

    /// Store a wire-driven value; NIL clears the point. A change wakes the
    /// non-wiring components with an end there.
    fn set_value_by_wire(&mut self, loc: Location, value: Value) {
        let changed = if value.is_nil() {
            self.values.remove(&loc).is_some()
        } else {
            self.values.insert(loc, value) != Some(value)
        };
        if changed {
            for comp in self.circuit.components_at(loc) {
                if let (false, Some(id)) = (comp.is_wiring(), comp.id()) {
                    self.dirty_components.insert(id);
                }
            }
        }
    }

    /// Substates dropped because their component left the circuit. The
    /// propagator frees their slots.
    pub(crate) fn take_released(&mut self) -> Vec<StateId> {
        std::mem::take(&mut self.released)
    }

    /// Forget every value, keeping only the circuit binding.
    pub(crate) fn reset(&mut self) {
        self.substates.clear();
        self.released.clear();
        self.causes.clear();
        self.values.clear();
        self.wire_data = None;
        self.component_data.clear();
        self.dirty_points.clear();
        self.dirty_components.clear();
        self.seen_generation = self.circuit.generation();
        self.mark_all_components_dirty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BitWidth, Wire};
    use crate::components::Pin;
    use crate::project::SimContext;
    use crate::txn::Transaction;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    #[test]
    fn test_causes_combine_and_remove() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("causes", &ctx);
        let mut state = CircuitState::new(c, None);
        let p = loc(10, 0);

        assert!(state.set_cause(p, ComponentId(1), Some(Value::TRUE)));
        assert!(!state.set_cause(p, ComponentId(2), Some(Value::UNKNOWN)));
        assert_eq!(state.component_output_at(p), Value::TRUE);
        assert!(state.set_cause(p, ComponentId(2), Some(Value::FALSE)));
        assert_eq!(state.component_output_at(p), Value::ERROR);

        assert!(state.set_cause(p, ComponentId(1), None));
        assert_eq!(state.causes_at(p), &[(ComponentId(2), Value::FALSE)]);
        state.set_cause(p, ComponentId(2), None);
        assert!(state.component_output_at(p).is_nil());
        assert_eq!(state.driven_points().count(), 0);
    }

    #[test]
    fn test_wire_values_follow_threads() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("wires", &ctx);
        let pull = crate::components::PullResistor {
            id: ComponentId(5),
            loc: loc(0, 40),
            pull: Value::TRUE,
        };
        Transaction::new("build")
            .write(&c)
            .run(|m| {
                m.add(&c, Component::Wire(Wire::new(loc(0, 0), loc(20, 0))?))?;
                m.add(&c, Component::Wire(Wire::new(loc(0, 40), loc(20, 40))?))?;
                m.add(&c, Component::PullResistor(pull.clone()))?;
                m.add(&c, Component::Pin(Pin::output(ComponentId(6), loc(20, 0), BitWidth::ONE, None)))?;
                m.add(&c, Component::Pin(Pin::output(ComponentId(7), loc(20, 40), BitWidth::ONE, None)))
            })
            .unwrap();

        let mut state = CircuitState::new(Arc::clone(&c), None);
        state.set_cause(loc(0, 0), ComponentId(1), Some(Value::TRUE));
        state.mark_point_dirty(loc(0, 0));
        state.process_dirty_points();
        assert_eq!(state.value_at(loc(20, 0)), Value::TRUE);
        // undriven but pulled up
        assert_eq!(state.value_at(loc(20, 40)), Value::TRUE);
        // unwired, undriven point reads floating at an unknown width
        assert!(state.value_at(loc(99, 99)).is_nil());
        assert_eq!(state.value_at(loc(0, 0)).width(), BitWidth::ONE);
    }
}
