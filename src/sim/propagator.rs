//! Discrete-event propagation engine.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace, warn};

use super::instance::InstanceState;
use super::points::PropagationPoints;
use super::state::{CircuitState, ComponentData, StateId};
use crate::circuit::{Circuit, ComponentId, Location, Value};
use crate::components::{Component, SubcircuitInstance};
use crate::error::{GatesimError, Result};
use crate::DEFAULT_ITERATION_LIMIT;

/// Configuration for the propagator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Time slots processed by one `propagate` before declaring oscillation.
    pub iteration_limit: usize,
    /// On average one event in `sim_rand` is delayed one extra tick.
    /// Zero disables jitter.
    pub sim_rand: u32,
    /// Seed for the jitter source; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            sim_rand: 0,
            seed: None,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.iteration_limit = iteration_limit.max(1);
        self
    }

    /// Enable jitter. The rate is rounded up to a power of two.
    pub fn with_jitter(mut self, sim_rand: u32) -> Self {
        self.sim_rand = sim_rand;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// log2 of the jitter rate, rounded up.
    pub fn random_shift(&self) -> u32 {
        let mut shift = 0;
        while shift < 16 && (1u32 << shift) < self.sim_rand {
            shift += 1;
        }
        shift
    }
}

/// One scheduled value change.
///
/// Events order by time, then by insertion serial. Both comparisons use
/// wrapping differences, so ordering survives counter overflow as long as
/// pending events span less than half the counter range.
#[derive(Debug, Clone)]
pub struct SetData {
    pub time: u32,
    pub serial: u32,
    pub state: StateId,
    pub cause: ComponentId,
    pub loc: Location,
    /// `None` withdraws the cause.
    pub value: Option<Value>,
}

impl Ord for SetData {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time.wrapping_sub(other.time) as i32)
            .cmp(&0)
            .then((self.serial.wrapping_sub(other.serial) as i32).cmp(&0))
    }
}

impl PartialOrd for SetData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SetData {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SetData {}

/// Drives the state tree of one root circuit to quiescence.
///
/// States live in an arena indexed by [`StateId`]; the root is
/// [`StateId::ROOT`] and subcircuit states are created the first time their
/// component propagates. Slots of states whose subcircuit was removed or
/// re-bound to another child are reused.
pub struct Propagator {
    states: Vec<CircuitState>,
    free: Vec<StateId>,
    queue: BinaryHeap<Reverse<SetData>>,
    clock: u32,
    serial: u32,
    oscillating: bool,
    osc_points: PropagationPoints,
    half_clock_cycles: u32,
    rng: StdRng,
    random_shift: u32,
    noise_count: u32,
    config: SimulatorConfig,
}

impl Propagator {
    /// Create a new propagator for the given circuit with default configuration.
    pub fn new(circuit: Arc<Circuit>) -> Self {
        Self::with_config(circuit, SimulatorConfig::default())
    }

    /// Create a new propagator for the given circuit with custom configuration.
    pub fn with_config(circuit: Arc<Circuit>, config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            states: vec![CircuitState::new(circuit, None)],
            free: Vec::new(),
            queue: BinaryHeap::new(),
            clock: 0,
            serial: 0,
            oscillating: false,
            osc_points: PropagationPoints::new(),
            half_clock_cycles: 0,
            rng,
            random_shift: config.random_shift(),
            noise_count: 0,
            config,
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn circuit(&self) -> &Arc<Circuit> {
        self.states[StateId::ROOT.0].circuit()
    }

    pub fn state(&self, id: StateId) -> &CircuitState {
        &self.states[id.0]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut CircuitState {
        &mut self.states[id.0]
    }

    /// State of a subcircuit component inside `parent`, if it was created.
    pub fn substate(&self, parent: StateId, component: ComponentId) -> Option<StateId> {
        self.states[parent.0].substate(component)
    }

    pub(crate) fn ensure_substate(&mut self, parent: StateId, sub: &SubcircuitInstance) -> StateId {
        if let Some(id) = self.states[parent.0].substate(sub.id) {
            if Arc::ptr_eq(self.states[id.0].circuit(), sub.child()) {
                return id;
            }
            self.release(id);
        }
        let state = CircuitState::new(Arc::clone(sub.child()), Some((parent, sub.id)));
        let id = match self.free.pop() {
            Some(id) => {
                self.states[id.0] = state;
                id
            }
            None => {
                self.states.push(state);
                StateId(self.states.len() - 1)
            }
        };
        debug!(parent = %parent, child = sub.child().name(), state = %id, "creating subcircuit state");
        self.states[parent.0].substates.insert(sub.id, id);
        id
    }

    /// Free the slot of `id` and of every state below it, dropping their
    /// pending events.
    fn release(&mut self, id: StateId) {
        let mut freed = HashSet::new();
        let mut pending = vec![id];
        while let Some(s) = pending.pop() {
            let state = &mut self.states[s.0];
            pending.extend(state.substates.values().copied());
            pending.extend(state.take_released());
            state.reset();
            if freed.insert(s) {
                self.free.push(s);
            }
        }
        self.queue.retain(|Reverse(d)| !freed.contains(&d.state));
        trace!(state = %id, freed = freed.len(), "released subcircuit states");
    }

    /// Number of live circuit states, the root included.
    pub fn state_count(&self) -> usize {
        self.states.len() - self.free.len()
    }

    pub fn is_oscillating(&self) -> bool {
        self.oscillating
    }

    /// Points touched during the last stretch of an oscillating run.
    pub fn oscillation_points(&self) -> &PropagationPoints {
        &self.osc_points
    }

    /// Half clock cycles since the last reset.
    pub fn tick_count(&self) -> u32 {
        self.half_clock_cycles
    }

    pub fn is_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Schedule `value` at `loc`, driven by `cause`, `delay` ticks from now
    /// (at least one). `None` withdraws the cause.
    pub fn set_value(&mut self, state: StateId, loc: Location, value: Option<Value>, cause: ComponentId, delay: u32) {
        self.schedule(state, loc, value, cause, delay, true);
    }

    pub(crate) fn schedule(
        &mut self,
        state: StateId,
        loc: Location,
        value: Option<Value>,
        cause: ComponentId,
        delay: u32,
        jitter: bool,
    ) {
        let mut delay = delay.max(1);
        if self.random_shift > 0 {
            delay <<= self.random_shift;
            if jitter {
                if self.noise_count > 0 {
                    self.noise_count -= 1;
                } else {
                    delay += 1;
                    self.noise_count = self.rng.gen_range(0..1u32 << self.random_shift);
                }
            }
        }
        let data = SetData {
            time: self.clock.wrapping_add(delay),
            serial: self.serial,
            state,
            cause,
            loc,
            value,
        };
        trace!(time = data.time, state = %state, %loc, %cause, value = ?value, "scheduled");
        self.serial = self.serial.wrapping_add(1);
        self.queue.push(Reverse(data));
    }

    /// Run until no event is pending or the iteration limit is reached.
    ///
    /// Returns whether anything was processed. Oscillation is reported
    /// through [`Self::is_oscillating`] and [`Self::oscillation_points`].
    pub fn propagate(&mut self) -> bool {
        self.osc_points.clear();
        self.settle();

        let limit = self.config.iteration_limit;
        let record_from = 3 * limit / 4;
        let mut iters = 0;
        while !self.queue.is_empty() {
            iters += 1;
            if iters < record_from {
                self.step_internal(false, None);
            } else if iters < limit {
                self.step_internal(true, None);
            } else {
                warn!(
                    circuit = self.circuit().name(),
                    points = self.osc_points.len(),
                    "oscillation detected"
                );
                self.oscillating = true;
                return true;
            }
        }
        self.oscillating = false;
        self.osc_points.clear();
        iters > 0
    }

    /// Process exactly one time slot. Touched points go to `changed`.
    pub fn step(&mut self, changed: Option<&mut PropagationPoints>) -> bool {
        self.osc_points.clear();
        self.settle();
        if self.queue.is_empty() {
            return false;
        }
        self.step_internal(false, changed);
        true
    }

    fn step_internal(&mut self, record: bool, mut changed: Option<&mut PropagationPoints>) {
        let Some(Reverse(head)) = self.queue.peek() else {
            return;
        };
        self.clock = head.time;

        let mut visited: HashSet<(StateId, ComponentId, Location)> = HashSet::new();
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.time != self.clock {
                break;
            }
            let Some(Reverse(data)) = self.queue.pop() else {
                break;
            };
            // the first event per cause and point wins within one slot
            if !visited.insert((data.state, data.cause, data.loc)) {
                continue;
            }
            if record {
                self.osc_points.add(data.state, data.loc);
            }
            if let Some(points) = changed.as_deref_mut() {
                points.add(data.state, data.loc);
            }
            let state = &mut self.states[data.state.0];
            if state.set_cause(data.loc, data.cause, data.value) {
                state.mark_point_dirty(data.loc);
            }
        }
        self.settle();
    }

    /// Resolve dirty points and re-evaluate dirty components across the
    /// whole state tree until nothing is dirty.
    fn settle(&mut self) {
        loop {
            self.process_dirty_points(StateId::ROOT);
            self.process_dirty_components(StateId::ROOT);
            if !self.any_dirty_components(StateId::ROOT) {
                break;
            }
        }
    }

    fn any_dirty_components(&self, id: StateId) -> bool {
        let state = &self.states[id.0];
        state.has_dirty_components() || state.substates.values().any(|&s| self.any_dirty_components(s))
    }

    fn process_dirty_points(&mut self, id: StateId) {
        self.states[id.0].process_dirty_points();
        for gone in self.states[id.0].take_released() {
            self.release(gone);
        }
        let subs: Vec<StateId> = self.states[id.0].substates.values().copied().collect();
        for sub in subs {
            self.process_dirty_points(sub);
        }
    }

    fn process_dirty_components(&mut self, id: StateId) {
        let dirty = self.states[id.0].take_dirty_components();
        if !dirty.is_empty() {
            let circuit = Arc::clone(self.states[id.0].circuit());
            let parent = self.states[id.0].parent();
            for cid in dirty {
                let Some(comp) = circuit.component(cid) else {
                    continue;
                };
                comp.propagate(&mut InstanceState::new(self, id, &comp));
                if let (Component::Pin(pin), Some((parent, sub))) = (&comp, parent) {
                    if !pin.is_input() {
                        self.propagate_component(parent, sub);
                    }
                }
            }
        }
        let subs: Vec<StateId> = self.states[id.0].substates.values().copied().collect();
        for sub in subs {
            self.process_dirty_components(sub);
        }
    }

    fn propagate_component(&mut self, state: StateId, id: ComponentId) {
        let circuit = Arc::clone(self.states[state.0].circuit());
        if let Some(comp) = circuit.component(id) {
            comp.propagate(&mut InstanceState::new(self, state, &comp));
        }
    }

    /// Advance every clock in the state tree by half a cycle.
    ///
    /// Returns whether any clock exists.
    pub fn toggle_clocks(&mut self) -> bool {
        self.half_clock_cycles = self.half_clock_cycles.wrapping_add(1);
        self.toggle_clocks_in(StateId::ROOT)
    }

    fn toggle_clocks_in(&mut self, id: StateId) -> bool {
        let ticks = self.half_clock_cycles;
        let circuit = Arc::clone(self.states[id.0].circuit());
        let mut found = false;
        for comp in circuit.non_wires() {
            if let Component::Clock(clock) = &comp {
                found = true;
                let state = &mut self.states[id.0];
                state.set_data(clock.id, ComponentData::Clock(clock.value_at_tick(ticks)));
                state.mark_component_dirty(clock.id);
            }
        }
        let subs: Vec<StateId> = self.states[id.0].substates.values().copied().collect();
        for sub in subs {
            found |= self.toggle_clocks_in(sub);
        }
        found
    }

    /// Drop every value and pending event, as if freshly created.
    pub fn reset(&mut self) {
        self.half_clock_cycles = 0;
        self.queue.clear();
        self.states.truncate(1);
        self.free.clear();
        self.states[StateId::ROOT.0].reset();
        self.oscillating = false;
        self.osc_points.clear();
        self.noise_count = 0;
    }

    // ---- convenience accessors on the root state ----

    pub fn value_at(&self, state: StateId, loc: Location) -> Value {
        self.states[state.0].value_at(loc)
    }

    pub fn component_output_at(&self, state: StateId, loc: Location) -> Value {
        self.states[state.0].component_output_at(loc)
    }

    pub fn causes_at(&self, state: StateId, loc: Location) -> &[(ComponentId, Value)] {
        self.states[state.0].causes_at(loc)
    }

    /// Set the value driven by an input pin of the root circuit.
    pub fn set_pin(&mut self, pin: ComponentId, value: Value) -> Result<()> {
        let root = &mut self.states[StateId::ROOT.0];
        match root.circuit().component(pin) {
            Some(Component::Pin(p)) if p.is_input() => {
                root.set_data(pin, ComponentData::Pin(value));
                root.mark_component_dirty(pin);
                Ok(())
            }
            _ => Err(GatesimError::UnknownComponent {
                component: format!("input pin {}", pin),
                circuit: root.circuit().name().to_string(),
            }),
        }
    }

    /// Value on the wire at a root circuit pin.
    pub fn pin_value(&self, pin: ComponentId) -> Option<Value> {
        let root = &self.states[StateId::ROOT.0];
        match root.circuit().component(pin) {
            Some(Component::Pin(p)) => Some(root.value_at(p.loc)),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("circuit", &self.circuit().name())
            .field("states", &self.states.len())
            .field("pending", &self.queue.len())
            .field("clock", &self.clock)
            .field("oscillating", &self.oscillating)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BitWidth, Wire};
    use crate::components::{Clock, Gate, GateKind, Pin, Splitter};
    use crate::project::SimContext;
    use crate::txn::{ReplacementMap, Transaction};

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn wire(a: (i32, i32), b: (i32, i32)) -> Component {
        Component::Wire(Wire::new(a.into(), b.into()).unwrap())
    }

    fn build(ctx: &SimContext, name: &str, comps: Vec<Component>) -> Arc<Circuit> {
        let c = Circuit::new(name, ctx);
        Transaction::new(format!("build {}", name))
            .write(&c)
            .run(|m| {
                for comp in comps {
                    m.add(&c, comp)?;
                }
                Ok(())
            })
            .unwrap();
        c
    }

    fn and_circuit(ctx: &SimContext) -> Arc<Circuit> {
        build(
            ctx,
            "and",
            vec![
                Component::Pin(Pin::input(ComponentId(1), loc(0, 0), BitWidth::ONE, Some("A".into()))),
                Component::Pin(Pin::input(ComponentId(2), loc(0, 20), BitWidth::ONE, Some("B".into()))),
                Component::Gate(
                    Gate::new(ComponentId(3), GateKind::And, BitWidth::ONE, loc(40, 10), vec![loc(20, 0), loc(20, 20)]).unwrap(),
                ),
                Component::Pin(Pin::output(ComponentId(4), loc(60, 10), BitWidth::ONE, Some("Y".into()))),
                wire((0, 0), (20, 0)),
                wire((0, 20), (20, 20)),
                wire((40, 10), (60, 10)),
            ],
        )
    }

    #[test]
    fn test_set_data_ordering_wraps() {
        let ev = |time: u32, serial: u32| SetData {
            time,
            serial,
            state: StateId::ROOT,
            cause: ComponentId(0),
            loc: loc(0, 0),
            value: None,
        };
        assert!(ev(1, 0) < ev(2, 0));
        assert!(ev(u32::MAX, 0) < ev(1, 0));
        assert!(ev(5, u32::MAX) < ev(5, 0));
        assert!(ev(5, 3) < ev(5, 4));

        let mut heap = BinaryHeap::new();
        for (t, s) in [(3, 0), (1, 2), (1, 1), (2, 3)] {
            heap.push(Reverse(ev(t, s)));
        }
        let order: Vec<(u32, u32)> = std::iter::from_fn(|| heap.pop().map(|Reverse(e)| (e.time, e.serial))).collect();
        assert_eq!(order, vec![(1, 1), (1, 2), (2, 3), (3, 0)]);
    }

    #[test]
    fn test_random_shift_rounds_up() {
        assert_eq!(SimulatorConfig::new().random_shift(), 0);
        assert_eq!(SimulatorConfig::new().with_jitter(1).random_shift(), 0);
        assert_eq!(SimulatorConfig::new().with_jitter(2).random_shift(), 1);
        assert_eq!(SimulatorConfig::new().with_jitter(5).random_shift(), 3);
        assert_eq!(SimulatorConfig::new().with_jitter(64).random_shift(), 6);
    }

    #[test]
    fn test_and_gate_settles() {
        let ctx = SimContext::new().unwrap();
        let c = and_circuit(&ctx);
        let mut prop = Propagator::new(c);
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(4)), Some(Value::FALSE));

        prop.set_pin(ComponentId(1), Value::TRUE).unwrap();
        prop.set_pin(ComponentId(2), Value::TRUE).unwrap();
        assert!(prop.propagate());
        assert!(!prop.is_oscillating());
        assert!(!prop.is_pending());
        assert_eq!(prop.pin_value(ComponentId(4)), Some(Value::TRUE));

        assert!(prop.set_pin(ComponentId(4), Value::TRUE).is_err());
        assert!(prop.set_pin(ComponentId(3), Value::TRUE).is_err());
    }

    #[test]
    fn test_inverter_loop_oscillates() {
        let ctx = SimContext::new().unwrap();
        let c = build(
            &ctx,
            "ring",
            vec![
                Component::Gate(Gate::new(ComponentId(1), GateKind::Not, BitWidth::ONE, loc(30, 0), vec![loc(10, 0)]).unwrap()),
                wire((10, 0), (30, 0)),
            ],
        );
        let mut prop = Propagator::new(c);
        assert!(prop.propagate());
        assert!(prop.is_oscillating());
        assert!(prop.oscillation_points().contains(StateId::ROOT, loc(30, 0)));
        assert!(prop.is_pending());

        prop.reset();
        assert!(!prop.is_oscillating());
        assert!(!prop.is_pending());
    }

    #[test]
    fn test_replay_is_deterministic() {
        let ctx = SimContext::new().unwrap();
        let c = and_circuit(&ctx);
        let run = |config: SimulatorConfig| {
            let mut prop = Propagator::with_config(Arc::clone(&c), config);
            for (i, v) in [Value::TRUE, Value::FALSE, Value::TRUE, Value::TRUE].into_iter().enumerate() {
                prop.set_value(StateId::ROOT, loc(20, 0), Some(v), ComponentId(90 + i as u64 % 2), 1 + i as u32 % 3);
                prop.set_value(StateId::ROOT, loc(20, 20), Some(v.not()), ComponentId(92), 2);
            }
            let osc = prop.propagate();
            let causes: Vec<_> = [loc(20, 0), loc(20, 20), loc(40, 10)]
                .iter()
                .map(|&p| prop.causes_at(StateId::ROOT, p).to_vec())
                .collect();
            (osc, prop.is_oscillating(), causes, prop.pin_value(ComponentId(4)))
        };
        let plain = run(SimulatorConfig::new());
        assert_eq!(plain, run(SimulatorConfig::new()));
        let seeded = run(SimulatorConfig::new().with_jitter(4).with_seed(7));
        assert_eq!(seeded, run(SimulatorConfig::new().with_jitter(4).with_seed(7)));
    }

    #[test]
    fn test_splitter_routes_nibble() {
        let ctx = SimContext::new().unwrap();
        let split = Splitter::new(ComponentId(3), loc(0, 0), vec![loc(20, 0), loc(20, 10)], 8, None).unwrap();
        let c = build(
            &ctx,
            "split",
            vec![
                Component::Pin(Pin::input(ComponentId(1), loc(40, 0), BitWidth::new(4), None)),
                Component::Pin(Pin::output(ComponentId(2), loc(-20, 0), BitWidth::new(8), None)),
                Component::Splitter(split),
                wire((20, 0), (40, 0)),
                wire((-20, 0), (0, 0)),
            ],
        );
        let mut prop = Propagator::new(Arc::clone(&c));
        prop.set_pin(ComponentId(1), Value::known(BitWidth::new(4), 0b1010)).unwrap();
        prop.propagate();
        let seen = prop.pin_value(ComponentId(2)).unwrap();
        // the upper nibble's split end is undriven
        assert_eq!(seen.to_string(), "xxxx1010");

        Transaction::new("remap")
            .write(&c)
            .run(|m| m.set_splitter_mapping(&c, ComponentId(3), vec![1, 1, 1, 1, 2, 2, 2, 0]))
            .unwrap();
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(2)).unwrap().to_string(), "xxxx1010");
    }

    #[test]
    fn test_clock_drives_output() {
        let ctx = SimContext::new().unwrap();
        let clock = Clock {
            id: ComponentId(1),
            loc: loc(0, 0),
            high: 1,
            low: 1,
        };
        let c = build(
            &ctx,
            "clocked",
            vec![
                Component::Clock(clock),
                Component::Pin(Pin::output(ComponentId(2), loc(20, 0), BitWidth::ONE, None)),
                wire((0, 0), (20, 0)),
            ],
        );
        let mut prop = Propagator::new(c);
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(2)), Some(Value::FALSE));
        let mut seen = Vec::new();
        for _ in 0..4 {
            assert!(prop.toggle_clocks());
            prop.propagate();
            seen.push(prop.pin_value(ComponentId(2)).unwrap().to_string());
        }
        assert_eq!(seen, vec!["1", "0", "1", "0"]);
        assert_eq!(prop.tick_count(), 4);
    }

    fn inverter(ctx: &SimContext) -> Arc<Circuit> {
        build(
            ctx,
            "inv",
            vec![
                Component::Pin(Pin::input(ComponentId(1), loc(0, 0), BitWidth::ONE, None)),
                Component::Gate(Gate::new(ComponentId(2), GateKind::Not, BitWidth::ONE, loc(30, 0), vec![loc(10, 0)]).unwrap()),
                Component::Pin(Pin::output(ComponentId(3), loc(50, 0), BitWidth::ONE, None)),
                wire((0, 0), (10, 0)),
                wire((30, 0), (50, 0)),
            ],
        )
    }

    /// An inverter child ("inv": in 1, out 3) placed in "top" (in 10, out 11).
    fn inverter_in_top(ctx: &SimContext) -> (Arc<Circuit>, Arc<Circuit>) {
        let child = inverter(ctx);
        let sub = SubcircuitInstance::new(ComponentId(12), Arc::clone(&child), vec![loc(100, 0), loc(140, 0)]).unwrap();
        let top = build(
            ctx,
            "top",
            vec![
                Component::Pin(Pin::input(ComponentId(10), loc(80, 0), BitWidth::ONE, None)),
                Component::Pin(Pin::output(ComponentId(11), loc(160, 0), BitWidth::ONE, None)),
                Component::Subcircuit(sub),
                wire((80, 0), (100, 0)),
                wire((140, 0), (160, 0)),
            ],
        );
        (child, top)
    }

    #[test]
    fn test_subcircuit_inverts() {
        let ctx = SimContext::new().unwrap();
        let (_, top) = inverter_in_top(&ctx);
        let mut prop = Propagator::new(top);
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::TRUE));
        let inner = prop.substate(StateId::ROOT, ComponentId(12)).unwrap();
        assert_eq!(prop.value_at(inner, loc(10, 0)), Value::FALSE);

        prop.set_pin(ComponentId(10), Value::TRUE).unwrap();
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::FALSE));
        assert_eq!(prop.value_at(inner, loc(50, 0)), Value::FALSE);
    }

    #[test]
    fn test_replaced_child_pin_stays_bound() {
        let ctx = SimContext::new().unwrap();
        let (child, top) = inverter_in_top(&ctx);
        let mut prop = Propagator::new(Arc::clone(&top));
        prop.set_pin(ComponentId(10), Value::TRUE).unwrap();
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::FALSE));

        let old = child.component(ComponentId(1)).unwrap();
        let new = Component::Pin(Pin::input(ComponentId(9), loc(0, 0), BitWidth::ONE, None));
        Transaction::new("swap input pin")
            .write(&child)
            .run(|m| m.replace(&child, &ReplacementMap::single(old, new)))
            .unwrap();
        let ports: Vec<ComponentId> = child.port_pins().iter().map(|p| p.id).collect();
        assert_eq!(ports, vec![ComponentId(9), ComponentId(3)]);

        // the running instance now drives pin 9 from the parent port
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::FALSE));
        prop.set_pin(ComponentId(10), Value::FALSE).unwrap();
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::TRUE));

        // and a fresh simulation of the edited hierarchy agrees
        let mut fresh = Propagator::new(top);
        fresh.set_pin(ComponentId(10), Value::TRUE).unwrap();
        fresh.propagate();
        assert_eq!(fresh.pin_value(ComponentId(11)), Some(Value::FALSE));
    }

    #[test]
    fn test_rebound_subcircuit_reuses_state_slots() {
        let ctx = SimContext::new().unwrap();
        let (_, top) = inverter_in_top(&ctx);
        let mut prop = Propagator::new(Arc::clone(&top));
        prop.set_pin(ComponentId(10), Value::TRUE).unwrap();
        prop.propagate();
        assert_eq!(prop.state_count(), 2);

        for round in 0..4 {
            // same component id, new child circuit
            let old = top.component(ComponentId(12)).unwrap();
            let sub = SubcircuitInstance::new(ComponentId(12), inverter(&ctx), vec![loc(100, 0), loc(140, 0)]).unwrap();
            Transaction::new(format!("rebind {}", round))
                .write(&top)
                .run(|m| m.replace(&top, &ReplacementMap::single(old, Component::Subcircuit(sub))))
                .unwrap();
            prop.propagate();
            assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::FALSE));
            assert_eq!(prop.states.len(), 2);
        }

        let old = top.component(ComponentId(12)).unwrap();
        Transaction::new("remove instance")
            .write(&top)
            .run(|m| m.remove(&top, &old))
            .unwrap();
        prop.propagate();
        assert_eq!(prop.state_count(), 1);
        assert!(prop.substate(StateId::ROOT, ComponentId(12)).is_none());

        Transaction::new("restore instance")
            .write(&top)
            .run(|m| m.add(&top, old.clone()))
            .unwrap();
        prop.propagate();
        assert_eq!(prop.pin_value(ComponentId(11)), Some(Value::FALSE));
        assert_eq!(prop.states.len(), 2);
        assert_eq!(prop.state_count(), 2);
    }

    #[test]
    fn test_single_step_records_points() {
        let ctx = SimContext::new().unwrap();
        let c = and_circuit(&ctx);
        let mut prop = Propagator::new(c);
        let mut changed = PropagationPoints::new();
        assert!(prop.step(Some(&mut changed)));
        // input pins and the gate all fire in the first slot
        assert!(changed.contains(StateId::ROOT, loc(0, 0)));
        assert!(changed.contains(StateId::ROOT, loc(40, 10)));
        while prop.step(None) {}
        assert!(!prop.is_pending());
        assert!(!prop.step(None));
    }

    #[test]
    fn test_removed_component_loses_its_causes() {
        let ctx = SimContext::new().unwrap();
        let c = and_circuit(&ctx);
        let mut prop = Propagator::new(Arc::clone(&c));
        prop.propagate();
        assert_eq!(prop.causes_at(StateId::ROOT, loc(40, 10)).len(), 1);

        Transaction::new("remove gate")
            .write(&c)
            .run(|m| {
                let gate = c.component(ComponentId(3)).unwrap();
                m.remove(&c, &gate)
            })
            .unwrap();
        prop.propagate();
        assert!(prop.causes_at(StateId::ROOT, loc(40, 10)).is_empty());
        assert_eq!(prop.pin_value(ComponentId(4)).unwrap().to_string(), "x");
    }
}
