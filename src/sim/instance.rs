//! The view a component gets of the simulation while it propagates.

use super::propagator::Propagator;
use super::state::{ComponentData, StateId};
use crate::circuit::{Location, Value};
use crate::components::{Component, SubcircuitInstance, DEFAULT_DELAY};

/// One component inside one circuit state.
pub struct InstanceState<'a> {
    prop: &'a mut Propagator,
    state: StateId,
    component: &'a Component,
}

impl<'a> InstanceState<'a> {
    pub(crate) fn new(prop: &'a mut Propagator, state: StateId, component: &'a Component) -> Self {
        Self {
            prop,
            state,
            component,
        }
    }

    pub fn state_id(&self) -> StateId {
        self.state
    }

    fn port_location(&self, port: usize) -> Option<Location> {
        self.component.ends().get(port).map(|e| e.loc)
    }

    /// Wire-resolved value at a port; NIL for a port the component lacks.
    pub fn port_value(&self, port: usize) -> Value {
        match self.port_location(port) {
            Some(loc) => self.prop.state(self.state).value_at(loc),
            None => Value::NIL,
        }
    }

    /// Whether anything else has an end at the port.
    pub fn is_port_connected(&self, port: usize) -> bool {
        match self.port_location(port) {
            Some(loc) => self
                .prop
                .state(self.state)
                .circuit()
                .is_connected(loc, &self.component.key()),
            None => false,
        }
    }

    /// Drive a port after `delay` ticks.
    pub fn set_port(&mut self, port: usize, value: Value, delay: u32) {
        let (Some(loc), Some(id)) = (self.port_location(port), self.component.id()) else {
            return;
        };
        if self.component.is_wiring() {
            return;
        }
        let jitter = !matches!(self.component, Component::Subcircuit(_));
        self.prop.schedule(self.state, loc, Some(value), id, delay, jitter);
    }

    pub fn data(&self) -> Option<&ComponentData> {
        let id = self.component.id()?;
        self.prop.state(self.state).data(id)
    }

    pub fn set_data(&mut self, data: ComponentData) {
        if let Some(id) = self.component.id() {
            self.prop.state_mut(self.state).set_data(id, data);
        }
    }

    /// Half clock cycles elapsed since the last reset.
    pub fn tick_count(&self) -> u32 {
        self.prop.tick_count()
    }

    /// Copy parent port values onto the child's input pins, and the child's
    /// output pins onto the parent ports.
    pub fn propagate_subcircuit(&mut self, sub: &SubcircuitInstance) {
        let child = self.prop.ensure_substate(self.state, sub);
        for (port, pin) in sub.port_pins().iter().enumerate() {
            if pin.is_input() {
                let seen = self.port_value(port);
                let value = if seen.is_nil() {
                    Value::unknown(pin.width)
                } else {
                    seen
                };
                let child_state = self.prop.state_mut(child);
                if child_state.data(pin.id) != Some(&ComponentData::Pin(value)) {
                    child_state.set_data(pin.id, ComponentData::Pin(value));
                    child_state.mark_component_dirty(pin.id);
                }
            } else {
                let value = self.prop.state(child).value_at(pin.loc);
                self.set_port(port, value, DEFAULT_DELAY);
            }
        }
    }
}
