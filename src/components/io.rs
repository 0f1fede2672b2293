//! Pins, constants and clocks.

use super::{EndData, EndKind, ExpressionComputer, ExpressionMap, DEFAULT_DELAY};
use crate::analyze::Expression;
use crate::circuit::{BitState, BitWidth, ComponentId, Location, Value};
use crate::sim::{ComponentData, InstanceState};

/// Whether a pin feeds the circuit or observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    Input,
    Output,
}

/// A circuit input or output. Pins also form a circuit's appearance ports.
#[derive(Debug, Clone)]
pub struct Pin {
    pub id: ComponentId,
    pub loc: Location,
    pub width: BitWidth,
    pub direction: PinDirection,
    pub label: Option<String>,
}

impl Pin {
    pub fn input(id: ComponentId, loc: Location, width: BitWidth, label: Option<String>) -> Self {
        Self {
            id,
            loc,
            width,
            direction: PinDirection::Input,
            label,
        }
    }

    pub fn output(id: ComponentId, loc: Location, width: BitWidth, label: Option<String>) -> Self {
        Self {
            id,
            loc,
            width,
            direction: PinDirection::Output,
            label,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PinDirection::Input
    }

    pub fn end(&self) -> EndData {
        let kind = if self.is_input() {
            EndKind::Output
        } else {
            EndKind::Input
        };
        EndData::new(self.loc, self.width, kind)
    }

    /// Value an input pin drives before anyone sets it.
    pub fn initial_value(&self) -> Value {
        Value::known(self.width, 0)
    }

    /// Input pins drive their stored value; output pins record what they see.
    pub fn propagate(&self, state: &mut InstanceState<'_>) {
        if self.is_input() {
            let value = match state.data() {
                Some(ComponentData::Pin(v)) => *v,
                _ => self.initial_value(),
            };
            state.set_port(0, value, DEFAULT_DELAY);
        } else {
            let seen = state.port_value(0);
            state.set_data(ComponentData::Pin(seen));
        }
    }
}

/// A fixed value driven onto one location.
#[derive(Debug, Clone)]
pub struct Constant {
    pub id: ComponentId,
    pub loc: Location,
    pub value: Value,
}

impl ExpressionComputer for Constant {
    fn compute_expression(&self, map: &mut dyn ExpressionMap) {
        for bit in 0..self.value.width().bits() {
            match self.value.bit_state(bit) {
                BitState::Zero => map.put(self.loc, bit, Expression::Constant(false)),
                BitState::One => map.put(self.loc, bit, Expression::Constant(true)),
                BitState::Unknown | BitState::Error => {}
            }
        }
    }
}

/// A square-wave source advanced by half clock cycles.
#[derive(Debug, Clone)]
pub struct Clock {
    pub id: ComponentId,
    pub loc: Location,
    /// Half cycles spent high per period.
    pub high: u32,
    /// Half cycles spent low per period.
    pub low: u32,
}

impl Clock {
    /// Clock output after the given number of half cycles. Starts low.
    pub fn value_at_tick(&self, ticks: u32) -> Value {
        let period = (self.high + self.low).max(1);
        Value::from_bool(ticks % period >= self.low)
    }

    pub fn propagate(&self, state: &mut InstanceState<'_>) {
        let value = match state.data() {
            Some(ComponentData::Clock(v)) => *v,
            _ => self.value_at_tick(state.tick_count()),
        };
        state.set_port(0, value, DEFAULT_DELAY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_phases() {
        let clk = Clock {
            id: ComponentId(0),
            loc: Location::new(0, 0),
            high: 1,
            low: 1,
        };
        assert_eq!(clk.value_at_tick(0), Value::FALSE);
        assert_eq!(clk.value_at_tick(1), Value::TRUE);
        assert_eq!(clk.value_at_tick(2), Value::FALSE);

        let slow = Clock { high: 2, low: 3, ..clk };
        let pattern: String = (0..5).map(|t| slow.value_at_tick(t).to_string()).collect();
        assert_eq!(pattern, "00011");
    }

    #[test]
    fn test_pin_ends() {
        let a = Pin::input(ComponentId(1), Location::new(0, 0), BitWidth::new(4), None);
        assert_eq!(a.end().kind, EndKind::Output);
        assert_eq!(a.initial_value().to_string(), "0000");
        let y = Pin::output(ComponentId(2), Location::new(5, 0), BitWidth::ONE, Some("y".into()));
        assert!(!y.is_input());
        assert_eq!(y.end().kind, EndKind::Input);
    }
}
