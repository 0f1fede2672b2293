//! Logic gates.

use super::{EndData, EndKind, ExpressionComputer, ExpressionMap, DEFAULT_DELAY};
use crate::analyze::Expression;
use crate::circuit::{BitWidth, ComponentId, Location, Value};
use crate::error::{GatesimError, Result};
use crate::sim::InstanceState;

/// Boolean function computed by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    And,
    Or,
    /// Odd parity across all inputs.
    Xor,
    Nand,
    Nor,
    Xnor,
    Not,
    Buf,
}

impl GateKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::And => "AND Gate",
            Self::Or => "OR Gate",
            Self::Xor => "XOR Gate",
            Self::Nand => "NAND Gate",
            Self::Nor => "NOR Gate",
            Self::Xnor => "XNOR Gate",
            Self::Not => "NOT Gate",
            Self::Buf => "Buffer",
        }
    }

    /// Gates that take exactly one input.
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::Not | Self::Buf)
    }

    fn is_negated(&self) -> bool {
        matches!(self, Self::Nand | Self::Nor | Self::Xnor | Self::Not)
    }

    fn fold(&self, a: &Value, b: &Value) -> Value {
        match self {
            Self::And | Self::Nand => a.and(b),
            Self::Or | Self::Nor => a.or(b),
            Self::Xor | Self::Xnor => a.xor(b),
            Self::Not | Self::Buf => *a,
        }
    }

    fn fold_expr(&self, a: Expression, b: Expression) -> Expression {
        match self {
            Self::And | Self::Nand => Expression::and(a, b),
            Self::Or | Self::Nor => Expression::or(a, b),
            Self::Xor | Self::Xnor => Expression::xor(a, b),
            Self::Not | Self::Buf => a,
        }
    }
}

/// A gate with one output (port 0) and one or more inputs (ports 1..).
#[derive(Debug, Clone)]
pub struct Gate {
    pub id: ComponentId,
    pub kind: GateKind,
    pub width: BitWidth,
    pub output: Location,
    pub inputs: Vec<Location>,
}

impl Gate {
    pub fn new(
        id: ComponentId,
        kind: GateKind,
        width: BitWidth,
        output: Location,
        inputs: Vec<Location>,
    ) -> Result<Self> {
        if !width.is_known() {
            return Err(GatesimError::topology(format!("{} needs a width", kind.name())));
        }
        if inputs.is_empty() || (kind.is_unary() && inputs.len() != 1) {
            return Err(GatesimError::topology(format!(
                "{} cannot take {} inputs",
                kind.name(),
                inputs.len()
            )));
        }
        Ok(Self {
            id,
            kind,
            width,
            output,
            inputs,
        })
    }

    pub fn ends(&self) -> Vec<EndData> {
        let mut ends = Vec::with_capacity(self.inputs.len() + 1);
        ends.push(EndData::new(self.output, self.width, EndKind::Output));
        ends.extend(
            self.inputs
                .iter()
                .map(|&loc| EndData::new(loc, self.width, EndKind::Input)),
        );
        ends
    }

    /// Unconnected inputs are ignored and floating input bits read as 0.
    /// With no connected input the output floats.
    pub fn propagate(&self, state: &mut InstanceState<'_>) {
        let mut acc: Option<Value> = None;
        for port in 1..=self.inputs.len() {
            if !state.is_port_connected(port) {
                continue;
            }
            let raw = state.port_value(port);
            let input = if raw.is_nil() {
                Value::error(self.width)
            } else {
                raw.resize(self.width).floating_as_zero()
            };
            acc = Some(match acc {
                None => input,
                Some(prev) => self.kind.fold(&prev, &input),
            });
        }

        let out = match acc {
            None => Value::unknown(self.width),
            Some(v) if self.kind.is_negated() => v.not(),
            Some(v) => v,
        };
        state.set_port(0, out, DEFAULT_DELAY);
    }
}

impl ExpressionComputer for Gate {
    fn compute_expression(&self, map: &mut dyn ExpressionMap) {
        for bit in 0..self.width.bits() {
            let mut inputs = self.inputs.iter().filter_map(|&loc| map.get(loc, bit));
            let Some(first) = inputs.next() else {
                continue;
            };
            let combined = inputs.fold(first, |acc, e| self.kind.fold_expr(acc, e));
            let out = if self.kind.is_negated() {
                Expression::not(combined)
            } else {
                combined
            };
            map.put(self.output, bit, out);
        }
    }
}
