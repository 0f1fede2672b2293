//! Component models for digital circuits.
//!
//! Each component kind participates in simulation in one of two ways:
//!
//! - **Wiring** (wires, splitters, tunnels, pull resistors): handled entirely
//!   by the bundle map. Their `propagate` is a no-op and they never appear as
//!   the cause of a scheduled value.
//! - **Active** (pins, gates, constants, clocks, subcircuits): read their
//!   input ports and schedule values on their output ports through an
//!   [`InstanceState`].
//!
//! Components that can also be described symbolically implement
//! [`ExpressionComputer`]; analysis reaches them through
//! [`Component::expression_computer`].

mod gates;
mod io;
mod splitter;
mod subcircuit;
mod wiring;

pub use gates::{Gate, GateKind};
pub use io::{Clock, Constant, Pin, PinDirection};
pub use splitter::Splitter;
pub use subcircuit::SubcircuitInstance;
pub use wiring::{PullResistor, Tunnel};

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::analyze::Expression;
use crate::circuit::{BitWidth, ComponentId, Location, Wire};
use crate::sim::InstanceState;

/// Propagation delay of every active component, in simulator ticks.
pub const DEFAULT_DELAY: u32 = 1;

/// Direction of data through a component end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EndKind {
    Input,
    Output,
    InputOutput,
}

/// One connection point of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndData {
    pub loc: Location,
    pub width: BitWidth,
    pub kind: EndKind,
}

impl EndData {
    pub fn new(loc: Location, width: BitWidth, kind: EndKind) -> Self {
        Self { loc, width, kind }
    }
}

/// Identity of a component inside a circuit.
///
/// Wires are identified by their (normalized) geometry; everything else by
/// its allocated id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentKey {
    Wire(Wire),
    Instance(ComponentId),
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(w) => write!(f, "{}", w),
            Self::Instance(id) => write!(f, "{}", id),
        }
    }
}

/// Symbolic expressions placed at (location, bit) pairs during analysis.
pub trait ExpressionMap {
    /// Expression currently known at a point, if any.
    fn get(&self, loc: Location, bit: usize) -> Option<Expression>;
    /// Record the expression a component drives at a point.
    fn put(&mut self, loc: Location, bit: usize, expr: Expression);
}

/// Capability of describing a component's outputs as Boolean expressions of
/// its inputs.
pub trait ExpressionComputer {
    fn compute_expression(&self, map: &mut dyn ExpressionMap);
}

/// A component placed in a circuit.
#[derive(Debug, Clone)]
pub enum Component {
    Wire(Wire),
    Pin(Pin),
    Gate(Gate),
    Splitter(Splitter),
    Tunnel(Tunnel),
    PullResistor(PullResistor),
    Constant(Constant),
    Clock(Clock),
    Subcircuit(SubcircuitInstance),
}

impl Component {
    /// Identity used for maps, sets and equality.
    pub fn key(&self) -> ComponentKey {
        match self {
            Self::Wire(w) => ComponentKey::Wire(*w),
            other => ComponentKey::Instance(other.id().unwrap_or(ComponentId(u64::MAX))),
        }
    }

    /// Allocated id; `None` for wires.
    pub fn id(&self) -> Option<ComponentId> {
        match self {
            Self::Wire(_) => None,
            Self::Pin(p) => Some(p.id),
            Self::Gate(g) => Some(g.id),
            Self::Splitter(s) => Some(s.id),
            Self::Tunnel(t) => Some(t.id),
            Self::PullResistor(p) => Some(p.id),
            Self::Constant(c) => Some(c.id),
            Self::Clock(c) => Some(c.id),
            Self::Subcircuit(s) => Some(s.id),
        }
    }

    /// Anchor location of the component.
    pub fn location(&self) -> Location {
        match self {
            Self::Wire(w) => w.end0(),
            Self::Pin(p) => p.loc,
            Self::Gate(g) => g.output,
            Self::Splitter(s) => s.combined,
            Self::Tunnel(t) => t.loc,
            Self::PullResistor(p) => p.loc,
            Self::Constant(c) => c.loc,
            Self::Clock(c) => c.loc,
            Self::Subcircuit(s) => s.location(),
        }
    }

    /// All connection points, in port order.
    pub fn ends(&self) -> Vec<EndData> {
        match self {
            Self::Wire(w) => w
                .ends()
                .iter()
                .map(|&loc| EndData::new(loc, BitWidth::UNKNOWN, EndKind::InputOutput))
                .collect(),
            Self::Pin(p) => vec![p.end()],
            Self::Gate(g) => g.ends(),
            Self::Splitter(s) => s.ends(),
            Self::Tunnel(t) => vec![EndData::new(t.loc, t.width, EndKind::InputOutput)],
            Self::PullResistor(p) => vec![EndData::new(p.loc, BitWidth::UNKNOWN, EndKind::InputOutput)],
            Self::Constant(c) => vec![EndData::new(c.loc, c.value.width(), EndKind::Output)],
            Self::Clock(c) => vec![EndData::new(c.loc, BitWidth::ONE, EndKind::Output)],
            Self::Subcircuit(s) => s.ends(),
        }
    }

    /// Human-readable kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Wire(_) => "Wire",
            Self::Pin(_) => "Pin",
            Self::Gate(g) => g.kind.name(),
            Self::Splitter(_) => "Splitter",
            Self::Tunnel(_) => "Tunnel",
            Self::PullResistor(_) => "Pull Resistor",
            Self::Constant(_) => "Constant",
            Self::Clock(_) => "Clock",
            Self::Subcircuit(_) => "Subcircuit",
        }
    }

    pub fn as_wire(&self) -> Option<&Wire> {
        match self {
            Self::Wire(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_pin(&self) -> Option<&Pin> {
        match self {
            Self::Pin(p) => Some(p),
            _ => None,
        }
    }

    /// Wires and splitters move values purely through threads.
    pub fn is_wiring(&self) -> bool {
        matches!(self, Self::Wire(_) | Self::Splitter(_))
    }

    /// Recompute outputs from inputs.
    pub fn propagate(&self, state: &mut InstanceState<'_>) {
        match self {
            Self::Pin(p) => p.propagate(state),
            Self::Gate(g) => g.propagate(state),
            Self::Constant(c) => state.set_port(0, c.value, DEFAULT_DELAY),
            Self::Clock(c) => c.propagate(state),
            Self::Subcircuit(s) => state.propagate_subcircuit(s),
            Self::Wire(_) | Self::Splitter(_) | Self::Tunnel(_) | Self::PullResistor(_) => {}
        }
    }

    /// Symbolic model, when the component has one.
    pub fn expression_computer(&self) -> Option<&dyn ExpressionComputer> {
        match self {
            Self::Gate(g) => Some(g),
            Self::Constant(c) => Some(c),
            _ => None,
        }
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Component {}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wire(w) => write!(f, "{}", w),
            other => write!(
                f,
                "{}[{}]@{}",
                other.kind_name(),
                other.key(),
                other.location()
            ),
        }
    }
}
