//! Instances of one circuit placed inside another.

use std::fmt;
use std::sync::Arc;

use super::{EndData, EndKind, Pin};
use crate::circuit::{BitWidth, Circuit, ComponentId, Location};
use crate::error::{GatesimError, Result};

/// A child circuit placed in a parent circuit.
///
/// Port `i` sits at `ports[i]` in the parent and is bound to whatever pin
/// holds the child's `i`-th appearance slot at the time it is read, so pins
/// replaced or moved inside the child stay connected.
#[derive(Clone)]
pub struct SubcircuitInstance {
    pub id: ComponentId,
    child: Arc<Circuit>,
    ports: Vec<Location>,
}

impl SubcircuitInstance {
    pub fn new(id: ComponentId, child: Arc<Circuit>, ports: Vec<Location>) -> Result<Self> {
        let port_count = child.port_pins().len();
        if port_count != ports.len() {
            return Err(GatesimError::topology(format!(
                "subcircuit '{}' has {} ports but {} locations were given",
                child.name(),
                port_count,
                ports.len()
            )));
        }
        Ok(Self { id, child, ports })
    }

    pub fn child(&self) -> &Arc<Circuit> {
        &self.child
    }

    pub fn ports(&self) -> &[Location] {
        &self.ports
    }

    /// Child pin currently bound to each port, in port order. Slots beyond
    /// the placed locations are ignored.
    pub fn port_pins(&self) -> Vec<Pin> {
        let mut pins = self.child.port_pins();
        pins.truncate(self.ports.len());
        pins
    }

    pub fn location(&self) -> Location {
        self.ports.first().copied().unwrap_or(Location::new(0, 0))
    }

    /// One end per placed port. A port whose child slot was vacated keeps
    /// its location with an unknown width.
    pub fn ends(&self) -> Vec<EndData> {
        let pins = self.port_pins();
        self.ports
            .iter()
            .enumerate()
            .map(|(i, &loc)| match pins.get(i) {
                Some(pin) if pin.is_input() => EndData::new(loc, pin.width, EndKind::Input),
                Some(pin) => EndData::new(loc, pin.width, EndKind::Output),
                None => EndData::new(loc, BitWidth::UNKNOWN, EndKind::InputOutput),
            })
            .collect()
    }
}

impl fmt::Debug for SubcircuitInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubcircuitInstance")
            .field("id", &self.id)
            .field("child", &self.child.name())
            .field("ports", &self.ports)
            .finish()
    }
}
