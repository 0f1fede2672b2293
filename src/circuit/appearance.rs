//! Appearance ports: the ordered pins a parent circuit connects to.

use std::collections::BTreeMap;

use super::types::ComponentId;
use crate::components::Component;
use crate::txn::ReplacementMap;

/// Ordered port slots, each bound to a pin of the circuit.
#[derive(Debug, Clone, Default)]
pub struct CircuitPins {
    ports: Vec<ComponentId>,
}

impl CircuitPins {
    pub fn ports(&self) -> &[ComponentId] {
        &self.ports
    }

    /// Apply the pin additions and removals recorded by a finished transaction.
    ///
    /// A removed pin replaced by another pin hands its slot to the
    /// replacement. A pin removed and added again under the same id keeps its
    /// slot. A removed pin with no replacement vacates its slot. Other new pins
    /// are appended in id order.
    pub fn transaction_completed(
        &mut self,
        repl: &ReplacementMap,
        non_wires: &BTreeMap<ComponentId, Component>,
    ) {
        for removed in repl.removals() {
            let Component::Pin(pin) = removed else {
                continue;
            };
            let Some(slot) = self.ports.iter().position(|id| *id == pin.id) else {
                continue;
            };
            // Components compare by id, so a re-added pin shows up as an addition of itself.
            let readded = repl.replaced_by(removed).is_some();
            let successor = if readded {
                Some(pin.id)
            } else {
                repl.replacements_for(removed)
                    .and_then(|rs| rs.iter().find_map(|r| r.as_pin().map(|p| p.id)))
            };
            match successor {
                Some(id) if id != pin.id && !self.ports.contains(&id) => self.ports[slot] = id,
                Some(id) if id == pin.id => {}
                _ => {
                    self.ports.remove(slot);
                }
            }
        }

        for added in repl.additions() {
            if let Component::Pin(pin) = added {
                if !self.ports.contains(&pin.id) {
                    self.ports.push(pin.id);
                }
            }
        }

        self.ports
            .retain(|id| matches!(non_wires.get(id), Some(Component::Pin(_))));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BitWidth, Location};
    use crate::components::Pin;

    fn pin(id: u64, y: i32) -> Component {
        Component::Pin(Pin::input(ComponentId(id), Location::new(0, y), BitWidth::ONE, None))
    }

    fn present(comps: &[&Component]) -> BTreeMap<ComponentId, Component> {
        comps
            .iter()
            .map(|c| (c.id().unwrap(), (*c).clone()))
            .collect()
    }

    #[test]
    fn test_ports_follow_replacements() {
        let (a, b, c) = (pin(1, 0), pin(2, 10), pin(3, 20));
        let mut pins = CircuitPins::default();

        let mut added = ReplacementMap::new();
        added.add(a.clone()).unwrap();
        added.add(b.clone()).unwrap();
        pins.transaction_completed(&added, &present(&[&a, &b]));
        assert_eq!(pins.ports(), &[ComponentId(1), ComponentId(2)]);

        // a is replaced by c and keeps slot 0
        let swap = ReplacementMap::single(a.clone(), c.clone());
        pins.transaction_completed(&swap, &present(&[&b, &c]));
        assert_eq!(pins.ports(), &[ComponentId(3), ComponentId(2)]);

        // removing c outright vacates its slot
        let mut gone = ReplacementMap::new();
        gone.remove(c.clone()).unwrap();
        pins.transaction_completed(&gone, &present(&[&b]));
        assert_eq!(pins.ports(), &[ComponentId(2)]);
    }

    #[test]
    fn test_readded_pin_keeps_slot() {
        let (a, b, c) = (pin(1, 0), pin(2, 10), pin(3, 20));
        let mut pins = CircuitPins::default();
        let mut added = ReplacementMap::new();
        for p in [&a, &b, &c] {
            added.add(p.clone()).unwrap();
        }
        pins.transaction_completed(&added, &present(&[&a, &b, &c]));
        assert_eq!(pins.ports(), &[ComponentId(1), ComponentId(2), ComponentId(3)]);

        // pin 1 removed and put back with a new label in one transaction
        let renamed = Component::Pin(Pin::input(
            ComponentId(1),
            Location::new(0, 0),
            BitWidth::ONE,
            Some("renamed".to_string()),
        ));
        let mut cycle = ReplacementMap::new();
        cycle.remove(a.clone()).unwrap();
        cycle.add(renamed.clone()).unwrap();
        pins.transaction_completed(&cycle, &present(&[&renamed, &b, &c]));
        assert_eq!(pins.ports(), &[ComponentId(1), ComponentId(2), ComponentId(3)]);
    }
}
