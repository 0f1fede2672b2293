//! Wire resolution: user-given wiring data and the bundle maps derived from it.
//!
//! [`CircuitWires`] holds the wires, splitters, tunnels and pull resistors of
//! one circuit together with the [`CircuitPoints`] index of every component
//! end. [`compute_bundle_map`] turns that data into a [`BundleMap`]: maximal
//! electrical nodes ("bundles") with per-bit threads sewn across splitters.

mod builder;
mod bundle;
mod points;
mod thread;

pub use builder::compute_bundle_map;
pub use bundle::{BundleId, BundleMap, ThreadBundle, WidthIncompatibility, WireBundle};
pub use points::CircuitPoints;
pub use thread::{DisjointSets, ThreadId};

use std::collections::{BTreeMap, BTreeSet};

use crate::circuit::{ComponentId, Wire};
use crate::components::{Component, ComponentKey, EndData, PullResistor, Splitter, Tunnel};

/// Wiring data of one circuit.
#[derive(Debug, Clone, Default)]
pub struct CircuitWires {
    pub(crate) wires: BTreeSet<Wire>,
    pub(crate) splitters: BTreeMap<ComponentId, Splitter>,
    pub(crate) tunnels: BTreeMap<ComponentId, Tunnel>,
    pub(crate) pulls: BTreeMap<ComponentId, PullResistor>,
    pub(crate) points: CircuitPoints,
}

impl CircuitWires {
    /// Index a component. Returns false for a wire that is already present.
    pub fn add(&mut self, comp: &Component) -> bool {
        match comp {
            Component::Wire(w) => {
                if !self.wires.insert(*w) {
                    return false;
                }
            }
            Component::Splitter(s) => {
                self.splitters.insert(s.id, s.clone());
            }
            Component::Tunnel(t) => {
                self.tunnels.insert(t.id, t.clone());
            }
            Component::PullResistor(p) => {
                self.pulls.insert(p.id, p.clone());
            }
            _ => {}
        }
        self.points.add(comp);
        true
    }

    pub fn remove(&mut self, comp: &Component) {
        match comp {
            Component::Wire(w) => {
                self.wires.remove(w);
            }
            Component::Splitter(s) => {
                self.splitters.remove(&s.id);
            }
            Component::Tunnel(t) => {
                self.tunnels.remove(&t.id);
            }
            Component::PullResistor(p) => {
                self.pulls.remove(&p.id);
            }
            _ => {}
        }
        self.points.remove(comp);
    }

    pub fn add_end(&mut self, key: ComponentKey, end: EndData) {
        self.points.add_end(key, end);
    }

    pub fn remove_end(&mut self, key: ComponentKey, end: EndData) {
        self.points.remove_end(key, end);
    }

    pub fn wires(&self) -> &BTreeSet<Wire> {
        &self.wires
    }

    pub fn splitters(&self) -> impl Iterator<Item = &Splitter> {
        self.splitters.values()
    }

    pub fn points(&self) -> &CircuitPoints {
        &self.points
    }
}
