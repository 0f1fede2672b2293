//! The mutable circuit netlist.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, warn};

use super::appearance::CircuitPins;
use super::types::{BitWidth, ComponentId, Location};
use super::wire::Wire;
use crate::components::{Component, ComponentKey, EndData, Pin, Splitter};
use crate::error::{GatesimError, Result};
use crate::owner::OwnerHandle;
use crate::project::SimContext;
use crate::txn::{CircuitLocker, ReplacementMap};
use crate::wires::{compute_bundle_map, BundleMap, CircuitWires, WidthIncompatibility, WireBundle};

/// Structural contents of a circuit.
#[derive(Debug, Default)]
pub struct CircuitContents {
    pub(crate) wires: CircuitWires,
    pub(crate) non_wires: BTreeMap<ComponentId, Component>,
    pub(crate) pins: CircuitPins,
}

impl CircuitContents {
    pub fn wires(&self) -> &CircuitWires {
        &self.wires
    }

    pub fn non_wires(&self) -> impl Iterator<Item = &Component> {
        self.non_wires.values()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.non_wires.get(&id)
    }

    fn resolve(&self, key: ComponentKey) -> Option<Component> {
        match key {
            ComponentKey::Wire(w) => self.wires.wires.contains(&w).then_some(Component::Wire(w)),
            ComponentKey::Instance(id) => self.non_wires.get(&id).cloned(),
        }
    }

    /// Components with an end at `loc`.
    pub fn components_at(&self, loc: Location) -> Vec<Component> {
        self.wires
            .points
            .components_at(loc)
            .into_iter()
            .filter_map(|key| self.resolve(key))
            .collect()
    }
}

/// A hierarchical netlist of wires and components.
///
/// Structural edits go through a [`CircuitMutator`](crate::txn::CircuitMutator)
/// inside a transaction holding this circuit's write lock; calling the
/// mutating methods from any other thread fails with a lock violation.
/// Readers take a short internal read lock and may run concurrently with a
/// simulation.
pub struct Circuit {
    name: String,
    locker: CircuitLocker,
    contents: RwLock<CircuitContents>,
    generation: AtomicU64,
    master: Mutex<Option<Arc<BundleMap>>>,
    owner: OwnerHandle,
}

impl Circuit {
    pub fn new(name: impl Into<String>, ctx: &SimContext) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            locker: CircuitLocker::new(ctx.next_serial()),
            contents: RwLock::new(CircuitContents::default()),
            generation: AtomicU64::new(0),
            master: Mutex::new(None),
            owner: ctx.owner().clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locker(&self) -> &CircuitLocker {
        &self.locker
    }

    /// Structural generation; bumped by every change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, CircuitContents> {
        self.contents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CircuitContents> {
        self.contents.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    // ---- mutation (write lock required) ----

    pub fn add(&self, comp: Component) -> Result<bool> {
        self.locker.check_for_write_permission("add", &self.name)?;
        Ok(self.add_unchecked(comp))
    }

    pub fn remove(&self, key: &ComponentKey) -> Result<Option<Component>> {
        self.locker.check_for_write_permission("remove", &self.name)?;
        Ok(self.remove_unchecked(key))
    }

    pub fn add_end(&self, key: ComponentKey, end: EndData) -> Result<()> {
        self.locker.check_for_write_permission("add end", &self.name)?;
        self.add_end_unchecked(key, end);
        Ok(())
    }

    pub fn remove_end(&self, key: ComponentKey, end: EndData) -> Result<()> {
        self.locker.check_for_write_permission("remove end", &self.name)?;
        self.remove_end_unchecked(key, end);
        Ok(())
    }

    /// Install a new routing table on a splitter, returning the old splitter.
    pub fn reconfigure_splitter(&self, id: ComponentId, bit_end: Vec<u8>) -> Result<Splitter> {
        self.locker
            .check_for_write_permission("configure splitter", &self.name)?;
        let current = match self.read().non_wires.get(&id) {
            Some(Component::Splitter(s)) => s.clone(),
            _ => {
                return Err(GatesimError::UnknownComponent {
                    component: id.to_string(),
                    circuit: self.name.clone(),
                })
            }
        };
        let next = current.with_mapping(bit_end)?;
        self.replace_splitter_unchecked(next);
        Ok(current)
    }

    pub(crate) fn add_unchecked(&self, comp: Component) -> bool {
        let added = {
            let mut contents = self.write();
            match comp.id() {
                None => contents.wires.add(&comp),
                Some(id) if contents.non_wires.contains_key(&id) => false,
                Some(id) => {
                    contents.wires.add(&comp);
                    contents.non_wires.insert(id, comp);
                    true
                }
            }
        };
        if added {
            self.touch();
        }
        added
    }

    pub(crate) fn remove_unchecked(&self, key: &ComponentKey) -> Option<Component> {
        let removed = {
            let mut contents = self.write();
            let removed = match *key {
                ComponentKey::Wire(w) => contents.wires.wires.contains(&w).then_some(Component::Wire(w)),
                ComponentKey::Instance(id) => contents.non_wires.remove(&id),
            };
            if let Some(comp) = &removed {
                contents.wires.remove(comp);
            }
            removed
        };
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub(crate) fn add_end_unchecked(&self, key: ComponentKey, end: EndData) {
        self.write().wires.add_end(key, end);
        self.touch();
    }

    pub(crate) fn remove_end_unchecked(&self, key: ComponentKey, end: EndData) {
        self.write().wires.remove_end(key, end);
        self.touch();
    }

    pub(crate) fn replace_splitter_unchecked(&self, splitter: Splitter) -> Option<Splitter> {
        let old = {
            let mut contents = self.write();
            let next = Component::Splitter(splitter.clone());
            let old = contents.non_wires.insert(splitter.id, next.clone());
            if let Some(prev) = &old {
                contents.wires.remove(prev);
            }
            contents.wires.add(&next);
            old
        };
        self.touch();
        match old {
            Some(Component::Splitter(s)) => Some(s),
            _ => None,
        }
    }

    /// Re-bind appearance ports after a transaction.
    /// Re-bind the port slots after a transaction. Returns the slots as they
    /// were before.
    pub(crate) fn resync_pins(&self, repl: &ReplacementMap) -> CircuitPins {
        let mut contents = self.write();
        let CircuitContents { pins, non_wires, .. } = &mut *contents;
        let before = pins.clone();
        pins.transaction_completed(repl, non_wires);
        before
    }

    pub(crate) fn restore_pins(&self, pins: CircuitPins) {
        self.write().pins = pins;
        self.touch();
    }

    // ---- queries ----

    pub fn contains(&self, comp: &Component) -> bool {
        self.read().resolve(comp.key()).is_some()
    }

    pub fn component(&self, id: ComponentId) -> Option<Component> {
        self.read().non_wires.get(&id).cloned()
    }

    pub fn non_wires(&self) -> Vec<Component> {
        self.read().non_wires.values().cloned().collect()
    }

    pub fn wires(&self) -> Vec<Wire> {
        self.read().wires.wires.iter().copied().collect()
    }

    pub fn component_count(&self) -> usize {
        let contents = self.read();
        contents.non_wires.len() + contents.wires.wires.len()
    }

    pub fn components_at(&self, loc: Location) -> Vec<Component> {
        self.read().components_at(loc)
    }

    /// Whether anything other than `except` has an end at `loc`.
    pub fn is_connected(&self, loc: Location, except: &ComponentKey) -> bool {
        self.read()
            .wires
            .points
            .components_at(loc)
            .iter()
            .any(|k| k != except)
    }

    /// Every location holding a component end.
    pub fn split_locations(&self) -> Vec<Location> {
        self.read().wires.points.split_locations().collect()
    }

    /// Input and output pins in appearance port order.
    pub fn port_pins(&self) -> Vec<Pin> {
        let contents = self.read();
        contents
            .pins
            .ports()
            .iter()
            .filter_map(|id| contents.non_wires.get(id).and_then(Component::as_pin).cloned())
            .collect()
    }

    /// Width at a location: declared by a component end, or else carried by
    /// the bundle there.
    pub fn width(self: &Arc<Self>, loc: Location) -> BitWidth {
        let declared = self.read().wires.points.width(loc);
        if declared.is_known() {
            return declared;
        }
        let map = self.bundle_map();
        match map.bundle_at(loc) {
            Some(b) if map.is_valid() && b.is_valid() => b.width,
            _ => BitWidth::UNKNOWN,
        }
    }

    pub fn wire_bundle(self: &Arc<Self>, loc: Location) -> Option<WireBundle> {
        self.bundle_map().bundle_at(loc).cloned()
    }

    pub fn width_incompatibility(self: &Arc<Self>) -> Vec<WidthIncompatibility> {
        self.bundle_map().width_incompatibility().to_vec()
    }

    /// Bundle map for the current generation.
    ///
    /// A stale cache is recomputed on the owner thread; the caller blocks for
    /// the result. Failures degrade to an invalid map.
    pub fn bundle_map(self: &Arc<Self>) -> Arc<BundleMap> {
        let generation = self.generation();
        if let Some(map) = self.cached_map(generation) {
            return map;
        }

        let circuit = Arc::clone(self);
        match self.owner.run_sync(move || circuit.recompute_bundle_map()) {
            Ok(map) => map,
            Err(e) => {
                warn!(circuit = %self.name, error = %e, "bundle map recomputation unavailable");
                Arc::new(BundleMap::invalid(generation))
            }
        }
    }

    fn cached_map(&self, generation: u64) -> Option<Arc<BundleMap>> {
        let master = self.master.lock().unwrap_or_else(PoisonError::into_inner);
        master
            .as_ref()
            .filter(|m| m.generation() == generation)
            .cloned()
    }

    fn recompute_bundle_map(&self) -> Arc<BundleMap> {
        let (generation, result) = {
            let contents = self.read();
            let generation = self.generation();
            if let Some(map) = self.cached_map(generation) {
                return map;
            }
            (generation, compute_bundle_map(&contents.wires, generation))
        };

        let map = match result {
            Ok(map) => {
                for incompat in map.width_incompatibility() {
                    warn!(circuit = %self.name, "{}", incompat);
                }
                Arc::new(map)
            }
            Err(e) => {
                error!(circuit = %self.name, error = %e, "bundle map construction failed");
                return Arc::new(BundleMap::invalid(generation));
            }
        };

        if self.generation() == generation {
            debug!(circuit = %self.name, generation, "caching bundle map");
            *self.master.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&map));
        }
        map
    }
}

impl std::fmt::Debug for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("serial", &self.locker.serial())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{Gate, GateKind};
    use crate::txn::Transaction;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    #[test]
    fn test_mutation_requires_write_lock() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let wire = Component::Wire(Wire::new(loc(0, 0), loc(10, 0)).unwrap());
        let err = c.add(wire.clone()).unwrap_err();
        assert!(err.is_lock_violation());
        assert!(err.to_string().contains("add outside transaction"));
        assert_eq!(c.component_count(), 0);

        Transaction::new("add wire")
            .write(&c)
            .run(|m| m.add(&c, wire.clone()))
            .unwrap();
        assert_eq!(c.wires().len(), 1);
    }

    #[test]
    fn test_bundle_map_cached_per_generation() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        Transaction::new("build")
            .write(&c)
            .run(|m| {
                m.add(&c, Component::Wire(Wire::new(loc(0, 0), loc(10, 0))?))?;
                let not = Gate::new(ComponentId(1), GateKind::Not, BitWidth::ONE, loc(30, 0), vec![loc(10, 0)])?;
                m.add(&c, Component::Gate(not))
            })
            .unwrap();

        let first = c.bundle_map();
        let second = c.bundle_map();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(c.width(loc(0, 0)), BitWidth::ONE);
        assert!(c.is_connected(loc(10, 0), &ComponentKey::Instance(ComponentId(1))));
        assert!(!c.is_connected(loc(30, 0), &ComponentKey::Instance(ComponentId(1))));

        Transaction::new("extend")
            .write(&c)
            .run(|m| m.add(&c, Component::Wire(Wire::new(loc(0, 0), loc(0, 20))?)))
            .unwrap();
        let third = c.bundle_map();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.bundle_at(loc(0, 20)).unwrap().width, BitWidth::ONE);
    }
}
