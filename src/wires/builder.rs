//! Resolution of wires, tunnels, pull resistors and splitters into a
//! [`BundleMap`].
//!
//! The builder works on a scratch arena: bundles are allocated as dense
//! indices and united through a [`DisjointSets`]; every bit of every sized
//! bundle gets a thread node in a second [`DisjointSets`]. Once splitters
//! have sewn threads together, surviving bundles and thread roots are
//! renumbered densely into the final map.

use std::collections::BTreeMap;

use tracing::debug;

use super::bundle::{BundleId, BundleMap, ThreadBundle, WidthIncompatibility, WireBundle};
use super::thread::{DisjointSets, ThreadId};
use super::CircuitWires;
use crate::circuit::{BitWidth, Location};
use crate::error::{GatesimError, Result};

struct Builder<'a> {
    wires: &'a CircuitWires,
    bundles: Vec<WireBundle>,
    alive: Vec<bool>,
    bundle_sets: DisjointSets,
    point_bundles: BTreeMap<Location, usize>,
    threads: DisjointSets,
}

impl<'a> Builder<'a> {
    fn new(wires: &'a CircuitWires) -> Self {
        Self {
            wires,
            bundles: Vec::new(),
            alive: Vec::new(),
            bundle_sets: DisjointSets::new(),
            point_bundles: BTreeMap::new(),
            threads: DisjointSets::new(),
        }
    }

    fn new_bundle(&mut self) -> usize {
        let id = self.bundle_sets.make_set();
        self.bundles.push(WireBundle::new());
        self.alive.push(true);
        id
    }

    fn bundle_at(&self, loc: Location) -> Option<usize> {
        self.point_bundles.get(&loc).copied()
    }

    fn create_bundle_at(&mut self, loc: Location) -> usize {
        if let Some(id) = self.bundle_at(loc) {
            return id;
        }
        let id = self.new_bundle();
        self.bundles[id].points.insert(loc);
        self.point_bundles.insert(loc, id);
        id
    }

    fn attach(&mut self, bundle: usize, loc: Location) {
        self.bundles[bundle].points.insert(loc);
        self.point_bundles.insert(loc, bundle);
    }

    fn connect_wires(&mut self) {
        let wires = self.wires;
        for wire in &wires.wires {
            let (e0, e1) = (wire.end0(), wire.end1());
            match self.bundle_at(e0) {
                None => {
                    let b = self.create_bundle_at(e1);
                    self.attach(b, e0);
                }
                Some(a) => match self.bundle_at(e1) {
                    None => self.attach(a, e1),
                    Some(b) => {
                        self.bundle_sets.unite(b, a);
                    }
                },
            }
        }
    }

    fn connect_tunnels(&mut self) {
        let wires = self.wires;
        let mut tunnel_sets: BTreeMap<&str, Vec<Location>> = BTreeMap::new();
        for tunnel in wires.tunnels.values() {
            let label = tunnel.label.trim();
            if !label.is_empty() {
                tunnel_sets.entry(label).or_default().push(tunnel.loc);
            }
        }

        for set in tunnel_sets.values() {
            let (found_loc, found) = match set.iter().find_map(|&l| self.bundle_at(l).map(|b| (l, b))) {
                Some(hit) => hit,
                None => (set[0], self.create_bundle_at(set[0])),
            };
            for &loc in set {
                if loc == found_loc {
                    continue;
                }
                match self.bundle_at(loc) {
                    None => self.attach(found, loc),
                    Some(b) => {
                        self.bundle_sets.unite(b, found);
                    }
                }
            }
        }
    }

    fn connect_pull_resistors(&mut self) {
        let wires = self.wires;
        for pull in wires.pulls.values() {
            let b = self.create_bundle_at(pull.loc);
            let merged = self.bundles[b].pull.combine(&pull.pull);
            self.bundles[b].pull = merged;
        }
    }

    /// Move points and pull values of united bundles into their roots.
    fn fold_to_roots(&mut self) {
        for id in 0..self.bundles.len() {
            if !self.alive[id] {
                continue;
            }
            let root = self.bundle_sets.find(id);
            if root == id {
                continue;
            }
            let moved = std::mem::take(&mut self.bundles[id].points);
            for &pt in &moved {
                self.point_bundles.insert(pt, root);
            }
            let pull = self.bundles[id].pull;
            let target = &mut self.bundles[root];
            target.points.extend(moved);
            target.pull = target.pull.combine(&pull);
            self.alive[id] = false;
        }
    }

    fn set_width(&mut self, bundle: usize, width: BitWidth, det: Location) {
        if !width.is_known() {
            return;
        }
        let b = &mut self.bundles[bundle];
        if let Some(incompat) = b.incompatibility.as_mut() {
            incompat.add(det, width);
            return;
        }
        if b.width.is_known() {
            if b.width == width {
                return;
            }
            let mut incompat = WidthIncompatibility::default();
            if let Some(prev) = b.width_determinant {
                incompat.add(prev, b.width);
            }
            incompat.add(det, width);
            b.incompatibility = Some(incompat);
            return;
        }
        b.width = width;
        b.width_determinant = Some(det);
        let threads = (0..width.bits())
            .map(|_| ThreadId(self.threads.make_set()))
            .collect();
        self.bundles[bundle].threads = Some(threads);
    }

    fn size_bundles(&mut self) {
        let wires = self.wires;
        for splitter in wires.splitters.values() {
            for end in splitter.ends() {
                let b = self.create_bundle_at(end.loc);
                self.set_width(b, end.width, end.loc);
            }
        }

        let located: Vec<(Location, usize)> =
            self.point_bundles.iter().map(|(&l, &b)| (l, b)).collect();
        for (loc, b) in located {
            let width = wires.points.width(loc);
            if width.is_known() {
                self.set_width(b, width, loc);
            }
        }
    }

    /// Join the threads of each splitter's combined bundle with the threads
    /// of its split bundles.
    fn sew_splitters(&mut self) -> Result<()> {
        let wires = self.wires;
        for splitter in wires.splitters.values() {
            let ends = splitter.ends();
            let mut end_bundles = Vec::with_capacity(ends.len());
            for end in &ends {
                let b = self.bundle_at(end.loc);
                if let Some(b) = b {
                    self.set_width(b, end.width, end.loc);
                }
                end_bundles.push(b);
            }

            let from = match end_bundles[0] {
                Some(b) if self.bundles[b].is_valid() => b,
                _ => continue,
            };

            for (bit, &end) in splitter.bit_end().iter().enumerate() {
                if end == 0 {
                    continue;
                }
                let Some(to) = end_bundles.get(end as usize).copied().flatten() else {
                    continue;
                };
                let to_bundle = &self.bundles[to];
                let Some(to_threads) = to_bundle.threads.as_ref().filter(|_| to_bundle.is_valid()) else {
                    continue;
                };
                let from_threads = self.bundles[from].threads.as_ref().ok_or_else(|| {
                    GatesimError::BundleMapFailure {
                        message: format!("splitter {} has an unsized combined end", splitter.id),
                    }
                })?;
                let thr = splitter.bit_thread(bit).unwrap_or(usize::MAX);
                if bit >= from_threads.len() {
                    return Err(GatesimError::BundleMapFailure {
                        message: format!("from {} of {}", bit, from_threads.len()),
                    });
                }
                if thr >= to_threads.len() {
                    return Err(GatesimError::BundleMapFailure {
                        message: format!("to {} of {}", thr, to_threads.len()),
                    });
                }
                let (a, b) = (from_threads[bit].0, to_threads[thr].0);
                self.threads.unite(a, b);
            }
        }
        Ok(())
    }

    /// Renumber surviving bundles and thread roots densely, wiring up the
    /// thread back-links.
    fn finish(mut self, generation: u64) -> BundleMap {
        let mut bundle_ids: BTreeMap<usize, BundleId> = BTreeMap::new();
        let mut bundles = Vec::new();
        let mut thread_ids: BTreeMap<usize, ThreadId> = BTreeMap::new();
        let mut thread_bundles: Vec<Vec<ThreadBundle>> = Vec::new();

        for (old, mut bundle) in std::mem::take(&mut self.bundles).into_iter().enumerate() {
            if !self.alive[old] {
                continue;
            }
            let id = BundleId(bundles.len());
            bundle_ids.insert(old, id);

            if !bundle.is_valid() {
                bundle.threads = None;
            } else if let Some(threads) = bundle.threads.as_mut() {
                for (bit, thread) in threads.iter_mut().enumerate() {
                    let root = self.threads.find(thread.0);
                    let dense = *thread_ids.entry(root).or_insert_with(|| {
                        thread_bundles.push(Vec::new());
                        ThreadId(thread_bundles.len() - 1)
                    });
                    *thread = dense;
                    thread_bundles[dense.0].push(ThreadBundle { bundle: id, bit });
                }
            }
            bundles.push(bundle);
        }

        let point_bundles = self
            .point_bundles
            .iter()
            .filter_map(|(&loc, old)| bundle_ids.get(old).map(|&id| (loc, id)))
            .collect();

        let mut incompatibility = self.wires.points.width_incompatibility();
        incompatibility.extend(bundles.iter().filter_map(|b| b.incompatibility.clone()));

        BundleMap {
            point_bundles,
            bundles,
            thread_bundles,
            valid: true,
            incompatibility,
            generation,
        }
    }
}

/// Compute the bundle map of one circuit's wiring.
pub fn compute_bundle_map(wires: &CircuitWires, generation: u64) -> Result<BundleMap> {
    let mut builder = Builder::new(wires);
    builder.connect_wires();
    builder.connect_tunnels();
    builder.connect_pull_resistors();
    builder.fold_to_roots();
    builder.size_bundles();
    builder.sew_splitters()?;
    let map = builder.finish(generation);
    debug!(
        generation,
        bundles = map.bundle_count(),
        threads = map.thread_count(),
        incompatible = map.width_incompatibility().len(),
        "computed bundle map"
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{ComponentId, Value, Wire};
    use crate::components::{Component, Pin, PullResistor, Splitter, Tunnel};

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn wire(a: (i32, i32), b: (i32, i32)) -> Component {
        Component::Wire(Wire::new(a.into(), b.into()).unwrap())
    }

    #[test]
    fn test_one_bundle_per_wire_tree() {
        let mut wires = CircuitWires::default();
        // tree 1: an L shape with a branch
        wires.add(&wire((0, 0), (10, 0)));
        wires.add(&wire((10, 0), (10, 10)));
        wires.add(&wire((10, 10), (20, 10)));
        wires.add(&wire((10, 10), (10, 20)));
        // tree 2: separate straight wire
        wires.add(&wire((0, 50), (30, 50)));

        let map = compute_bundle_map(&wires, 1).unwrap();
        assert!(map.is_valid());
        assert_eq!(map.bundle_count(), 2);

        let tree1 = map.bundle_at(loc(0, 0)).unwrap();
        let expected: Vec<Location> = vec![loc(0, 0), loc(10, 0), loc(10, 10), loc(10, 20), loc(20, 10)];
        assert_eq!(tree1.points.iter().copied().collect::<Vec<_>>(), expected);
        assert_eq!(map.bundle_id_at(loc(20, 10)), map.bundle_id_at(loc(10, 20)));
        assert_ne!(map.bundle_id_at(loc(0, 0)), map.bundle_id_at(loc(0, 50)));
        assert_eq!(map.bundle_at(loc(30, 50)).unwrap().points.len(), 2);
    }

    #[test]
    fn test_trees_joined_late_fold_together() {
        let mut wires = CircuitWires::default();
        wires.add(&wire((0, 0), (10, 0)));
        wires.add(&wire((30, 0), (40, 0)));
        wires.add(&wire((10, 0), (10, 10)));
        wires.add(&wire((30, 0), (30, 10)));
        wires.add(&wire((10, 10), (30, 10)));
        let map = compute_bundle_map(&wires, 0).unwrap();
        assert_eq!(map.bundle_count(), 1);
        assert_eq!(map.bundle_at(loc(40, 0)).unwrap().points.len(), 6);
    }

    #[test]
    fn test_width_from_components_and_threads() {
        let mut wires = CircuitWires::default();
        wires.add(&wire((0, 0), (10, 0)));
        wires.points.add(&Component::Pin(Pin::input(ComponentId(1), loc(0, 0), BitWidth::new(4), None)));
        let map = compute_bundle_map(&wires, 0).unwrap();
        let b = map.bundle_at(loc(10, 0)).unwrap();
        assert_eq!(b.width, BitWidth::new(4));
        assert_eq!(b.width_determinant, Some(loc(0, 0)));
        assert_eq!(b.threads.as_ref().unwrap().len(), 4);
        assert_eq!(map.thread_count(), 4);
    }

    #[test]
    fn test_width_conflict_is_diagnostic() {
        let mut wires = CircuitWires::default();
        wires.add(&wire((0, 0), (10, 0)));
        wires.points.add(&Component::Pin(Pin::input(ComponentId(1), loc(0, 0), BitWidth::new(4), None)));
        wires.points.add(&Component::Pin(Pin::output(ComponentId(2), loc(10, 0), BitWidth::new(2), None)));
        let map = compute_bundle_map(&wires, 0).unwrap();
        assert!(map.is_valid());
        let b = map.bundle_at(loc(0, 0)).unwrap();
        assert!(!b.is_valid());
        assert!(b.threads.is_none());
        assert_eq!(map.width_incompatibility().len(), 1);
    }

    #[test]
    fn test_tunnels_and_pulls() {
        let mut wires = CircuitWires::default();
        wires.add(&wire((0, 0), (10, 0)));
        wires.add(&wire((50, 0), (60, 0)));
        let t1 = Component::Tunnel(Tunnel { id: ComponentId(1), loc: loc(10, 0), label: " bus ".into(), width: BitWidth::ONE });
        let t2 = Component::Tunnel(Tunnel { id: ComponentId(2), loc: loc(50, 0), label: "bus".into(), width: BitWidth::ONE });
        let t3 = Component::Tunnel(Tunnel { id: ComponentId(3), loc: loc(90, 90), label: "bus".into(), width: BitWidth::ONE });
        let pull = Component::PullResistor(PullResistor { id: ComponentId(4), loc: loc(60, 0), pull: Value::TRUE });
        for c in [&t1, &t2, &t3, &pull] {
            wires.add(c);
        }
        let map = compute_bundle_map(&wires, 0).unwrap();
        assert_eq!(map.bundle_count(), 1);
        let b = map.bundle_at(loc(90, 90)).unwrap();
        assert_eq!(b.pull, Value::TRUE);
        assert_eq!(b.width, BitWidth::ONE);
    }

    #[test]
    fn test_splitter_sews_threads() {
        let mut wires = CircuitWires::default();
        let s = Splitter::new(ComponentId(1), loc(0, 0), vec![loc(10, 0), loc(10, 10)], 8, None).unwrap();
        wires.add(&Component::Splitter(s));
        wires.add(&wire((10, 0), (20, 0)));
        wires.add(&wire((10, 10), (20, 10)));
        let map = compute_bundle_map(&wires, 0).unwrap();

        let combined = map.bundle_at(loc(0, 0)).unwrap();
        let low = map.bundle_at(loc(20, 0)).unwrap();
        let high = map.bundle_at(loc(20, 10)).unwrap();
        assert_eq!(combined.width, BitWidth::new(8));
        assert_eq!(low.width, BitWidth::new(4));
        for bit in 0..4 {
            assert_eq!(combined.thread(bit), low.thread(bit));
            assert_eq!(combined.thread(bit + 4), high.thread(bit));
        }
        assert_eq!(map.thread_count(), 8);
        let shared = combined.thread(5).unwrap();
        assert_eq!(map.thread_bundles(shared).len(), 2);
    }
}
