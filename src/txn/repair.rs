//! Wire normalization run after every transaction that edits a circuit.
//!
//! Three passes, each applied through the mutator as one replacement:
//!
//! 1. collinear wires meeting end to end at a point nothing else touches are
//!    merged,
//! 2. overlapping collinear wires are fused, then re-cut wherever another
//!    component has an end on the fused span,
//! 3. any wire passing through a component end is split there.
//!
//! After repair, re-running it produces an empty replacement.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use super::mutator::CircuitMutator;
use super::replacement::ReplacementMap;
use super::transaction::{execute, Access, CircuitTransaction};
use crate::circuit::{Circuit, Location, Wire};
use crate::components::Component;
use crate::error::Result;

/// Union of wires into merge groups.
#[derive(Default)]
struct MergeSets {
    index: BTreeMap<Wire, usize>,
    sets: Vec<Vec<Wire>>,
}

impl MergeSets {
    fn merge(&mut self, a: Wire, b: Wire) {
        match (self.index.get(&a).copied(), self.index.get(&b).copied()) {
            (None, None) => {
                let id = self.sets.len();
                self.sets.push(vec![a, b]);
                self.index.insert(a, id);
                self.index.insert(b, id);
            }
            (None, Some(s)) => {
                self.sets[s].push(a);
                self.index.insert(a, s);
            }
            (Some(s), None) => {
                self.sets[s].push(b);
                self.index.insert(b, s);
            }
            (Some(s0), Some(s1)) if s0 != s1 => {
                let (small, large) = if self.sets[s0].len() > self.sets[s1].len() {
                    (s1, s0)
                } else {
                    (s0, s1)
                };
                let moved = std::mem::take(&mut self.sets[small]);
                for w in &moved {
                    self.index.insert(*w, large);
                }
                self.sets[large].extend(moved);
            }
            _ => {}
        }
    }

    fn into_sets(self) -> impl Iterator<Item = Vec<Wire>> {
        self.sets.into_iter().filter(|s| s.len() > 1)
    }
}

fn wires(list: impl IntoIterator<Item = Wire>) -> Vec<Component> {
    list.into_iter().map(Component::Wire).collect()
}

/// Repairs the wires of one circuit.
pub struct WireRepair {
    circuit: Arc<Circuit>,
    result: ReplacementMap,
}

impl WireRepair {
    pub fn new(circuit: Arc<Circuit>) -> Self {
        Self {
            circuit,
            result: ReplacementMap::new(),
        }
    }

    /// Everything replaced so far, composed across the passes.
    pub fn result(&self) -> &ReplacementMap {
        &self.result
    }

    /// Repair `circuit` in a transaction of its own and return what changed.
    pub fn repair(circuit: &Arc<Circuit>) -> Result<ReplacementMap> {
        let mut repair = Self::new(Arc::clone(circuit));
        execute(&mut repair)?;
        Ok(repair.result)
    }

    fn apply(&mut self, mutator: &CircuitMutator, repl: ReplacementMap, pass: &str) -> Result<()> {
        if repl.is_empty() {
            return Ok(());
        }
        debug!(circuit = self.circuit.name(), pass, "repairing wires");
        mutator.replace(&self.circuit, &repl)?;
        self.result.append(&repl);
        Ok(())
    }

    fn do_merges(&self) -> Result<ReplacementMap> {
        let mut sets = MergeSets::default();
        {
            let contents = self.circuit.read();
            for loc in contents.wires().points().split_locations() {
                if let [Component::Wire(w0), Component::Wire(w1)] = contents.components_at(loc).as_slice() {
                    if w0.is_parallel(w1) {
                        sets.merge(*w0, *w1);
                    }
                }
            }
        }

        let mut repl = ReplacementMap::new();
        for set in sets.into_sets() {
            let mut locs: Vec<Location> = set.iter().flat_map(|w| w.ends()).collect();
            locs.sort();
            let (Some(&e0), Some(&e1)) = (locs.first(), locs.last()) else {
                continue;
            };
            let whole = Wire::new(e0, e1)?;
            for w in set.into_iter().filter(|w| *w != whole) {
                repl.put(Component::Wire(w), [Component::Wire(whole)])?;
            }
        }
        Ok(repl)
    }

    fn do_overlaps(&self) -> Result<ReplacementMap> {
        let contents = self.circuit.read();
        let mut wire_points: BTreeMap<Location, Vec<Wire>> = BTreeMap::new();
        for w in contents.wires().wires() {
            for loc in w.points() {
                wire_points.entry(loc).or_default().push(*w);
            }
        }

        let mut sets = MergeSets::default();
        for at in wire_points.values().filter(|at| at.len() > 1) {
            for (i, w0) in at.iter().enumerate() {
                for w1 in &at[i + 1..] {
                    if w0.overlaps(w1, false) {
                        sets.merge(*w0, *w1);
                    }
                }
            }
        }

        let split_locs: BTreeSet<Location> = contents.wires().points().split_locations().collect();
        let mut repl = ReplacementMap::new();
        for set in sets.into_sets() {
            let ends: BTreeSet<Location> = set.iter().flat_map(|w| w.ends()).collect();
            let (Some(&first), Some(&last)) = (ends.first(), ends.last()) else {
                continue;
            };
            let whole = Wire::new(first, last)?;

            let mut mids = BTreeSet::from([first, last]);
            for loc in whole.points().filter(|l| split_locs.contains(l)) {
                let foreign = contents.components_at(loc).iter().any(|c| match c {
                    Component::Wire(w) => !set.contains(w),
                    _ => true,
                });
                if foreign {
                    mids.insert(loc);
                }
            }

            let pieces: Vec<Wire> = if mids.len() == 2 {
                vec![whole]
            } else {
                let mids: Vec<Location> = mids.into_iter().collect();
                mids.windows(2).map(|p| Wire::span(p[0], p[1])).collect()
            };
            for w in &set {
                let covering = pieces.iter().copied().filter(|p| p.overlaps(w, false));
                repl.put(Component::Wire(*w), wires(covering))?;
            }
        }
        Ok(repl)
    }

    fn do_splits(&self) -> Result<ReplacementMap> {
        let contents = self.circuit.read();
        let split_locs: Vec<Location> = contents.wires().points().split_locations().collect();
        let mut repl = ReplacementMap::new();
        for w in contents.wires().wires() {
            let mut cuts: Vec<Location> = split_locs
                .iter()
                .copied()
                .filter(|&loc| w.contains(loc) && loc != w.end0() && loc != w.end1())
                .collect();
            if cuts.is_empty() {
                continue;
            }
            cuts.push(w.end1());
            cuts.sort();
            let mut e0 = w.end0();
            let mut subs = Vec::with_capacity(cuts.len());
            for e1 in cuts {
                subs.push(Wire::span(e0, e1));
                e0 = e1;
            }
            repl.put(Component::Wire(*w), wires(subs))?;
        }
        Ok(repl)
    }
}

impl CircuitTransaction for WireRepair {
    fn name(&self) -> &str {
        "wire repair"
    }

    fn accessed_circuits(&self) -> Vec<(Arc<Circuit>, Access)> {
        vec![(Arc::clone(&self.circuit), Access::ReadWrite)]
    }

    fn run(&mut self, mutator: &CircuitMutator) -> Result<()> {
        let merges = self.do_merges()?;
        self.apply(mutator, merges, "merge")?;
        let overlaps = self.do_overlaps()?;
        self.apply(mutator, overlaps, "overlap")?;
        let splits = self.do_splits()?;
        self.apply(mutator, splits, "split")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BitWidth, ComponentId};
    use crate::components::Pin;
    use crate::project::SimContext;
    use crate::txn::Transaction;

    fn w(a: (i32, i32), b: (i32, i32)) -> Wire {
        Wire::new(a.into(), b.into()).unwrap()
    }

    fn build(ctx: &SimContext, comps: Vec<Component>) -> Arc<Circuit> {
        let c = Circuit::new("repair", ctx);
        Transaction::new("build")
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

    #[test]
    fn test_merge_sets_union() {
        let mut sets = MergeSets::default();
        let (a, b, c, d) = (w((0, 0), (1, 0)), w((1, 0), (2, 0)), w((5, 0), (6, 0)), w((6, 0), (7, 0)));
        sets.merge(a, b);
        sets.merge(c, d);
        sets.merge(b, c);
        let all: Vec<Vec<Wire>> = sets.into_sets().collect();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].len(), 4);
    }

    #[test]
    fn test_chain_merges_into_one_wire() {
        let ctx = SimContext::new().unwrap();
        let c = build(
            &ctx,
            vec![
                Component::Wire(w((0, 0), (10, 0))),
                Component::Wire(w((10, 0), (20, 0))),
                Component::Wire(w((20, 0), (30, 0))),
            ],
        );
        assert_eq!(c.wires(), vec![w((0, 0), (30, 0))]);
    }

    #[test]
    fn test_pin_on_junction_blocks_merge() {
        let ctx = SimContext::new().unwrap();
        let pin = Pin::output(ComponentId(1), Location::new(10, 0), BitWidth::ONE, None);
        let c = build(
            &ctx,
            vec![
                Component::Wire(w((0, 0), (10, 0))),
                Component::Wire(w((10, 0), (20, 0))),
                Component::Pin(pin),
            ],
        );
        assert_eq!(c.wires(), vec![w((0, 0), (10, 0)), w((10, 0), (20, 0))]);
    }

    #[test]
    fn test_overlaps_fuse_and_recut() {
        let ctx = SimContext::new().unwrap();
        let c = build(
            &ctx,
            vec![
                Component::Wire(w((0, 0), (20, 0))),
                Component::Wire(w((10, 0), (30, 0))),
                Component::Wire(w((15, 0), (15, 10))),
            ],
        );
        // the vertical branch cuts the fused span at x = 15
        assert_eq!(c.wires(), vec![w((0, 0), (15, 0)), w((15, 0), (15, 10)), w((15, 0), (30, 0))]);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let ctx = SimContext::new().unwrap();
        let c = build(
            &ctx,
            vec![
                Component::Wire(w((0, 0), (40, 0))),
                Component::Wire(w((20, 0), (20, 20))),
                Component::Wire(w((0, 20), (10, 20))),
                Component::Wire(w((10, 20), (20, 20))),
            ],
        );
        let before = c.wires();
        let again = WireRepair::repair(&c).unwrap();
        assert!(again.is_empty());
        assert_eq!(c.wires(), before);
    }

    #[test]
    fn test_split_records_replacement() {
        let ctx = SimContext::new().unwrap();
        let c = build(&ctx, vec![Component::Wire(w((0, 0), (0, 30)))]);
        let pin = Pin::input(ComponentId(7), Location::new(0, 10), BitWidth::ONE, None);
        Transaction::new("drop pin")
            .write(&c)
            .run(|m| m.add(&c, Component::Pin(pin.clone())))
            .unwrap();
        assert_eq!(c.wires(), vec![w((0, 0), (0, 10)), w((0, 10), (0, 30))]);
        assert!(WireRepair::repair(&c).unwrap().is_empty());
    }
}
