//! The handle through which a transaction body edits circuits.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use super::replacement::ReplacementMap;
use crate::circuit::{Circuit, CircuitPins, ComponentId};
use crate::components::{Component, ComponentKey, EndData, Splitter};
use crate::error::Result;

enum UndoEntry {
    Added(Arc<Circuit>, Component),
    Removed(Arc<Circuit>, Component),
    EndAdded(Arc<Circuit>, ComponentKey, EndData),
    EndRemoved(Arc<Circuit>, ComponentKey, EndData),
    Splitter(Arc<Circuit>, Splitter),
    Ports(Arc<Circuit>, CircuitPins),
}

impl UndoEntry {
    fn circuit(&self) -> &Arc<Circuit> {
        match self {
            Self::Added(c, _)
            | Self::Removed(c, _)
            | Self::EndAdded(c, _, _)
            | Self::EndRemoved(c, _, _)
            | Self::Splitter(c, _)
            | Self::Ports(c, _) => c,
        }
    }
}

struct MutatorState {
    label: String,
    modified: BTreeMap<u64, Arc<Circuit>>,
    replacements: BTreeMap<u64, ReplacementMap>,
    undo: Vec<UndoEntry>,
}

/// Records every structural edit made by one transaction.
///
/// Each edit is checked against the circuit's write lock, then logged in
/// the per-circuit [`ReplacementMap`] and in an undo log used to roll the
/// transaction back when its body fails.
#[derive(Clone)]
pub struct CircuitMutator {
    inner: Arc<Mutex<MutatorState>>,
}

impl CircuitMutator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MutatorState {
                label: label.into(),
                modified: BTreeMap::new(),
                replacements: BTreeMap::new(),
                undo: Vec::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MutatorState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn label(&self) -> String {
        self.state().label.clone()
    }

    /// Whether both handles belong to the same transaction.
    pub fn ptr_eq(&self, other: &CircuitMutator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn record(&self, circuit: &Arc<Circuit>, undo: UndoEntry, update: impl FnOnce(&mut ReplacementMap) -> Result<()>) -> Result<()> {
        let serial = circuit.locker().serial();
        let mut state = self.state();
        state.modified.entry(serial).or_insert_with(|| Arc::clone(circuit));
        state.undo.push(undo);
        update(state.replacements.entry(serial).or_default())
    }

    pub fn add(&self, circuit: &Arc<Circuit>, comp: Component) -> Result<()> {
        if circuit.add(comp.clone())? {
            self.record(circuit, UndoEntry::Added(Arc::clone(circuit), comp.clone()), |r| r.add(comp))?;
        }
        Ok(())
    }

    pub fn remove(&self, circuit: &Arc<Circuit>, comp: &Component) -> Result<()> {
        if let Some(old) = circuit.remove(&comp.key())? {
            self.record(circuit, UndoEntry::Removed(Arc::clone(circuit), old.clone()), |r| r.remove(old))?;
        }
        Ok(())
    }

    pub fn add_end(&self, circuit: &Arc<Circuit>, key: ComponentKey, end: EndData) -> Result<()> {
        circuit.add_end(key, end)?;
        self.record(circuit, UndoEntry::EndAdded(Arc::clone(circuit), key, end), |_| Ok(()))
    }

    pub fn remove_end(&self, circuit: &Arc<Circuit>, key: ComponentKey, end: EndData) -> Result<()> {
        circuit.remove_end(key, end)?;
        self.record(circuit, UndoEntry::EndRemoved(Arc::clone(circuit), key, end), |_| Ok(()))
    }

    /// Apply a substitution: remove every removal, add every addition, and
    /// compose the map into this transaction's record for the circuit.
    pub fn replace(&self, circuit: &Arc<Circuit>, repl: &ReplacementMap) -> Result<()> {
        if repl.is_empty() {
            return Ok(());
        }
        let mut undo = Vec::new();
        for old in repl.removals() {
            if let Some(removed) = circuit.remove(&old.key())? {
                undo.push(UndoEntry::Removed(Arc::clone(circuit), removed));
            }
        }
        for new in repl.additions() {
            if circuit.add(new.clone())? {
                undo.push(UndoEntry::Added(Arc::clone(circuit), new.clone()));
            }
        }

        let serial = circuit.locker().serial();
        let mut state = self.state();
        state.modified.entry(serial).or_insert_with(|| Arc::clone(circuit));
        state.undo.extend(undo);
        state.replacements.entry(serial).or_default().append(repl);
        Ok(())
    }

    /// Install a new routing table on a splitter.
    pub fn set_splitter_mapping(&self, circuit: &Arc<Circuit>, id: ComponentId, bit_end: Vec<u8>) -> Result<()> {
        let old = circuit.reconfigure_splitter(id, bit_end)?;
        self.record(circuit, UndoEntry::Splitter(Arc::clone(circuit), old), |_| Ok(()))
    }

    /// Note that a circuit changed, without any edit of this mutator.
    pub fn mark_modified(&self, circuit: &Arc<Circuit>) {
        self.state()
            .modified
            .entry(circuit.locker().serial())
            .or_insert_with(|| Arc::clone(circuit));
    }

    /// Fold in the replacements a nested transaction made on `circuit`.
    pub(crate) fn merge_replacements(&self, circuit: &Arc<Circuit>, repl: &ReplacementMap) {
        self.state()
            .replacements
            .entry(circuit.locker().serial())
            .or_default()
            .append(repl);
    }

    /// Move the undo entries for `circuit` into `outer`'s log, keeping their
    /// order, so that a failing outer transaction also undoes them.
    pub(crate) fn hand_over(&self, outer: &CircuitMutator, circuit: &Arc<Circuit>) {
        let serial = circuit.locker().serial();
        let moved: Vec<UndoEntry> = {
            let mut state = self.state();
            let (moved, kept) = std::mem::take(&mut state.undo)
                .into_iter()
                .partition(|e| e.circuit().locker().serial() == serial);
            state.undo = kept;
            moved
        };
        outer.state().undo.extend(moved);
    }

    /// Re-bind the appearance ports of `circuit` to this transaction's
    /// replacements, logging the old slots for rollback.
    pub(crate) fn resync_pins(&self, circuit: &Arc<Circuit>) {
        let Some(repl) = self.replacement_map(circuit) else {
            return;
        };
        let before = circuit.resync_pins(&repl);
        self.state().undo.push(UndoEntry::Ports(Arc::clone(circuit), before));
    }

    /// Modified circuits in serial order.
    pub fn modified_circuits(&self) -> Vec<Arc<Circuit>> {
        self.state().modified.values().cloned().collect()
    }

    pub fn replacement_map(&self, circuit: &Circuit) -> Option<ReplacementMap> {
        self.state().replacements.get(&circuit.locker().serial()).cloned()
    }

    pub(crate) fn take_replacements(&self) -> BTreeMap<u64, ReplacementMap> {
        std::mem::take(&mut self.state().replacements)
    }

    /// Undo every edit in reverse order. Returns the number of edits undone.
    pub fn rollback(&self) -> usize {
        let undo = {
            let mut state = self.state();
            state.replacements.clear();
            std::mem::take(&mut state.undo)
        };
        let count = undo.len();
        for entry in undo.into_iter().rev() {
            match entry {
                UndoEntry::Added(c, comp) => {
                    c.remove_unchecked(&comp.key());
                }
                UndoEntry::Removed(c, comp) => {
                    c.add_unchecked(comp);
                }
                UndoEntry::EndAdded(c, key, end) => c.remove_end_unchecked(key, end),
                UndoEntry::EndRemoved(c, key, end) => c.add_end_unchecked(key, end),
                UndoEntry::Splitter(c, old) => {
                    c.replace_splitter_unchecked(old);
                }
                UndoEntry::Ports(c, pins) => c.restore_pins(pins),
            }
        }
        debug!(edits = count, "rolled back transaction edits");
        count
    }
}

impl std::fmt::Debug for CircuitMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CircuitMutator({})", self.label())
    }
}
