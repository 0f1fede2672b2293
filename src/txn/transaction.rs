//! Transactions: declared circuit access, locked execution, repair.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error};

use super::locker::acquire_locks;
use super::mutator::CircuitMutator;
use super::repair::WireRepair;
use super::replacement::ReplacementMap;
use crate::circuit::Circuit;
use crate::error::Result;
use crate::owner::describe_current_thread;

/// How a transaction uses a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// A unit of structural editing.
///
/// Implementors declare up front every circuit they touch and how; the body
/// then edits through the supplied [`CircuitMutator`].
pub trait CircuitTransaction {
    fn name(&self) -> &str {
        "transaction"
    }

    fn accessed_circuits(&self) -> Vec<(Arc<Circuit>, Access)>;

    fn run(&mut self, mutator: &CircuitMutator) -> Result<()>;
}

/// What a completed transaction changed.
#[derive(Debug, Clone)]
pub struct TransactionResult {
    modified: Vec<Arc<Circuit>>,
    replacements: BTreeMap<u64, ReplacementMap>,
}

impl TransactionResult {
    fn new(mutator: &CircuitMutator) -> Self {
        let mut replacements = mutator.take_replacements();
        for repl in replacements.values_mut() {
            repl.freeze();
        }
        Self {
            modified: mutator.modified_circuits(),
            replacements,
        }
    }

    pub fn modified_circuits(&self) -> &[Arc<Circuit>] {
        &self.modified
    }

    /// Frozen record of everything replaced in `circuit`.
    pub fn replacement_map(&self, circuit: &Circuit) -> Option<&ReplacementMap> {
        self.replacements.get(&circuit.locker().serial())
    }
}

/// Run a transaction: lock, edit, resync ports, repair wires, release.
///
/// A body that fails is rolled back and its locks are released before the
/// error is returned. Circuits whose write lock belongs to an enclosing
/// transaction on this thread are handed back to that transaction together
/// with their undo entries; it repairs them when it completes, or rolls them
/// back if it fails.
pub fn execute(txn: &mut dyn CircuitTransaction) -> Result<TransactionResult> {
    let mutator = CircuitMutator::new(txn.name());
    let requests = txn.accessed_circuits();
    debug!(transaction = txn.name(), circuits = requests.len(), "starting transaction");

    let locks = acquire_locks(&requests, &mutator)?;

    if let Err(e) = txn.run(&mutator) {
        if e.is_lock_violation() {
            error!("circuit lock diagnostics");
            error!("this thread: {}", describe_current_thread());
            error!("owns {} locks, as follows:", locks.len());
            for line in locks.describe() {
                error!("  {}", line);
            }
            error!("attempted access without a lock: {}", e);
        }
        mutator.rollback();
        drop(locks);
        return Err(e);
    }

    let owns = |c: &Arc<Circuit>| c.locker().mutator().is_some_and(|m| m.ptr_eq(&mutator));
    let modified = mutator.modified_circuits();

    // Ports first: re-bound pins may move wire junctions.
    for circuit in modified.iter().filter(|c| owns(c)) {
        mutator.resync_pins(circuit);
    }

    for circuit in modified.iter().filter(|c| owns(c)) {
        let mut repair = WireRepair::new(Arc::clone(circuit));
        if let Err(e) = repair.run(&mutator) {
            mutator.rollback();
            drop(locks);
            return Err(e);
        }
    }

    for circuit in &modified {
        if let Some(outer) = circuit.locker().mutator().filter(|m| !m.ptr_eq(&mutator)) {
            outer.mark_modified(circuit);
            mutator.hand_over(&outer, circuit);
            if let Some(repl) = mutator.replacement_map(circuit) {
                outer.merge_replacements(circuit, &repl);
            }
        }
    }

    let result = TransactionResult::new(&mutator);
    drop(locks);
    debug!(
        transaction = txn.name(),
        modified = result.modified_circuits().len(),
        "transaction complete"
    );
    Ok(result)
}

/// Closure-bodied transaction builder.
///
/// ```ignore
/// Transaction::new("add wire")
///     .write(&circuit)
///     .run(|m| m.add(&circuit, Component::Wire(wire)))?;
/// ```
pub struct Transaction {
    name: String,
    circuits: Vec<(Arc<Circuit>, Access)>,
}

impl Transaction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            circuits: Vec::new(),
        }
    }

    pub fn read(mut self, circuit: &Arc<Circuit>) -> Self {
        self.circuits.push((Arc::clone(circuit), Access::ReadOnly));
        self
    }

    pub fn write(mut self, circuit: &Arc<Circuit>) -> Self {
        self.circuits.push((Arc::clone(circuit), Access::ReadWrite));
        self
    }

    pub fn run<F>(self, body: F) -> Result<TransactionResult>
    where
        F: FnOnce(&CircuitMutator) -> Result<()>,
    {
        let mut txn = ClosureTransaction {
            name: self.name,
            circuits: self.circuits,
            body: Some(body),
        };
        execute(&mut txn)
    }
}

struct ClosureTransaction<F> {
    name: String,
    circuits: Vec<(Arc<Circuit>, Access)>,
    body: Option<F>,
}

impl<F> CircuitTransaction for ClosureTransaction<F>
where
    F: FnOnce(&CircuitMutator) -> Result<()>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn accessed_circuits(&self) -> Vec<(Arc<Circuit>, Access)> {
        self.circuits.clone()
    }

    fn run(&mut self, mutator: &CircuitMutator) -> Result<()> {
        match self.body.take() {
            Some(body) => body(mutator),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::{BitWidth, ComponentId, Location, Wire};
    use crate::components::{Component, Pin, Splitter};
    use crate::error::GatesimError;
    use crate::project::SimContext;

    fn loc(x: i32, y: i32) -> Location {
        Location::new(x, y)
    }

    fn wire(a: (i32, i32), b: (i32, i32)) -> Component {
        Component::Wire(Wire::new(a.into(), b.into()).unwrap())
    }

    #[test]
    fn test_failed_body_rolls_back() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        Transaction::new("seed")
            .write(&c)
            .run(|m| m.add(&c, wire((0, 0), (10, 0))))
            .unwrap();
        let generation = c.generation();

        let err = Transaction::new("doomed")
            .write(&c)
            .run(|m| {
                m.remove(&c, &wire((0, 0), (10, 0)))?;
                m.add(&c, wire((0, 50), (10, 50)))?;
                Err(GatesimError::topology("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, GatesimError::InvalidTopology { .. }));
        assert_eq!(c.wires(), vec![Wire::new(loc(0, 0), loc(10, 0)).unwrap()]);
        assert!(c.generation() > generation);
        assert!(!c.locker().has_write_lock());
    }

    #[test]
    fn test_write_to_undeclared_circuit_is_violation() {
        let ctx = SimContext::new().unwrap();
        let declared = Circuit::new("declared", &ctx);
        let other = Circuit::new("other", &ctx);
        let err = Transaction::new("sneaky")
            .write(&declared)
            .run(|m| {
                m.add(&declared, wire((0, 0), (10, 0)))?;
                m.add(&other, wire((0, 0), (10, 0)))
            })
            .unwrap_err();
        assert!(err.is_lock_violation());
        assert!(declared.wires().is_empty());
        assert!(other.wires().is_empty());
    }

    #[test]
    fn test_read_only_access_cannot_mutate() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let err = Transaction::new("reader")
            .read(&c)
            .run(|m| m.add(&c, wire((0, 0), (10, 0))))
            .unwrap_err();
        assert!(err.is_lock_violation());
    }

    #[test]
    fn test_result_reports_repaired_wires() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        Transaction::new("trunk")
            .write(&c)
            .run(|m| m.add(&c, wire((0, 0), (20, 0))))
            .unwrap();
        let result = Transaction::new("branch")
            .write(&c)
            .run(|m| m.add(&c, wire((10, 0), (10, 20))))
            .unwrap();

        // the T junction splits the existing trunk in two
        let repl = result.replacement_map(&c).unwrap();
        assert!(repl.is_frozen());
        let split = repl.replacements_for(&wire((0, 0), (20, 0))).unwrap();
        assert_eq!(split.len(), 2);
        assert!(split.contains(&wire((0, 0), (10, 0))));
        assert!(split.contains(&wire((10, 0), (20, 0))));
        assert_eq!(repl.additions().count(), 3);
        assert_eq!(c.wires().len(), 3);
        assert_eq!(result.modified_circuits().len(), 1);

        // wires created and split in one transaction show up as plain additions
        let fresh = Circuit::new("fresh", &ctx);
        let result = Transaction::new("draw")
            .write(&fresh)
            .run(|m| {
                m.add(&fresh, wire((0, 0), (20, 0)))?;
                m.add(&fresh, wire((10, 0), (10, 20)))
            })
            .unwrap();
        let repl = result.replacement_map(&fresh).unwrap();
        assert_eq!(repl.removals().count(), 0);
        assert_eq!(repl.additions().count(), 3);
    }

    #[test]
    fn test_nested_transaction_joins_outer() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let result = Transaction::new("outer")
            .write(&c)
            .run(|m| {
                m.add(&c, wire((0, 0), (10, 0)))?;
                Transaction::new("inner")
                    .write(&c)
                    .run(|inner| inner.add(&c, wire((10, 0), (20, 0))))?;
                assert!(c.locker().mutator().unwrap().ptr_eq(m));
                Ok(())
            })
            .unwrap();
        // the outer repair merges the two collinear wires
        assert_eq!(c.wires(), vec![Wire::new(loc(0, 0), loc(20, 0)).unwrap()]);
        let repl = result.replacement_map(&c).unwrap();
        assert_eq!(repl.additions().count(), 1);
    }

    #[test]
    fn test_failed_outer_undoes_nested_edits() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let err = Transaction::new("outer")
            .write(&c)
            .run(|m| {
                m.add(&c, wire((0, 0), (0, 10)))?;
                Transaction::new("inner")
                    .write(&c)
                    .run(|inner| inner.add(&c, wire((50, 0), (50, 10))))?;
                assert_eq!(c.wires().len(), 2);
                Err(GatesimError::topology("abort"))
            })
            .unwrap_err();
        assert!(matches!(err, GatesimError::InvalidTopology { .. }));
        assert!(c.wires().is_empty());
        assert!(!c.locker().has_write_lock());
    }

    #[test]
    fn test_rollback_restores_port_slots() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let a = Component::Pin(Pin::input(ComponentId(1), loc(0, 0), BitWidth::ONE, None));
        let b = Component::Pin(Pin::output(ComponentId(2), loc(40, 0), BitWidth::ONE, None));
        Transaction::new("ports")
            .write(&c)
            .run(|m| {
                m.add(&c, a.clone())?;
                m.add(&c, b.clone())
            })
            .unwrap();
        let port_ids = |c: &Arc<Circuit>| c.port_pins().iter().map(|p| p.id).collect::<Vec<_>>();
        assert_eq!(port_ids(&c), vec![ComponentId(1), ComponentId(2)]);

        let m = CircuitMutator::new("swap");
        let locks = acquire_locks(&[(Arc::clone(&c), Access::ReadWrite)], &m).unwrap();
        let moved = Component::Pin(Pin::input(ComponentId(5), loc(0, 0), BitWidth::ONE, None));
        m.replace(&c, &ReplacementMap::single(a.clone(), moved)).unwrap();
        m.resync_pins(&c);
        assert_eq!(port_ids(&c), vec![ComponentId(5), ComponentId(2)]);

        m.rollback();
        drop(locks);
        assert_eq!(port_ids(&c), vec![ComponentId(1), ComponentId(2)]);
    }

    #[test]
    fn test_ports_and_splitter_reconfiguration() {
        let ctx = SimContext::new().unwrap();
        let c = Circuit::new("top", &ctx);
        let a = Pin::input(ComponentId(1), loc(0, 0), BitWidth::new(2), None);
        let b = Pin::output(ComponentId(2), loc(40, 0), BitWidth::new(2), None);
        let s = Splitter::new(ComponentId(3), loc(0, 0), vec![loc(20, 0), loc(20, 10)], 2, None).unwrap();
        Transaction::new("ports")
            .write(&c)
            .run(|m| {
                m.add(&c, Component::Pin(a.clone()))?;
                m.add(&c, Component::Pin(b.clone()))?;
                m.add(&c, Component::Splitter(s.clone()))
            })
            .unwrap();
        let ports: Vec<ComponentId> = c.port_pins().iter().map(|p| p.id).collect();
        assert_eq!(ports, vec![ComponentId(1), ComponentId(2)]);

        Transaction::new("remap")
            .write(&c)
            .run(|m| m.set_splitter_mapping(&c, ComponentId(3), vec![2, 1]))
            .unwrap();
        match c.component(ComponentId(3)) {
            Some(Component::Splitter(s)) => assert_eq!(s.bit_end(), &[2, 1]),
            other => panic!("unexpected {:?}", other),
        }

        let err = Transaction::new("bad remap")
            .write(&c)
            .run(|m| {
                m.set_splitter_mapping(&c, ComponentId(3), vec![1, 1])?;
                m.set_splitter_mapping(&c, ComponentId(3), vec![9, 9])
            })
            .unwrap_err();
        assert!(matches!(err, GatesimError::InvalidTopology { .. }));
        match c.component(ComponentId(3)) {
            Some(Component::Splitter(s)) => assert_eq!(s.bit_end(), &[2, 1]),
            other => panic!("unexpected {:?}", other),
        }
    }
}
