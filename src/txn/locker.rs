//! Per-circuit read/write locks acquired in serial-number order.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::trace;

use super::mutator::CircuitMutator;
use super::transaction::Access;
use crate::circuit::Circuit;
use crate::error::{GatesimError, Result};
use crate::owner::describe_current_thread;

struct WriterInfo {
    thread: ThreadId,
    thread_desc: String,
    mutator: CircuitMutator,
}

#[derive(Default)]
struct LockState {
    readers: HashMap<ThreadId, usize>,
    writer: Option<WriterInfo>,
}

/// Guard of one circuit's structure.
///
/// The serial number is allocated once from the project's context and fixes
/// the global order in which transactions take locks. The read side is
/// reentrant and is granted to the thread holding the write side. The write
/// side is reentrant for its holder; the mutator recorded here stays the
/// outer transaction's while nested transactions run.
pub struct CircuitLocker {
    serial: u64,
    state: Mutex<LockState>,
    cond: Condvar,
}

impl CircuitLocker {
    pub fn new(serial: u64) -> Self {
        Self {
            serial,
            state: Mutex::new(LockState::default()),
            cond: Condvar::new(),
        }
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_write_lock(&self) -> bool {
        let me = thread::current().id();
        self.lock_state().writer.as_ref().is_some_and(|w| w.thread == me)
    }

    /// Mutator of the transaction holding the write lock, if any.
    pub fn mutator(&self) -> Option<CircuitMutator> {
        self.lock_state().writer.as_ref().map(|w| w.mutator.clone())
    }

    /// Description of the current write-lock holder.
    pub fn holder(&self) -> Option<String> {
        self.lock_state()
            .writer
            .as_ref()
            .map(|w| format!("thread {} in transaction '{}'", w.thread_desc, w.mutator.label()))
    }

    pub fn check_for_write_permission(&self, operation: &str, circuit: &str) -> Result<()> {
        if self.has_write_lock() {
            return Ok(());
        }
        Err(GatesimError::lock_violation(
            operation,
            circuit,
            self.serial,
            self.holder(),
        ))
    }

    fn lock_read(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        while state.writer.as_ref().is_some_and(|w| w.thread != me) {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        *state.readers.entry(me).or_insert(0) += 1;
    }

    fn unlock_read(&self) {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
        }
        drop(state);
        self.cond.notify_all();
    }

    /// Take the write lock. Returns false when this thread already held it.
    fn lock_write(&self, circuit: &str, mutator: &CircuitMutator) -> Result<bool> {
        let me = thread::current().id();
        let mut state = self.lock_state();
        if state.writer.as_ref().is_some_and(|w| w.thread == me) {
            return Ok(false);
        }
        if state.readers.contains_key(&me) {
            return Err(GatesimError::LockUpgrade {
                circuit: circuit.to_string(),
                serial: self.serial,
                thread: describe_current_thread(),
            });
        }
        while state.writer.is_some() || !state.readers.is_empty() {
            state = self.cond.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.writer = Some(WriterInfo {
            thread: me,
            thread_desc: describe_current_thread(),
            mutator: mutator.clone(),
        });
        Ok(true)
    }

    fn unlock_write(&self) {
        let mut state = self.lock_state();
        state.writer = None;
        drop(state);
        self.cond.notify_all();
    }
}

impl std::fmt::Debug for CircuitLocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitLocker")
            .field("serial", &self.serial)
            .field("holder", &self.holder())
            .finish()
    }
}

/// Locks taken by one transaction, released in reverse order on drop.
pub struct HeldLocks {
    held: Vec<(Arc<Circuit>, Access)>,
}

impl HeldLocks {
    /// Serial numbers in acquisition order.
    pub fn order(&self) -> Vec<u64> {
        self.held.iter().map(|(c, _)| c.locker().serial()).collect()
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// One line per held lock, for diagnostics.
    pub fn describe(&self) -> Vec<String> {
        self.held
            .iter()
            .map(|(c, access)| {
                format!(
                    "circuit \"{}\" [lock serial: {}] with {:?} lock",
                    c.name(),
                    c.locker().serial(),
                    access
                )
            })
            .collect()
    }
}

impl Drop for HeldLocks {
    fn drop(&mut self) {
        while let Some((circuit, access)) = self.held.pop() {
            trace!(circuit = circuit.name(), ?access, "releasing lock");
            match access {
                Access::ReadOnly => circuit.locker().unlock_read(),
                Access::ReadWrite => circuit.locker().unlock_write(),
            }
        }
    }
}

/// Acquire every requested lock in ascending serial order.
///
/// A circuit requested twice is locked once, with the stronger access. Write
/// locks this thread already holds are skipped. On failure the locks taken so
/// far are released before the error is returned.
pub fn acquire_locks(requests: &[(Arc<Circuit>, Access)], mutator: &CircuitMutator) -> Result<HeldLocks> {
    let mut ordered: Vec<(Arc<Circuit>, Access)> = requests.to_vec();
    ordered.sort_by(|(a, x), (b, y)| {
        a.locker()
            .serial()
            .cmp(&b.locker().serial())
            .then(y.cmp(x))
    });
    ordered.dedup_by_key(|(c, _)| c.locker().serial());

    let mut held = HeldLocks { held: Vec::with_capacity(ordered.len()) };
    for (circuit, access) in ordered {
        let locker = circuit.locker();
        trace!(circuit = circuit.name(), serial = locker.serial(), ?access, "acquiring lock");
        match access {
            Access::ReadOnly => {
                locker.lock_read();
                held.held.push((circuit, access));
            }
            Access::ReadWrite => {
                if locker.lock_write(circuit.name(), mutator)? {
                    held.held.push((circuit, access));
                }
            }
        }
    }
    Ok(held)
}
