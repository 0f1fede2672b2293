//! Structural editing of circuits under per-circuit locks.
//!
//! Every change to a circuit's wires or components happens inside a
//! transaction. A transaction declares the circuits it reads and writes,
//! takes their locks in ascending serial order, runs its body against a
//! [`CircuitMutator`], re-binds the appearance ports of the circuits it
//! changed and finally runs [`WireRepair`] over them. The net effect on each
//! circuit is reported as a frozen [`ReplacementMap`].
//!
//! ```ignore
//! use gatesim_core::txn::Transaction;
//!
//! let result = Transaction::new("add wire")
//!     .write(&circuit)
//!     .run(|m| m.add(&circuit, Component::Wire(wire)))?;
//! for c in result.modified_circuits() {
//!     println!("{} changed", c.name());
//! }
//! ```

mod locker;
mod mutator;
mod repair;
mod replacement;
mod transaction;

pub use locker::{acquire_locks, CircuitLocker, HeldLocks};
pub use mutator::CircuitMutator;
pub use repair::WireRepair;
pub use replacement::ReplacementMap;
pub use transaction::{execute, Access, CircuitTransaction, Transaction, TransactionResult};
