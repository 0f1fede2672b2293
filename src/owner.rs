//! The owner role: a single thread that recomputes bundle maps.
//!
//! Any thread may ask a circuit for its bundle map. When the cached map is
//! stale, the recomputation is submitted to the owner as a job and the caller
//! blocks on a rendezvous channel for the result. Calls made on the owner
//! thread itself (or through an inline handle) run the job directly.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::debug;

use crate::error::{GatesimError, Result};

type Job = Box<dyn FnOnce() + Send>;

enum OwnerInner {
    Thread {
        sender: Mutex<mpsc::Sender<Job>>,
        thread_id: thread::ThreadId,
    },
    Inline,
}

/// Cloneable handle to the owner role.
#[derive(Clone)]
pub struct OwnerHandle {
    inner: Arc<OwnerInner>,
}

impl OwnerHandle {
    /// Start a dedicated owner thread. It exits once every handle is dropped.
    pub fn spawn() -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name("gatesim-owner".to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
                debug!("owner thread exiting");
            })
            .map_err(|e| GatesimError::OwnerUnavailable {
                message: e.to_string(),
            })?;
        let thread_id = handle.thread().id();
        Ok(Self {
            inner: Arc::new(OwnerInner::Thread {
                sender: Mutex::new(sender),
                thread_id,
            }),
        })
    }

    /// Owner bound to whichever thread calls it.
    pub fn inline() -> Self {
        Self {
            inner: Arc::new(OwnerInner::Inline),
        }
    }

    /// Whether the current thread may run owner jobs directly.
    pub fn is_owner_thread(&self) -> bool {
        match &*self.inner {
            OwnerInner::Inline => true,
            OwnerInner::Thread { thread_id, .. } => *thread_id == thread::current().id(),
        }
    }

    /// Run `f` on the owner and wait for its result.
    pub fn run_sync<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let sender = match &*self.inner {
            OwnerInner::Thread { sender, thread_id } if *thread_id != thread::current().id() => sender,
            _ => return Ok(f()),
        };

        let (reply_tx, reply_rx) = mpsc::sync_channel::<T>(1);
        let job: Job = Box::new(move || {
            // The caller may have given up; nothing to do then.
            let _ = reply_tx.send(f());
        });
        sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(job)
            .map_err(|_| GatesimError::OwnerUnavailable {
                message: "owner thread has stopped".to_string(),
            })?;
        reply_rx.recv().map_err(|_| GatesimError::OwnerUnavailable {
            message: "owner thread dropped the request".to_string(),
        })
    }
}

impl std::fmt::Debug for OwnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.inner {
            OwnerInner::Inline => write!(f, "OwnerHandle(inline)"),
            OwnerInner::Thread { thread_id, .. } => write!(f, "OwnerHandle({:?})", thread_id),
        }
    }
}

/// Name and id of the calling thread, for diagnostics.
pub fn describe_current_thread() -> String {
    let current = thread::current();
    format!("{}{:?}", current.name().unwrap_or("unnamed"), current.id())
}
