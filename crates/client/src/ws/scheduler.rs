//! One-shot timers for reconnect backoff and debounced edits.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub(crate) u64);

/// Runs a callback once after a delay, on the same thread as the caller.
///
/// Cancelling a timer that already fired (or was already cancelled) is a no-op.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId;
    fn cancel(&self, id: TimerId);
}

/// Timers backed by `tokio::time::sleep` on the current `LocalSet`.
///
/// Must be used from inside a `LocalSet`; pending timers are aborted when the
/// scheduler is dropped.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: Cell<u64>,
    timers: Rc<RefCell<HashMap<TimerId, AbortHandle>>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) -> TimerId {
        let id = TimerId(self.next_id.get());
        self.next_id.set(id.0 + 1);

        let timers = Rc::downgrade(&self.timers);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(timers) = timers.upgrade() {
                timers.borrow_mut().remove(&id);
            }
            task();
        });
        self.timers.borrow_mut().insert(id, handle.abort_handle());
        id
    }

    fn cancel(&self, id: TimerId) {
        let handle = self.timers.borrow_mut().remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.timers.borrow_mut().drain() {
            handle.abort();
        }
    }
}
