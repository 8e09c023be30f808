use std::{
    collections::BTreeMap,
    sync::{Condvar, Mutex, MutexGuard},
};

use crate::{
    error::{Error, Result},
    record::Sink,
};

struct Reorder<R, K> {
    next: usize,
    waiting: BTreeMap<usize, Vec<R>>,
    inner: K,
    closed: bool,
}

/// Accepts numbered batches from any thread and writes them to `inner` in
/// batch order.
///
/// At most `window` batches may be outstanding past the next one due:
/// [`wait_turn`](Self::wait_turn) holds a producer back until its batch is
/// within that window, so out-of-order batches held in memory stay bounded.
pub struct ReorderingSink<R, K> {
    state: Mutex<Reorder<R, K>>,
    advanced: Condvar,
    window: usize,
}

fn poisoned() -> Error {
    Error::config("output sink poisoned by a panicked worker")
}

impl<R, K: Sink<R>> ReorderingSink<R, K> {
    pub fn new(inner: K, window: usize) -> Self {
        ReorderingSink {
            state: Mutex::new(Reorder { next: 0, waiting: BTreeMap::new(), inner, closed: false }),
            advanced: Condvar::new(),
            window: window.max(1),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Reorder<R, K>>> {
        self.state.lock().map_err(|_| poisoned())
    }

    /// Block until batch `index` is within the window. Returns `false` if
    /// the sink was closed meanwhile and the batch should not be produced.
    pub fn wait_turn(&self, index: usize) -> Result<bool> {
        let state = self.lock()?;
        let state = self
            .advanced
            .wait_while(state, |s| !s.closed && index >= s.next + self.window)
            .map_err(|_| poisoned())?;
        Ok(!state.closed)
    }

    /// Hand over batch `index`. Writes it, and any batches it unblocks, if
    /// it is the next one due.
    pub fn submit(&self, index: usize, batch: Vec<R>) -> Result<()> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.waiting.insert(index, batch);
        let before = state.next;
        while let Some(batch) = state.waiting.remove(&state.next) {
            for record in &batch {
                state.inner.write(record)?;
            }
            state.next += 1;
        }
        if state.next != before {
            self.advanced.notify_all();
        }
        Ok(())
    }

    /// Release every producer waiting for its turn; later waits return
    /// `false` at once.
    pub fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        self.advanced.notify_all();
    }

    /// Number of batches written so far.
    pub fn written(&self) -> usize {
        self.state.lock().map(|s| s.next).unwrap_or(0)
    }

    /// Batches received but not yet written.
    pub fn held(&self) -> usize {
        self.state.lock().map(|s| s.waiting.len()).unwrap_or(0)
    }

    /// Finish the inner sink and give it back. Fails if a batch never
    /// arrived.
    pub fn finish(self) -> Result<K> {
        let Reorder { next, waiting, mut inner, .. } = self.state.into_inner().map_err(|_| poisoned())?;
        if !waiting.is_empty() {
            return Err(Error::config(format!("batch {} never arrived; {} later batches held back", next, waiting.len())));
        }
        inner.finish()?;
        Ok(inner)
    }
}
