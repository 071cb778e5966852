//! Level-triggered work queue for reconciliation keys.
//!
//! A key present in the queue means "this object needs attention", not
//! "these N events happened". Adds while a key is being processed are
//! remembered and the key is re-queued on `done`, so a burst of updates
//! collapses to at most one extra reconciliation.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct Inner {
    /// FIFO order of keys awaiting a worker.
    queue: VecDeque<String>,
    /// Keys that need processing (queued or marked while in flight).
    dirty: HashSet<String>,
    /// Keys currently held by a worker.
    processing: HashSet<String>,
    shutting_down: bool,
}

/// Deduplicating FIFO queue with in-flight tracking.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Marks a key as needing reconciliation.
    ///
    /// No-op when the key is already pending. If a worker currently holds
    /// the key, it is only marked dirty and re-enters the queue when that
    /// worker calls [`done`](Self::done).
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut inner = self.inner.lock().unwrap();
        if inner.shutting_down || inner.dirty.contains(&key) {
            return;
        }
        inner.dirty.insert(key.clone());
        if !inner.processing.contains(&key) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Blocks until a key is available or the queue shuts down.
    ///
    /// Returns `None` only on shutdown. The caller must call
    /// [`done`](Self::done) with the returned key when finished.
    pub async fn get(&self) -> Option<String> {
        loop {
            // Register for wakeup before checking state, otherwise a
            // notify between the check and the await would be lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    // Wake another waiter if more work remains.
                    if !inner.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Releases a key taken via [`get`](Self::get). Re-queues it if it was
    /// re-added while in flight.
    pub fn done(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.processing.remove(key);
        if inner.dirty.contains(key) && !inner.shutting_down {
            inner.queue.push_back(key.to_string());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Rejects further adds and wakes all blocked getters.
    pub fn shut_down(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Number of keys awaiting a worker (excludes in-flight keys).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().queue.is_empty()
    }
}
