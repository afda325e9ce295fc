//! # Connection manager
//! Tracks long-lived connections and background tasks together with the
//! hook that tears each one down.
//!
//! Owned explicitly and passed to whoever opens connections; nothing here is
//! global. Every hook runs at most once: on `close`, on `close_all`, or when
//! the manager is dropped.

use std::collections::BTreeMap;
use std::sync::Mutex;

type CloseHook = Box<dyn FnOnce() + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionHandle(u64);

struct Entry {
    label: String,
    hook: CloseHook,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    // BTreeMap keeps registration order for close_all.
    entries: BTreeMap<u64, Entry>,
}

#[derive(Default)]
pub struct ConnectionManager {
    inner: Mutex<Inner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        label: impl Into<String>,
        hook: impl FnOnce() + Send + 'static,
    ) -> ConnectionHandle {
        let label = label.into();
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        tracing::debug!(id, %label, "connection registered");
        inner.entries.insert(
            id,
            Entry {
                label,
                hook: Box::new(hook),
            },
        );
        ConnectionHandle(id)
    }

    /// Forget a connection that closed on its own; its hook does not run.
    pub fn unregister(&self, handle: ConnectionHandle) -> bool {
        self.lock().entries.remove(&handle.0).is_some()
    }

    /// Run the hook for one connection. Returns false if it was already gone.
    pub fn close(&self, handle: ConnectionHandle) -> bool {
        let entry = self.lock().entries.remove(&handle.0);
        match entry {
            Some(e) => {
                tracing::debug!(id = handle.0, label = %e.label, "closing connection");
                (e.hook)();
                true
            }
            None => false,
        }
    }

    /// Close everything, in registration order. Returns how many hooks ran.
    pub fn close_all(&self) -> usize {
        // Hooks run outside the lock so they may touch the manager themselves.
        let entries = std::mem::take(&mut self.lock().entries);
        let n = entries.len();
        for (id, e) in entries {
            tracing::debug!(id, label = %e.label, "closing connection");
            (e.hook)();
        }
        if n > 0 {
            tracing::info!(closed = n, "connections closed");
        }
        n
    }

    pub fn active(&self) -> Vec<String> {
        self.lock()
            .entries
            .values()
            .map(|e| e.label.clone())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_all();
    }
}
