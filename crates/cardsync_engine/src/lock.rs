//! Per-connection mutual exclusion.

use crate::error::{SyncError, SyncResult};
use crate::ids::ConnectionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Registry of connections with an operation in progress.
///
/// At most one lease exists per connection. Leases are released when
/// dropped, so a panicking or failing run never leaves a connection stuck.
#[derive(Debug, Default)]
pub struct ConnectionLocks {
    active: Mutex<HashMap<ConnectionId, Arc<AtomicBool>>>,
}

impl ConnectionLocks {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `id`, or fails with
    /// [`SyncError::AlreadyRunning`].
    pub fn acquire(&self, id: ConnectionId) -> SyncResult<SyncLease<'_>> {
        let mut active = self.active.lock();
        if active.contains_key(&id) {
            return Err(SyncError::AlreadyRunning(id));
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        active.insert(id, Arc::clone(&cancelled));
        Ok(SyncLease {
            locks: self,
            id,
            cancelled,
        })
    }

    /// Requests cancellation of the operation holding `id`. Returns false
    /// if nothing is running.
    pub fn cancel(&self, id: ConnectionId) -> bool {
        match self.active.lock().get(&id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Whether a lease for `id` is held.
    pub fn is_locked(&self, id: ConnectionId) -> bool {
        self.active.lock().contains_key(&id)
    }
}

/// Exclusive right to operate on one connection.
#[derive(Debug)]
pub struct SyncLease<'a> {
    locks: &'a ConnectionLocks,
    id: ConnectionId,
    cancelled: Arc<AtomicBool>,
}

impl SyncLease<'_> {
    /// The leased connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`SyncError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Drop for SyncLease<'_> {
    fn drop(&mut self) {
        self.locks.active.lock().remove(&self.id);
    }
}
