//! Per-key exclusive row locks (spec §4.1.6), grounded on the guard/`Drop`
//! discipline of the teacher's `SingleWriter` file-lock coordinator but
//! keyed per-row in memory rather than by OS file-range lock.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Non-blocking per-key exclusive lock table, owned by xid.
#[derive(Default)]
pub struct RowLockManager {
    owners: Mutex<HashMap<String, String>>,
}

impl RowLockManager {
    /// An empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire (or reacquire) the lock on `key` for `xid`.
    ///
    /// Non-blocking: returns `true` if the key was unlocked or already owned
    /// by `xid` (reentrance is a no-op); `false` if another xid holds it.
    pub fn try_lock(&self, xid: &str, key: &str) -> bool {
        let mut owners = self.owners.lock();
        match owners.get(key) {
            Some(owner) if owner == xid => true,
            Some(_) => false,
            None => {
                owners.insert(key.to_string(), xid.to_string());
                true
            }
        }
    }

    /// Releases every key currently owned by `xid`. Idempotent: calling this
    /// for an xid that holds no locks is a no-op.
    pub fn release_all(&self, xid: &str) {
        let mut owners = self.owners.lock();
        owners.retain(|_, owner| owner != xid);
    }

    /// Releases a single key, only if owned by `xid`. Used to unwind a
    /// partially-acquired lock set on a prepare failure (§4.1.2 step 1).
    pub fn release(&self, xid: &str, key: &str) {
        let mut owners = self.owners.lock();
        if owners.get(key).map(|o| o.as_str()) == Some(xid) {
            owners.remove(key);
        }
    }

    /// Returns the xid currently holding `key`'s lock, if any. Used by
    /// recovery to re-acquire locks for prepared transactions (§4.1.4).
    pub fn owner_of(&self, key: &str) -> Option<String> {
        self.owners.lock().get(key).cloned()
    }
}
