//! Per-transaction state living inside one RM (spec §3.4): shadow writes,
//! observed start versions, held locks and commit phase.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::rm::record::ShadowWrite;

/// Lifecycle phase of one transaction's state inside this RM (§3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Writes are being accumulated in `shadow`; no locks held yet.
    Active,
    /// `prepare` succeeded: locks held on every shadow key, journal durable.
    Prepared,
    /// `commit` or `abort` has run to completion; state is about to be (or
    /// has been) dropped from the pool.
    Done,
}

/// One transaction's uncommitted state within a single RM.
#[derive(Debug, Clone, Default)]
pub struct TxState {
    /// Key -> pending write (full post-image or tombstone).
    pub shadow: HashMap<String, ShadowWrite>,
    /// The committed version observed the first time this xid touched each
    /// key; used for the OCC check in `prepare` (§4.1.2 step 2).
    pub start_version: HashMap<String, u64>,
    /// Keys this xid currently holds the write lock on.
    pub held_locks: HashSet<String>,
    /// Current phase; defaults to `Active`.
    pub phase: Phase,
    /// Keys whose shadow write originated from `add` (insert intent), as
    /// opposed to `update`/`delete` against a pre-existing committed
    /// record. Only meaningful during the same process's `prepare` call
    /// that validates them (§4.1.2 step 2); not persisted across a crash
    /// since recovery never re-validates a journaled entry.
    pub insert_keys: HashSet<String>,
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Active
    }
}

impl TxState {
    /// A fresh, empty transaction state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys touched by pending writes, in sorted order — the `K` of §4.1.2.
    pub fn sorted_shadow_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shadow.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Shared table of per-xid transaction state, independently lock-protected
/// per §5 ("the committed pool, shadow pool, row lock manager, and prepare
/// journal are shared and must be independently lock-protected").
#[derive(Default)]
pub struct ShadowRecordPool {
    txns: Mutex<HashMap<String, TxState>>,
}

impl ShadowRecordPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` against the mutable state for `xid`, creating a fresh
    /// `Active` entry on first touch.
    pub fn with_or_insert<R>(&self, xid: &str, f: impl FnOnce(&mut TxState) -> R) -> R {
        let mut txns = self.txns.lock();
        let state = txns.entry(xid.to_string()).or_insert_with(TxState::new);
        f(state)
    }

    /// Runs `f` against the state for `xid`, if any exists.
    pub fn with<R>(&self, xid: &str, f: impl FnOnce(&mut TxState) -> R) -> Option<R> {
        let mut txns = self.txns.lock();
        txns.get_mut(xid).map(f)
    }

    /// Removes and returns `xid`'s state, e.g. on `commit`/`abort` (§4.1.1).
    pub fn take(&self, xid: &str) -> Option<TxState> {
        self.txns.lock().remove(xid)
    }

    /// Inserts a recovered `TxState` directly, used by RM recovery (§4.1.4).
    pub fn restore(&self, xid: &str, state: TxState) {
        self.txns.lock().insert(xid.to_string(), state);
    }

    /// `true` if `xid` has no recorded state (never touched, or already
    /// cleared by commit/abort).
    pub fn is_empty_for(&self, xid: &str) -> bool {
        !self.txns.lock().contains_key(xid)
    }
}
