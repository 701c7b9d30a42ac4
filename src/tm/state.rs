//! Global transaction state kept by the Transaction Manager (spec §3.3).

use std::collections::BTreeSet;

use tokio::sync::watch;

use crate::tm::CommitOutcome;

/// Lifecycle state of one global transaction. `IN_DOUBT` is deliberately
/// absent here: per §3.3 it "is not a true persistent state" — it is only
/// ever a value returned from `commit` to a caller whose wait exceeded
/// `T_wc_commit`, while the TM's own record stays `PREPARING` underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Allocated by `start`, accepting `enlist` calls.
    Active,
    /// `commit` is driving 2PC; no further `enlist` is accepted.
    Preparing,
    /// All participants acknowledged (or are being retried for) commit.
    Committed,
    /// Either a participant rejected prepare, or the client called `abort`.
    Aborted,
}

impl TxnState {
    /// Stable wire string for this state (§6.1).
    pub fn as_wire_str(self) -> &'static str {
        match self {
            TxnState::Active => "ACTIVE",
            TxnState::Preparing => "PREPARING",
            TxnState::Committed => "COMMITTED",
            TxnState::Aborted => "ABORTED",
        }
    }

    /// `true` once a transaction can no longer change outcome.
    pub fn is_terminal(self) -> bool {
        matches!(self, TxnState::Committed | TxnState::Aborted)
    }
}

/// One transaction's TM-side bookkeeping (§3.3).
#[derive(Clone)]
pub struct TxnRecord {
    /// Current lifecycle state.
    pub state: TxnState,
    /// Enlisted participant base URLs, in first-enlisted order, deduplicated.
    pub participants: BTreeSet<String>,
    /// Set once `commit` spawns the detached 2PC driver for this
    /// transaction (state transitions to `Preparing`); a retried `commit`
    /// call while already `Preparing` subscribes to this instead of
    /// spawning a second driver.
    pub commit_rx: Option<watch::Receiver<Option<CommitOutcome>>>,
}

impl TxnRecord {
    /// A freshly started transaction with no participants.
    pub fn new() -> Self {
        Self { state: TxnState::Active, participants: BTreeSet::new(), commit_rx: None }
    }
}

impl Default for TxnRecord {
    fn default() -> Self {
        Self::new()
    }
}
