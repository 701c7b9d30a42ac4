//! Transaction Manager core (spec §4.2): assigns xids, tracks enlisted
//! participants, and drives 2PC with idempotent outcomes.

pub mod client;
pub mod driver;
pub mod server;
pub mod state;

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use rand::RngCore;
use tokio::sync::watch;

use crate::config::TmConfig;
use crate::error::TmError;
use crate::tm::client::ParticipantClient;
use crate::tm::driver::{drive_prepare, drive_terminal, PrepareDecision};
use crate::tm::state::{TxnRecord, TxnState};

/// Result of a `commit` call as seen by the caller (§4.2 step 4, §6.1):
/// distinct from `TxnState` because `IN_DOUBT` is never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every participant prepared and the broadcast completed within
    /// `T_commit`.
    Committed,
    /// A participant rejected prepare, or was unreachable during prepare.
    Aborted,
    /// The commit driver exceeded `T_commit`; the decision will still be
    /// reached, just not observably within this call (§4.2 step 4).
    InDoubt,
}

impl CommitOutcome {
    /// Stable wire string (§6.1).
    pub fn as_wire_str(self) -> &'static str {
        match self {
            CommitOutcome::Committed => "COMMITTED",
            CommitOutcome::Aborted => "ABORTED",
            CommitOutcome::InDoubt => "IN_DOUBT",
        }
    }
}

enum BeginCommit {
    AlreadyTerminal(CommitOutcome),
    /// 2PC is already being driven for this xid, by this call or an earlier
    /// one; carries a receiver that resolves once the driver finishes.
    InProgress(watch::Receiver<Option<CommitOutcome>>),
}

fn outcome_of(state: TxnState) -> CommitOutcome {
    match state {
        TxnState::Committed => CommitOutcome::Committed,
        TxnState::Aborted => CommitOutcome::Aborted,
        TxnState::Active | TxnState::Preparing => {
            unreachable!("only terminal states are kept in the terminal cache")
        }
    }
}

/// In-flight transactions plus a bounded LRU of recently-terminal outcomes
/// (§9 DESIGN NOTES: retried `commit`/`abort` calls must still get a
/// defined answer without the active table growing without bound). Moving
/// a transaction out of `active` on its terminal transition keeps lookups
/// for the overwhelming common case — a transaction still running — O(1)
/// against a table that only ever holds genuinely open work.
struct TxnTable {
    active: HashMap<String, TxnRecord>,
    terminal: LruCache<String, TxnState>,
}

impl TxnTable {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { active: HashMap::new(), terminal: LruCache::new(capacity) }
    }
}

/// Moves `xid` from `active` into the terminal LRU, if it's still there.
/// Free function (rather than a `TransactionManager` method) so the
/// detached driver task spawned by `begin_commit` can call it without
/// holding a reference back to `TransactionManager` itself.
fn set_terminal(txns: &Mutex<TxnTable>, xid: &str, state: TxnState) {
    let mut txns = txns.lock();
    if txns.active.remove(xid).is_some() {
        txns.terminal.put(xid.to_string(), state);
    }
}

/// Runs `prepare` then `commit`/`abort` to completion against `clients` and
/// records the terminal outcome. Takes no `&TransactionManager` so it can
/// run as a `'static` detached task (see `begin_commit`).
async fn run_two_phase_commit(
    xid: &str,
    clients: Vec<ParticipantClient>,
    config: &TmConfig,
    txns: &Mutex<TxnTable>,
) -> CommitOutcome {
    match drive_prepare(xid, &clients, config).await {
        PrepareDecision::GoAbort(reason) => {
            tracing::warn!(xid, %reason, "2pc prepare phase failed, aborting");
            drive_terminal(xid, &clients, config, false).await;
            set_terminal(txns, xid, TxnState::Aborted);
            CommitOutcome::Aborted
        }
        PrepareDecision::GoCommit => {
            drive_terminal(xid, &clients, config, true).await;
            set_terminal(txns, xid, TxnState::Committed);
            CommitOutcome::Committed
        }
    }
}

/// Global 2PC coordinator. `txns` is the only shared mutable state (§5: "a
/// single mutex over `txns` is sufficient"); it's behind an `Arc` so the
/// detached driver task spawned by `commit` can outlive the call that
/// started it.
pub struct TransactionManager {
    config: TmConfig,
    txns: Arc<Mutex<TxnTable>>,
}

impl TransactionManager {
    /// A coordinator with no transactions yet.
    pub fn new(config: TmConfig) -> Self {
        let txns = Arc::new(Mutex::new(TxnTable::new(config.outcome_cache_size)));
        Self { config, txns }
    }

    /// §4.2 `start`: allocates a globally unique xid.
    pub fn start(&self) -> String {
        let xid = new_xid();
        self.txns.lock().active.insert(xid.clone(), TxnRecord::new());
        xid
    }

    /// §4.2 `enlist`: adds `endpoint` to the participant set. Fails if the
    /// transaction is not `ACTIVE` (already preparing, terminal, or unknown
    /// because its terminal outcome aged out of the cache).
    pub fn enlist(&self, xid: &str, endpoint: &str) -> Result<(), TmError> {
        let mut txns = self.txns.lock();
        if txns.terminal.contains(xid) {
            return Err(TmError::NotActive(xid.to_string()));
        }
        let record = txns.active.get_mut(xid).ok_or_else(|| TmError::NotFound(xid.to_string()))?;
        if record.state != TxnState::Active {
            return Err(TmError::NotActive(xid.to_string()));
        }
        record.participants.insert(endpoint.to_string());
        Ok(())
    }

    /// §4.2 `status`.
    pub fn status(&self, xid: &str) -> Result<TxnState, TmError> {
        let mut txns = self.txns.lock();
        if let Some(record) = txns.active.get(xid) {
            return Ok(record.state);
        }
        txns.terminal.get(xid).copied().ok_or_else(|| TmError::NotFound(xid.to_string()))
    }

    /// §4.2 `commit`: drives 2PC to completion, honoring `T_commit` as a
    /// client-facing deadline only (§4.2 step 4) — the driver itself runs
    /// as a detached task started by `begin_commit`, so a `T_commit`
    /// timeout here only gives up on *waiting* for it. `tokio::time::timeout`
    /// around an inline future would instead drop that future on timeout,
    /// which would tear down the `JoinSet`s inside `drive_prepare`/
    /// `drive_terminal` and abort every in-flight participant call,
    /// stranding the transaction in `PREPARING` forever. Idempotent: a
    /// transaction already in a terminal state returns that state without
    /// redriving 2PC; a transaction already being driven subscribes to the
    /// same driver instead of starting a second one.
    pub async fn commit(&self, xid: &str) -> Result<CommitOutcome, TmError> {
        let mut rx = match self.begin_commit(xid)? {
            BeginCommit::AlreadyTerminal(outcome) => return Ok(outcome),
            BeginCommit::InProgress(rx) => rx,
        };

        let deadline = std::time::Duration::from_millis(self.config.t_commit_ms);
        let wait_for_outcome = async {
            loop {
                if let Some(outcome) = *rx.borrow() {
                    return outcome;
                }
                if rx.changed().await.is_err() {
                    // Sender dropped without ever sending: the driver task
                    // itself panicked. Treat like any other unresolved
                    // outcome; `status` still reflects the truth once a
                    // future retry or operator abort resolves it.
                    return CommitOutcome::InDoubt;
                }
            }
        };
        match tokio::time::timeout(deadline, wait_for_outcome).await {
            Ok(outcome) => Ok(outcome),
            Err(_elapsed) => Ok(CommitOutcome::InDoubt),
        }
    }

    /// Transitions `ACTIVE -> PREPARING` and spawns the detached 2PC driver
    /// on the first call for this xid; a call arriving while the driver is
    /// already running just clones its receiver. Short-circuits with the
    /// already-terminal outcome for an idempotent repeat commit.
    fn begin_commit(&self, xid: &str) -> Result<BeginCommit, TmError> {
        let mut txns = self.txns.lock();
        if let Some(state) = txns.terminal.get(xid) {
            return Ok(BeginCommit::AlreadyTerminal(outcome_of(*state)));
        }
        let record = txns.active.get_mut(xid).ok_or_else(|| TmError::NotFound(xid.to_string()))?;
        match record.state {
            TxnState::Committed | TxnState::Aborted => {
                unreachable!("terminal transactions are moved into the terminal cache")
            }
            TxnState::Preparing => {
                let rx = record
                    .commit_rx
                    .clone()
                    .expect("a PREPARING record always has a driver already spawned");
                Ok(BeginCommit::InProgress(rx))
            }
            TxnState::Active => {
                let participants: Vec<String> = record.participants.iter().cloned().collect();
                let (tx, rx) = watch::channel(None);
                record.state = TxnState::Preparing;
                record.commit_rx = Some(rx.clone());

                let clients: Vec<ParticipantClient> =
                    participants.into_iter().map(ParticipantClient::new).collect();
                let config = self.config.clone();
                let txns = Arc::clone(&self.txns);
                let xid = xid.to_string();
                tokio::spawn(async move {
                    let outcome = run_two_phase_commit(&xid, clients, &config, &txns).await;
                    let _ = tx.send(Some(outcome));
                });
                Ok(BeginCommit::InProgress(rx))
            }
        }
    }

    /// §4.2 `abort`: idempotent; broadcasts `abort` to enlisted participants
    /// with bounded retries.
    ///
    /// Removes the record from `active` and records the terminal outcome in
    /// one locked step, so a concurrent `commit`/`status` call never
    /// observes an active record already carrying a terminal `TxnState`
    /// (that invariant is what lets `begin_commit` treat `Committed`/
    /// `Aborted` in `active` as unreachable).
    pub async fn abort(&self, xid: &str) -> Result<(), TmError> {
        let participants = {
            let mut txns = self.txns.lock();
            if txns.terminal.contains(xid) {
                return Ok(());
            }
            let record = txns.active.remove(xid).ok_or_else(|| TmError::NotFound(xid.to_string()))?;
            txns.terminal.put(xid.to_string(), TxnState::Aborted);
            record.participants.into_iter().collect::<Vec<_>>()
        };
        let clients: Vec<ParticipantClient> = participants.into_iter().map(ParticipantClient::new).collect();
        drive_terminal(xid, &clients, &self.config, false).await;
        Ok(())
    }
}

fn new_xid() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
