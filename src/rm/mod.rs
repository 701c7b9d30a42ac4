//! Resource Manager core (spec §4.1): per-table storage engine offering
//! CRUD under snapshot-like transactional isolation, built from a paged
//! key -> record store, a row lock manager, per-transaction shadow records,
//! and hybrid pessimistic-locking + OCC validation.

pub mod committed_pool;
pub mod lock_manager;
pub mod page;
pub mod page_index;
pub mod page_io;
pub mod prepare_journal;
pub mod record;
pub mod server;
pub mod shadow_pool;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::RmError;
use crate::rm::committed_pool::CommittedPagePool;
use crate::rm::lock_manager::RowLockManager;
use crate::rm::page_index::KeySpec;
use crate::rm::page_io::{MemoryPageIO, PageIO, SqlitePageIO};
use crate::rm::prepare_journal::{JournalEntry, PrepareJournal};
use crate::rm::record::{Fields, ShadowWrite};
use crate::rm::shadow_pool::{Phase, ShadowRecordPool, TxState};
use crate::tm_link::TmLinkClient;

/// How this RM reaches the TM to self-enlist on first write (§4.3).
struct TmLink {
    client: TmLinkClient,
    self_endpoint: String,
    timeout: Duration,
}

/// Ties the storage primitives together and exposes CRUD, `prepare`/
/// `commit`/`abort` and `recover` (spec §2 layer 2).
pub struct ResourceManager {
    key_spec: KeySpec,
    committed: CommittedPagePool,
    shadow: ShadowRecordPool,
    locks: RowLockManager,
    journal: PrepareJournal,
    tm_link: Option<TmLink>,
    enlisted: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
    shutdown_notify: Notify,
}

impl ResourceManager {
    /// Builds an RM over `io` with the given key routing strategy, page
    /// cache capacity and durable journal path.
    pub fn new(
        key_spec: KeySpec,
        io: Arc<dyn PageIO>,
        page_cache_capacity: usize,
        journal_path: PathBuf,
    ) -> Result<Self, RmError> {
        let journal = PrepareJournal::open(journal_path)?;
        let rm = Self {
            key_spec,
            committed: CommittedPagePool::new(io, page_cache_capacity),
            shadow: ShadowRecordPool::new(),
            locks: RowLockManager::new(),
            journal,
            tm_link: None,
            enlisted: Mutex::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        };
        rm.recover()?;
        Ok(rm)
    }

    /// Wires this RM to self-enlist with the TM at `tm_base_url`, announcing
    /// itself at `self_endpoint` (§4.3: "each RM, on first mutation under
    /// xid, enlists itself with TM").
    pub fn with_tm_link(mut self, tm_base_url: &str, self_endpoint: impl Into<String>, timeout: Duration) -> Self {
        self.tm_link = Some(TmLink {
            client: TmLinkClient::new(tm_base_url),
            self_endpoint: self_endpoint.into(),
            timeout,
        });
        self
    }

    async fn ensure_enlisted(&self, xid: &str) {
        let Some(link) = &self.tm_link else { return };
        let already = {
            let mut enlisted = self.enlisted.lock();
            let already = enlisted.contains(xid);
            enlisted.insert(xid.to_string());
            already
        };
        if !already {
            link.client.enlist(xid, &link.self_endpoint, link.timeout).await;
        }
    }

    /// Convenience constructor wired to the in-memory `PageIO`, for tests.
    pub fn in_memory(key_spec: KeySpec, journal_path: PathBuf) -> Result<Self, RmError> {
        Self::new(key_spec, Arc::new(MemoryPageIO::new()), 256, journal_path)
    }

    /// Convenience constructor wired to the sqlite-backed `PageIO`.
    pub fn durable(
        key_spec: KeySpec,
        db_path: PathBuf,
        page_cache_capacity: usize,
        journal_path: PathBuf,
    ) -> Result<Self, RmError> {
        let io = Arc::new(SqlitePageIO::open(&db_path)?);
        Self::new(key_spec, io, page_cache_capacity, journal_path)
    }

    fn ensure_available(&self) -> Result<(), RmError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RmError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// §6.2 `POST /die`: marks this RM unavailable for failure-injection
    /// tests; every subsequent CRUD/txn call fails until the process
    /// restarts. Mirrors `WorkflowController::die`.
    pub fn die(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    /// `false` once `die` has been called.
    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// §6.2 `POST /shutdown`: wakes the server's graceful-shutdown future.
    pub fn request_shutdown(&self) {
        self.shutdown_notify.notify_waiters();
    }

    /// Awaited by `rm::server::serve`'s graceful-shutdown future.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown_notify.notified().await;
    }

    fn page_id(&self, key: &str) -> String {
        self.key_spec.page_id(key)
    }

    fn committed_record(&self, key: &str) -> Result<record::Record, RmError> {
        self.committed.read(&self.page_id(key), key)
    }

    /// Effective fields for `key` as seen by no transaction (§4.1.3: "A read
    /// without xid always sees committed").
    pub fn read_committed(&self, key: &str) -> Result<Fields, RmError> {
        self.ensure_available()?;
        let committed = self.committed_record(key)?;
        if committed.exists() {
            Ok(committed.fields)
        } else {
            Err(RmError::KeyNotFound(key.to_string()))
        }
    }

    /// §4.1.1 `read`: shadow wins over committed; records `start_version` on
    /// first touch.
    pub fn read(&self, xid: &str, key: &str) -> Result<Fields, RmError> {
        self.ensure_available()?;
        let committed = self.committed_record(key)?;
        let effective = self.shadow.with_or_insert(xid, |state| {
            state.start_version.entry(key.to_string()).or_insert(committed.version);
            state.shadow.get(key).cloned()
        });
        match effective {
            Some(ShadowWrite::Upsert(fields)) => Ok(fields),
            Some(ShadowWrite::Delete) => Err(RmError::KeyNotFound(key.to_string())),
            None if committed.exists() => Ok(committed.fields),
            None => Err(RmError::KeyNotFound(key.to_string())),
        }
    }

    /// §4.1.1 `add`: fails `KEY_EXISTS` if the effective record is present.
    /// Enlists with the TM on first write under `xid` (§4.3).
    pub async fn add(&self, xid: &str, key: &str, fields: Fields) -> Result<(), RmError> {
        self.ensure_available()?;
        self.ensure_enlisted(xid).await;
        let committed = self.committed_record(key)?;
        self.shadow.with_or_insert(xid, |state| {
            let effective_exists = match state.shadow.get(key) {
                Some(ShadowWrite::Upsert(_)) => true,
                Some(ShadowWrite::Delete) => false,
                None => committed.exists(),
            };
            if effective_exists {
                return Err(RmError::KeyExists(key.to_string()));
            }
            state.start_version.entry(key.to_string()).or_insert(committed.version);
            state.insert_keys.insert(key.to_string());
            state.shadow.insert(key.to_string(), ShadowWrite::Upsert(fields));
            Ok(())
        })
    }

    /// §4.1.1 `update`: fails `KEY_NOT_FOUND` if the effective record is
    /// absent; else writes shadow with merged fields, preserving the
    /// originally observed `start_version`.
    pub async fn update(&self, xid: &str, key: &str, patch: Fields) -> Result<(), RmError> {
        self.ensure_available()?;
        self.ensure_enlisted(xid).await;
        let committed = self.committed_record(key)?;
        self.shadow.with_or_insert(xid, |state| {
            let current = match state.shadow.get(key) {
                Some(ShadowWrite::Upsert(fields)) => Some(fields.clone()),
                Some(ShadowWrite::Delete) => None,
                None if committed.exists() => Some(committed.fields.clone()),
                None => None,
            };
            let mut fields = current.ok_or_else(|| RmError::KeyNotFound(key.to_string()))?;
            for (k, v) in patch {
                fields.insert(k, v);
            }
            state.start_version.entry(key.to_string()).or_insert(committed.version);
            state.shadow.insert(key.to_string(), ShadowWrite::Upsert(fields));
            Ok(())
        })
    }

    /// §4.1.1 `delete`: fails `KEY_NOT_FOUND` if absent; else writes a shadow
    /// tombstone.
    pub async fn delete(&self, xid: &str, key: &str) -> Result<(), RmError> {
        self.ensure_available()?;
        self.ensure_enlisted(xid).await;
        let committed = self.committed_record(key)?;
        self.shadow.with_or_insert(xid, |state| {
            let exists = match state.shadow.get(key) {
                Some(ShadowWrite::Upsert(_)) => true,
                Some(ShadowWrite::Delete) => false,
                None => committed.exists(),
            };
            if !exists {
                return Err(RmError::KeyNotFound(key.to_string()));
            }
            state.start_version.entry(key.to_string()).or_insert(committed.version);
            state.shadow.insert(key.to_string(), ShadowWrite::Delete);
            Ok(())
        })
    }

    /// §4.1.2 prepare algorithm.
    pub fn prepare(&self, xid: &str) -> Result<(), RmError> {
        self.ensure_available()?;
        let snapshot = self.shadow.with(xid, |s| s.clone());
        let state = match snapshot {
            Some(s) => s,
            // Empty shadow set (xid never touched this RM): no-op, ok,
            // holds no locks (§8 boundary behavior).
            None => return Ok(()),
        };
        let keys = state.sorted_shadow_keys();
        if keys.is_empty() {
            self.shadow.with(xid, |s| s.phase = Phase::Prepared);
            return Ok(());
        }

        // Step 1: acquire locks in sorted key order (deadlock-free, §4.1.2,
        // §5).
        let mut acquired: Vec<String> = Vec::new();
        for key in &keys {
            if self.locks.try_lock(xid, key) {
                acquired.push(key.clone());
            } else {
                for held in &acquired {
                    self.locks.release(xid, held);
                }
                return Err(RmError::LockConflict(key.clone()));
            }
        }

        // Step 2: page in and validate each key.
        if let Err(err) = self.validate(xid, &state, &keys) {
            for held in &acquired {
                self.locks.release(xid, held);
            }
            return Err(err);
        }

        // Step 3: durable prepare snapshot, then flip phase.
        let entry = JournalEntry {
            xid: xid.to_string(),
            shadow: state.shadow.clone(),
            start_version: state.start_version.clone(),
            held_keys: acquired.clone(),
        };
        if let Err(err) = self.journal.record(entry) {
            for held in &acquired {
                self.locks.release(xid, held);
            }
            return Err(err);
        }

        self.shadow.with(xid, |s| {
            s.held_locks = acquired.into_iter().collect();
            s.phase = Phase::Prepared;
        });
        Ok(())
    }

    fn validate(&self, _xid: &str, state: &TxState, keys: &[String]) -> Result<(), RmError> {
        for key in keys {
            let page_id = self.page_id(key);
            self.committed.ensure_loaded(&page_id)?;
            let committed = self.committed_record(key)?;
            let is_insert = state.insert_keys.contains(key);
            if is_insert {
                if committed.exists() {
                    return Err(RmError::KeyExists(key.clone()));
                }
            } else if !committed.exists() {
                return Err(RmError::KeyNotFound(key.clone()));
            }
            let start_version = *state
                .start_version
                .get(key)
                .ok_or_else(|| RmError::InternalInvariant(format!("missing start_version for {key}")))?;
            if committed.version != start_version {
                return Err(RmError::VersionConflict(key.clone()));
            }
        }
        Ok(())
    }

    /// §4.1.1 `commit`: requires `phase=PREPARED`; merges shadow into the
    /// committed pool, releases locks, clears shadow and journal. Idempotent:
    /// a retried call after the xid has already been cleared is a no-op.
    pub fn commit(&self, xid: &str) -> Result<(), RmError> {
        self.ensure_available()?;
        let state = match self.shadow.with(xid, |s| s.clone()) {
            Some(s) => s,
            None => return Ok(()),
        };
        if state.phase != Phase::Prepared {
            return Err(RmError::InternalInvariant(format!(
                "commit called on {xid} which is not PREPARED"
            )));
        }
        for key in state.sorted_shadow_keys() {
            let base_version = *state
                .start_version
                .get(&key)
                .expect("start_version recorded for every shadow key");
            let write = state.shadow.get(&key).expect("key from sorted_shadow_keys").clone();
            let record = write.into_committed(base_version);
            let page_id = self.page_id(&key);
            self.committed.write_through(&page_id, &key, record)?;
        }
        self.shadow.take(xid);
        self.locks.release_all(xid);
        self.journal.clear(xid)?;
        Ok(())
    }

    /// §4.1.1 `abort`: legal from any phase; idempotent.
    pub fn abort(&self, xid: &str) -> Result<(), RmError> {
        self.shadow.take(xid);
        self.locks.release_all(xid);
        self.journal.clear(xid)?;
        Ok(())
    }

    /// §4.1.4 recovery: replay every journaled entry, re-acquire its locks
    /// and restore `phase=PREPARED` so the TM can still drive a commit or
    /// abort decision after restart.
    pub fn recover(&self) -> Result<(), RmError> {
        for entry in self.journal.all() {
            for key in &entry.held_keys {
                // Cannot conflict: no other xid could have been running
                // concurrently with a crashed process (§4.1.4).
                self.locks.try_lock(&entry.xid, key);
            }
            let state = TxState {
                shadow: entry.shadow,
                start_version: entry.start_version,
                held_locks: entry.held_keys.into_iter().collect(),
                phase: Phase::Prepared,
                insert_keys: Default::default(),
            };
            self.shadow.restore(&entry.xid, state);
        }
        Ok(())
    }

    /// `true` if `xid` currently holds the lock on `key` — used by tests and
    /// by `/health`-adjacent diagnostics.
    pub fn lock_owner(&self, key: &str) -> Option<String> {
        self.locks.owner_of(key)
    }
}
