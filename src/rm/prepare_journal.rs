//! Durable snapshot of prepared transaction state (spec §4.1.2 step 3,
//! §4.1.4, §6.4), written by atomic rename: write-to-temp + rename-over-
//! target, exactly as the teacher crate's WAL segment rollover avoids
//! ever exposing a partially-written file to a concurrent reader.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::RmError;
use crate::rm::record::ShadowWrite;

/// One prepared transaction's durable record (§6.4 wire format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Transaction id this entry belongs to.
    pub xid: String,
    /// Shadow writes as of `prepare` time.
    pub shadow: HashMap<String, ShadowWrite>,
    /// Observed `start_version` per key, for OCC re-validation after a
    /// restart (recovery itself does not re-run OCC — see §4.1.4 — but the
    /// TM-driven commit still needs these to compute the post-commit
    /// version).
    pub start_version: HashMap<String, u64>,
    /// Keys this xid held the write lock on at prepare time.
    pub held_keys: Vec<String>,
}

/// File-backed journal: the whole file is the current set of prepared
/// entries, replayed in full at RM start-up (§6.4).
pub struct PrepareJournal {
    path: PathBuf,
    entries: Mutex<HashMap<String, JournalEntry>>,
}

impl PrepareJournal {
    /// Opens (or creates empty) the journal file at `path`, replaying any
    /// existing entries into memory.
    pub fn open(path: PathBuf) -> Result<Self, RmError> {
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| RmError::Storage(format!("read journal: {e}")))?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                let list: Vec<JournalEntry> = serde_json::from_str(&raw)
                    .map_err(|e| RmError::Storage(format!("decode journal: {e}")))?;
                list.into_iter().map(|e| (e.xid.clone(), e)).collect()
            }
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries: Mutex::new(entries) })
    }

    /// Returns every currently-journaled entry, for recovery replay (§4.1.4).
    pub fn all(&self) -> Vec<JournalEntry> {
        self.entries.lock().values().cloned().collect()
    }

    /// Durably records `entry`, replacing any prior entry for the same xid.
    /// Only after this returns `Ok` may the caller transition `phase :=
    /// PREPARED` (§4.1.2 step 3).
    pub fn record(&self, entry: JournalEntry) -> Result<(), RmError> {
        let mut entries = self.entries.lock();
        entries.insert(entry.xid.clone(), entry);
        self.flush(&entries)
    }

    /// Clears `xid`'s journal entry, e.g. on commit/abort completion.
    /// Idempotent: clearing an xid with no entry is a no-op (§4.1.4: "clearing
    /// the journal at recovery is a no-op").
    pub fn clear(&self, xid: &str) -> Result<(), RmError> {
        let mut entries = self.entries.lock();
        if entries.remove(xid).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn flush(&self, entries: &HashMap<String, JournalEntry>) -> Result<(), RmError> {
        let list: Vec<&JournalEntry> = entries.values().collect();
        let serialized = serde_json::to_vec_pretty(&list)
            .map_err(|e| RmError::Storage(format!("encode journal: {e}")))?;
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, &serialized)
            .map_err(|e| RmError::Storage(format!("write journal tmp: {e}")))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| RmError::Storage(format!("rename journal: {e}")))?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
