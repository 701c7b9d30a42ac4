//! The record data model (spec §3.1).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A field value: short strings or integers (§3.1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A signed integer field (quantities, prices, counters).
    Int(i64),
    /// A short string field (names, types, keys embedded as fields).
    Str(String),
}

impl FieldValue {
    /// Returns the integer value, if this field holds one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Str(_) => None,
        }
    }
}

/// Ordered field map. `BTreeMap` keeps field iteration deterministic, which
/// matters for the composite-key encoding in [`crate::rm::page_index`] and
/// for stable JSON output.
pub type Fields = BTreeMap<String, FieldValue>;

/// An immutable snapshot of one key's state (§3.1).
///
/// Invariant: `version` of the committed visible snapshot for a key never
/// decreases; `deleted=true` with `version=v` means the key does not exist
/// in the committed view but occupies `v`; a fresh key is modeled as
/// `version=0, deleted=true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Field map. Empty (but present) for a tombstone.
    pub fields: Fields,
    /// Monotonically increasing version, incremented on every commit that
    /// modifies this key.
    pub version: u64,
    /// Tombstone flag; `true` means the key is absent in the committed view.
    pub deleted: bool,
}

impl Record {
    /// The canonical "never existed" record for a key with no commit history.
    pub fn fresh() -> Self {
        Self { fields: Fields::new(), version: 0, deleted: true }
    }

    /// A live record holding `fields` at `version`.
    pub fn live(fields: Fields, version: u64) -> Self {
        Self { fields, version, deleted: false }
    }

    /// A tombstone at `version` (the version the deleting commit produced).
    pub fn tombstone(version: u64) -> Self {
        Self { fields: Fields::new(), version, deleted: true }
    }

    /// Whether this record is visible to a caller (i.e. not a tombstone).
    pub fn exists(&self) -> bool {
        !self.deleted
    }
}

/// A pending write recorded in a transaction's shadow pool (§3.4, §3.5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ShadowWrite {
    /// `add`/`update`: the full post-image fields to commit.
    Upsert(Fields),
    /// `delete`: a tombstone write.
    Delete,
}

impl ShadowWrite {
    /// Applies this shadow write on top of `base_version`, producing the
    /// record that `commit` will install (§4.1.1 commit semantics).
    pub fn into_committed(self, base_version: u64) -> Record {
        match self {
            ShadowWrite::Upsert(fields) => Record::live(fields, base_version + 1),
            ShadowWrite::Delete => Record::tombstone(base_version + 1),
        }
    }
}
