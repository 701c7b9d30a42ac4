//! Pages: the unit of backend I/O (spec §3.2).

use std::collections::BTreeMap;

use crate::rm::record::Record;

/// An ordered collection of committed records sharing a page id.
///
/// Invariant (§3.2): the set of keys found in the page equals the set
/// returned by the backend query for that `page_id`, modulo the current
/// transaction's shadow records.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Key -> committed record, ordered by key.
    pub records: BTreeMap<String, Record>,
}

impl Page {
    /// An empty page (no committed records under this page id yet).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Looks up a key's committed record within this page.
    pub fn get(&self, key: &str) -> Option<&Record> {
        self.records.get(key)
    }

    /// Inserts or replaces a key's committed record.
    pub fn put(&mut self, key: String, record: Record) {
        self.records.insert(key, record);
    }
}
