//! In-memory cache of committed pages (spec §2, §3.5), backed by an LRU of
//! non-pinned pages — grounded on the teacher crate's own `lru`-backed page
//! cache sizing convention (`Config::page_cache_size`).

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::error::RmError;
use crate::rm::page::Page;
use crate::rm::page_io::PageIO;
use crate::rm::record::Record;

/// Committed-record cache, keyed by page id. Pages and committed records are
/// owned by this cache (§3.5); the cache may evict non-pinned pages, which
/// here means any page not currently being read-through a commit.
pub struct CommittedPagePool {
    io: Arc<dyn PageIO>,
    cache: Mutex<LruCache<String, Page>>,
}

impl CommittedPagePool {
    /// Builds a pool in front of `io`, caching up to `capacity` pages.
    pub fn new(io: Arc<dyn PageIO>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { io, cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Loads the page owning `page_id` into the cache if absent, then
    /// returns the committed record for `key` (or `Record::fresh()` if the
    /// key has never been committed).
    pub fn read(&self, page_id: &str, key: &str) -> Result<Record, RmError> {
        let mut cache = self.cache.lock();
        if !cache.contains(page_id) {
            let page = self.io.page_in(page_id)?;
            cache.put(page_id.to_string(), page);
        }
        let page = cache.get(page_id).expect("just inserted");
        Ok(page.get(key).cloned().unwrap_or_else(Record::fresh))
    }

    /// Ensures `page_id` is cached, loading it through `PageIO` if absent.
    /// Used by `prepare`'s validation step (§4.1.2 step 2).
    pub fn ensure_loaded(&self, page_id: &str) -> Result<(), RmError> {
        let mut cache = self.cache.lock();
        if !cache.contains(page_id) {
            let page = self.io.page_in(page_id)?;
            cache.put(page_id.to_string(), page);
        }
        Ok(())
    }

    /// Applies `key -> record` into the cached page for `page_id` and writes
    /// the page straight through to the backend (§4.1.1 commit semantics:
    /// "writes the resulting pages through `PageIO.page_out`").
    pub fn write_through(&self, page_id: &str, key: &str, record: Record) -> Result<(), RmError> {
        let mut cache = self.cache.lock();
        if !cache.contains(page_id) {
            let page = self.io.page_in(page_id)?;
            cache.put(page_id.to_string(), page);
        }
        let page = cache.get_mut(page_id).expect("just inserted");
        page.put(key.to_string(), record);
        self.io.page_out(page_id, page)
    }
}
