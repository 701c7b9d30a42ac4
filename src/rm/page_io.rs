//! The narrow page I/O contract (spec §4.1.5) and two implementations: an
//! in-memory store for tests, and a `rusqlite`-backed store standing in for
//! the spec's "external relational store that supports range-by-prefix
//! queries and atomic upserts over a primary key."

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::RmError;
use crate::rm::page::Page;
use crate::rm::record::{Fields, Record};

/// Backend persistence contract every `ResourceManager` is built against.
pub trait PageIO: Send + Sync {
    /// Returns all committed records whose routing property (page id)
    /// matches `page_id`.
    fn page_in(&self, page_id: &str) -> Result<Page, RmError>;

    /// Atomically upserts every record in `page` and deletes committed
    /// records that fall within `page_id`'s key domain but are absent from
    /// `page`.
    fn page_out(&self, page_id: &str, page: &Page) -> Result<(), RmError>;
}

/// Computes `[start, end)` for a prefix range query: `end` is `None` when the
/// prefix has no successor (e.g. all-`0xff` bytes), meaning "no upper bound".
fn prefix_range(prefix: &str) -> (String, Option<String>) {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(&last) = bytes.last() {
        if last == 0xff {
            bytes.pop();
        } else {
            let end_bytes = {
                let mut b = bytes.clone();
                *b.last_mut().unwrap() += 1;
                b
            };
            return (
                prefix.to_string(),
                Some(String::from_utf8_lossy(&end_bytes).into_owned()),
            );
        }
    }
    (prefix.to_string(), None)
}

/// In-memory `PageIO`, used by tests and the in-process integration suite.
/// Not durable across process restarts; `RmConfig::durable_storage = false`
/// selects this backend.
#[derive(Default)]
pub struct MemoryPageIO {
    committed: Mutex<BTreeMap<String, Record>>,
}

impl MemoryPageIO {
    /// An empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PageIO for MemoryPageIO {
    fn page_in(&self, page_id: &str) -> Result<Page, RmError> {
        let (start, end) = prefix_range(page_id);
        let committed = self.committed.lock().unwrap();
        let mut page = Page::empty();
        for (key, record) in committed.iter() {
            if key.as_str() < start.as_str() {
                continue;
            }
            if let Some(end) = &end {
                if key.as_str() >= end.as_str() {
                    continue;
                }
            }
            page.put(key.clone(), record.clone());
        }
        Ok(page)
    }

    fn page_out(&self, page_id: &str, page: &Page) -> Result<(), RmError> {
        let (start, end) = prefix_range(page_id);
        let mut committed = self.committed.lock().unwrap();
        let stale: Vec<String> = committed
            .range(start.clone()..)
            .take_while(|(k, _)| match &end {
                Some(e) => k.as_str() < e.as_str(),
                None => true,
            })
            .filter(|(k, _)| !page.records.contains_key(*k))
            .map(|(k, _)| k.clone())
            .collect();
        for key in stale {
            committed.remove(&key);
        }
        for (key, record) in &page.records {
            committed.insert(key.clone(), record.clone());
        }
        Ok(())
    }
}

/// `rusqlite`-backed `PageIO`. One table per RM process, opened against a
/// single-file database under `RmConfig::data_dir`.
pub struct SqlitePageIO {
    conn: Mutex<Connection>,
}

impl SqlitePageIO {
    /// Opens (creating if necessary) the committed-record table at `path`.
    pub fn open(path: &Path) -> Result<Self, RmError> {
        let conn = Connection::open(path)
            .map_err(|e| RmError::Storage(format!("open sqlite page store: {e}")))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                key TEXT PRIMARY KEY,
                fields_json TEXT NOT NULL,
                version INTEGER NOT NULL,
                deleted INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| RmError::Storage(format!("create table: {e}")))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

impl PageIO for SqlitePageIO {
    fn page_in(&self, page_id: &str) -> Result<Page, RmError> {
        let (start, end) = prefix_range(page_id);
        let conn = self.conn.lock().unwrap();
        let mut page = Page::empty();
        let mut run = |sql: &str, params: &[&dyn rusqlite::ToSql]| -> Result<(), RmError> {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| RmError::Storage(format!("prepare page_in: {e}")))?;
            let rows = stmt
                .query_map(params, |row| {
                    let key: String = row.get(0)?;
                    let fields_json: String = row.get(1)?;
                    let version: i64 = row.get(2)?;
                    let deleted: i64 = row.get(3)?;
                    Ok((key, fields_json, version, deleted))
                })
                .map_err(|e| RmError::Storage(format!("query page_in: {e}")))?;
            for row in rows {
                let (key, fields_json, version, deleted) =
                    row.map_err(|e| RmError::Storage(format!("row page_in: {e}")))?;
                let fields: Fields = serde_json::from_str(&fields_json)
                    .map_err(|e| RmError::Storage(format!("decode fields: {e}")))?;
                page.put(key, Record { fields, version: version as u64, deleted: deleted != 0 });
            }
            Ok(())
        };
        match end {
            Some(end) => run(
                "SELECT key, fields_json, version, deleted FROM records WHERE key >= ?1 AND key < ?2",
                params![start, end],
            )?,
            None => run(
                "SELECT key, fields_json, version, deleted FROM records WHERE key >= ?1",
                params![start],
            )?,
        }
        Ok(page)
    }

    fn page_out(&self, page_id: &str, page: &Page) -> Result<(), RmError> {
        let (start, end) = prefix_range(page_id);
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| RmError::Storage(format!("begin page_out tx: {e}")))?;
        {
            let existing_keys: Vec<String> = {
                let mut stmt = match &end {
                    Some(_) => tx
                        .prepare("SELECT key FROM records WHERE key >= ?1 AND key < ?2")
                        .map_err(|e| RmError::Storage(format!("prepare scan: {e}")))?,
                    None => tx
                        .prepare("SELECT key FROM records WHERE key >= ?1")
                        .map_err(|e| RmError::Storage(format!("prepare scan: {e}")))?,
                };
                let rows = match &end {
                    Some(end) => stmt.query_map(params![start, end], |r| r.get(0)),
                    None => stmt.query_map(params![start], |r| r.get(0)),
                }
                .map_err(|e| RmError::Storage(format!("scan existing: {e}")))?;
                rows.collect::<Result<_, _>>()
                    .map_err(|e| RmError::Storage(format!("collect existing: {e}")))?
            };
            for key in existing_keys {
                if !page.records.contains_key(&key) {
                    tx.execute("DELETE FROM records WHERE key = ?1", params![key])
                        .map_err(|e| RmError::Storage(format!("delete stale: {e}")))?;
                }
            }
            for (key, record) in &page.records {
                let fields_json = serde_json::to_string(&record.fields)
                    .map_err(|e| RmError::Storage(format!("encode fields: {e}")))?;
                tx.execute(
                    "INSERT INTO records (key, fields_json, version, deleted)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                        fields_json = excluded.fields_json,
                        version = excluded.version,
                        deleted = excluded.deleted",
                    params![key, fields_json, record.version as i64, record.deleted as i64],
                )
                .map_err(|e| RmError::Storage(format!("upsert: {e}")))?;
            }
        }
        tx.commit().map_err(|e| RmError::Storage(format!("commit page_out tx: {e}")))?;
        Ok(())
    }
}
