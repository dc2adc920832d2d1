// SPDX-License-Identifier: MIT OR Apache-2.0
//! Storage capability behind semantic memory.
//!
//! Two implementations exist on purpose: [`LiveStore`] owns the durable
//! SQLite table and the write-journal file handle; [`SandboxStore`] is an
//! in-memory map with read-your-writes over an immutable snapshot and has no
//! access to durable state at all. Replay runs entirely against the latter,
//! which is what makes its read-only guarantee structural rather than
//! procedural.

use mace_canon::{CanonError, canonical_serialize};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Errors from the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The SQLite backend failed.
    #[error("sqlite failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The journal file could not be written or read.
    #[error("journal io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// The capability semantic memory is abstracted over.
pub trait Store {
    /// Fetch `(blob, last_updated)` for a key, `None` on miss.
    fn get(&self, key: &str) -> Result<Option<(String, Option<String>)>, StoreError>;

    /// Upsert a key. Last write wins unconditionally.
    fn put(&mut self, key: &str, blob: &str, timestamp: &str) -> Result<(), StoreError>;

    /// Whether this store is a replay sandbox.
    fn is_sandbox(&self) -> bool;

    /// The write journal, for stores that have one.
    ///
    /// Only the live store returns `Some`; a sandbox physically has no
    /// journal handle, so replay cannot append to it even by mistake.
    fn journal(&self) -> Option<&WriteJournal> {
        None
    }
}

/// One line of the append-only write journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Deterministic identifier of the write.
    pub write_id: String,
    /// Key that was written.
    pub canonical_key: String,
    /// Hex SHA-256 of the canonical value blob.
    pub value_hash: String,
    /// Who performed the write.
    pub source: String,
    /// Timestamp stored alongside the value (RFC-3339 UTC).
    pub last_updated: String,
    /// Seed active at write time.
    pub seed: Option<String>,
    /// Value of the `sem_write` counter for this write.
    pub write_counter: u64,
    /// Operation tag; always `"PUT"`.
    pub op: String,
    /// The written value itself.
    pub value_snapshot: serde_json::Value,
}

/// Append-only NDJSON journal of live writes.
#[derive(Debug, Clone)]
pub struct WriteJournal {
    path: PathBuf,
}

impl WriteJournal {
    /// Journal entries accumulate at `path`, one JSON object per line.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Propagates filesystem errors; serialization of a journal entry
    /// itself cannot fail.
    pub fn append(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        writeln!(file, "{line}")?;
        tracing::debug!(key = %entry.canonical_key, counter = entry.write_counter, "journal append");
        Ok(())
    }

    /// Read every entry back, in append order.
    ///
    /// # Errors
    ///
    /// Filesystem errors, or a line that is not a valid journal entry.
    pub fn entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        let body = match std::fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(|e| std::io::Error::other(e).into()))
            .collect()
    }

    /// The journal file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Durable store: one SQLite row per key, plus the write journal.
#[derive(Debug)]
pub struct LiveStore {
    conn: Connection,
    journal: WriteJournal,
}

impl LiveStore {
    /// Open (creating if needed) the `sem_kv` table at `db_path` with the
    /// journal at `journal_path`.
    ///
    /// # Errors
    ///
    /// Propagates SQLite open/DDL failures.
    pub fn open(db_path: &Path, journal_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        // journal_mode answers with the resulting mode, so it needs a query.
        let _mode: String = conn.query_row("PRAGMA journal_mode=DELETE", [], |row| row.get(0))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sem_kv (
                 canonical_key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 last_updated TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn,
            journal: WriteJournal::new(journal_path),
        })
    }
}

impl Store for LiveStore {
    fn get(&self, key: &str) -> Result<Option<(String, Option<String>)>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT value, last_updated FROM sem_kv WHERE canonical_key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    fn put(&mut self, key: &str, blob: &str, timestamp: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sem_kv (canonical_key, value, last_updated)
             VALUES (?1, ?2, ?3)",
            params![key, blob, timestamp],
        )?;
        Ok(())
    }

    fn is_sandbox(&self) -> bool {
        false
    }

    fn journal(&self) -> Option<&WriteJournal> {
        Some(&self.journal)
    }
}

/// Replay store: an immutable snapshot with read-your-writes on top.
///
/// Writes stay in memory and die with the store; nothing here can reach the
/// live table or the journal.
#[derive(Debug, Default)]
pub struct SandboxStore {
    snapshot: BTreeMap<String, String>,
    writes: BTreeMap<String, (String, String)>,
}

impl SandboxStore {
    /// Build a sandbox over structured snapshot values.
    ///
    /// Values are canonical-serialized up front so that sandbox reads hand
    /// back exactly the bytes a live read would have.
    ///
    /// # Errors
    ///
    /// Propagates [`CanonError`]; unreachable for plain JSON values.
    pub fn from_snapshot(
        snapshot: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, CanonError> {
        let mut blobs = BTreeMap::new();
        for (key, value) in snapshot {
            blobs.insert(key, canonical_serialize(&value)?);
        }
        Ok(Self {
            snapshot: blobs,
            writes: BTreeMap::new(),
        })
    }
}

impl Store for SandboxStore {
    fn get(&self, key: &str) -> Result<Option<(String, Option<String>)>, StoreError> {
        if let Some((blob, ts)) = self.writes.get(key) {
            return Ok(Some((blob.clone(), Some(ts.clone()))));
        }
        Ok(self.snapshot.get(key).map(|blob| (blob.clone(), None)))
    }

    fn put(&mut self, key: &str, blob: &str, timestamp: &str) -> Result<(), StoreError> {
        self.writes
            .insert(key.to_string(), (blob.to_string(), timestamp.to_string()));
        Ok(())
    }

    fn is_sandbox(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn live(tmp: &TempDir) -> LiveStore {
        LiveStore::open(&tmp.path().join("sem.db"), &tmp.path().join("journal.ndjson")).unwrap()
    }

    #[test]
    fn live_store_roundtrip_and_overwrite() {
        let tmp = TempDir::new().unwrap();
        let mut store = live(&tmp);
        assert!(store.get("a/b/c/d").unwrap().is_none());

        store.put("a/b/c/d", "\"one\"", "2025-01-01T00:00:00Z").unwrap();
        store.put("a/b/c/d", "\"two\"", "2025-01-01T00:00:01Z").unwrap();
        let (blob, ts) = store.get("a/b/c/d").unwrap().unwrap();
        assert_eq!(blob, "\"two\"");
        assert_eq!(ts.as_deref(), Some("2025-01-01T00:00:01Z"));
    }

    #[test]
    fn live_store_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = live(&tmp);
            store.put("a/b/c/d", "1", "t").unwrap();
        }
        let store = live(&tmp);
        assert!(store.get("a/b/c/d").unwrap().is_some());
    }

    #[test]
    fn live_store_exposes_journal() {
        let tmp = TempDir::new().unwrap();
        let store = live(&tmp);
        assert!(!store.is_sandbox());
        assert!(store.journal().is_some());
    }

    #[test]
    fn journal_appends_in_order() {
        let tmp = TempDir::new().unwrap();
        let journal = WriteJournal::new(tmp.path().join("j.ndjson"));
        assert!(journal.entries().unwrap().is_empty());
        for counter in 1..=3u64 {
            journal
                .append(&JournalEntry {
                    write_id: format!("w{counter}"),
                    canonical_key: "a/b/c/d".into(),
                    value_hash: "h".into(),
                    source: "test".into(),
                    last_updated: "t".into(),
                    seed: Some("s".into()),
                    write_counter: counter,
                    op: "PUT".into(),
                    value_snapshot: json!(counter),
                })
                .unwrap();
        }
        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.windows(2).all(|w| w[0].write_counter < w[1].write_counter));
    }

    #[test]
    fn sandbox_reads_snapshot_then_own_writes() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("a/b/c/d".to_string(), json!("blue"));
        let mut store = SandboxStore::from_snapshot(snapshot).unwrap();
        assert!(store.is_sandbox());
        assert!(store.journal().is_none());

        let (blob, ts) = store.get("a/b/c/d").unwrap().unwrap();
        assert_eq!(blob, "\"blue\"");
        assert!(ts.is_none());

        store.put("a/b/c/d", "\"red\"", "t1").unwrap();
        let (blob, ts) = store.get("a/b/c/d").unwrap().unwrap();
        assert_eq!(blob, "\"red\"");
        assert_eq!(ts.as_deref(), Some("t1"));

        assert!(store.get("missing/key/x/y").unwrap().is_none());
    }
}
