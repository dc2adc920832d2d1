// SPDX-License-Identifier: MIT OR Apache-2.0
//! Semantic memory (SEM): the validated key-value store.
//!
//! Writes run a gate cascade — key grammar, governance policy, PII scan —
//! before anything touches storage, and every live write is journaled.
//! Reads and writes performed while a capture is installed are recorded so
//! the executor can embed them in the reflective log as evidence.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod store;

pub use store::{JournalEntry, LiveStore, SandboxStore, Store, StoreError, WriteJournal};

use mace_canon::{CanonError, canonical_serialize, sha256_hex};
use mace_determinism::{DeterminismContext, DeterminismError, scopes};
use mace_governance::{AllowAllPolicy, PolicyGate};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

/// Canonical key grammar: four `/`-separated segments, 64 code units max.
static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9_]+/[a-z0-9_]+/[a-z0-9_-]+/[a-z0-9_]+$").expect("key pattern compiles")
});

static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}[- ]?\d{4}[- ]?\d{4}[- ]?\d{4}\b").expect("card pattern compiles")
});

static SSN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn pattern compiles"));

/// Maximum canonical key length, in code units.
pub const MAX_KEY_LEN: usize = 64;

/// Errors from semantic-memory writes.
///
/// The [`code`](SemError::code) strings are stable and part of the contract.
#[derive(Debug, thiserror::Error)]
pub enum SemError {
    /// The key does not match the four-segment canonical grammar.
    #[error("INVALID_KEY_FORMAT: {key}")]
    InvalidKeyFormat {
        /// The rejected key.
        key: String,
    },

    /// Governance policy blocks writes to this key.
    #[error("POLICY_BLOCKED: writes to {key} are blocked")]
    PolicyBlocked {
        /// The blocked key.
        key: String,
    },

    /// The serialized payload matched a privacy pattern.
    #[error("PRIVACY_BLOCKED: payload matched a privacy pattern")]
    PrivacyBlocked,

    /// The durable backend (table or journal) refused the write.
    #[error("DB_WRITE_FAILED: {reason}")]
    DbWriteFailed {
        /// Backend detail.
        reason: String,
    },

    /// The deterministic context has no seed.
    #[error("NO_SEED: deterministic context has no seed")]
    NoSeed,
}

impl SemError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidKeyFormat { .. } => "INVALID_KEY_FORMAT",
            Self::PolicyBlocked { .. } => "POLICY_BLOCKED",
            Self::PrivacyBlocked => "PRIVACY_BLOCKED",
            Self::DbWriteFailed { .. } => "DB_WRITE_FAILED",
            Self::NoSeed => "NO_SEED",
        }
    }
}

impl From<DeterminismError> for SemError {
    fn from(_: DeterminismError) -> Self {
        Self::NoSeed
    }
}

impl From<CanonError> for SemError {
    fn from(e: CanonError) -> Self {
        Self::DbWriteFailed {
            reason: e.to_string(),
        }
    }
}

/// Successful write receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOk {
    /// Timestamp stored alongside the value.
    pub last_updated: String,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetResult {
    /// Whether the key exists.
    pub exists: bool,
    /// The stored value on a hit.
    pub value: Option<serde_json::Value>,
    /// Timestamp of the last write, when the backend tracks one.
    pub last_updated: Option<String>,
}

/// One observed read, as recorded in the capture buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedRead {
    /// The value observed; `None` on a miss.
    pub value: Option<serde_json::Value>,
    /// Whether the key existed.
    pub exists: bool,
}

/// Reads and writes observed between `start_capture` and `stop_capture`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureBuffer {
    reads: Vec<(String, CapturedRead)>,
    writes: Vec<String>,
}

impl CaptureBuffer {
    /// Record a read; repeated keys keep their first-read position.
    pub fn record_read(&mut self, key: &str, read: CapturedRead) {
        if let Some(slot) = self.reads.iter_mut().find(|(k, _)| k == key) {
            slot.1 = read;
        } else {
            self.reads.push((key.to_string(), read));
        }
    }

    /// Record a successful write, in append order.
    pub fn record_write(&mut self, key: &str) {
        self.writes.push(key.to_string());
    }

    /// Observed reads in first-read order.
    #[must_use]
    pub fn reads(&self) -> &[(String, CapturedRead)] {
        &self.reads
    }

    /// Read keys in first-read order.
    #[must_use]
    pub fn read_keys(&self) -> Vec<String> {
        self.reads.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Written keys in write order.
    #[must_use]
    pub fn writes(&self) -> &[String] {
        &self.writes
    }
}

/// Semantic memory over a pluggable [`Store`].
pub struct SemanticMemory {
    store: Box<dyn Store>,
    policy: Box<dyn PolicyGate>,
    capture: Option<CaptureBuffer>,
}

impl std::fmt::Debug for SemanticMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMemory")
            .field("sandbox", &self.store.is_sandbox())
            .field("capturing", &self.capture.is_some())
            .finish()
    }
}

impl SemanticMemory {
    /// Assemble memory over an explicit store and policy gate.
    #[must_use]
    pub fn new(store: Box<dyn Store>, policy: Box<dyn PolicyGate>) -> Self {
        Self {
            store,
            policy,
            capture: None,
        }
    }

    /// Open live memory at `db_path` with its journal at `journal_path`.
    ///
    /// # Errors
    ///
    /// Propagates SQLite open failures.
    pub fn live(
        db_path: &Path,
        journal_path: &Path,
        policy: Box<dyn PolicyGate>,
    ) -> Result<Self, StoreError> {
        Ok(Self::new(
            Box::new(LiveStore::open(db_path, journal_path)?),
            policy,
        ))
    }

    /// Build sandbox memory over a snapshot, with an allow-all policy.
    ///
    /// # Errors
    ///
    /// Propagates [`CanonError`]; unreachable for plain JSON values.
    pub fn sandbox(
        snapshot: BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, CanonError> {
        Ok(Self::new(
            Box::new(SandboxStore::from_snapshot(snapshot)?),
            Box::new(AllowAllPolicy),
        ))
    }

    /// Whether the backing store is a replay sandbox.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.store.is_sandbox()
    }

    /// The live write journal, when one exists.
    #[must_use]
    pub fn journal(&self) -> Option<&WriteJournal> {
        self.store.journal()
    }

    /// Install a fresh capture buffer.
    pub fn start_capture(&mut self) {
        self.capture = Some(CaptureBuffer::default());
    }

    /// Remove and return the capture buffer, if one was installed.
    pub fn stop_capture(&mut self) -> Option<CaptureBuffer> {
        self.capture.take()
    }

    /// Write a value.
    ///
    /// Gates run in a fixed order, each short-circuiting: key grammar,
    /// governance policy, serialization + PII scan, then persistence and
    /// (live only) the journal append. The capture buffer records the key
    /// only after the write fully succeeded.
    ///
    /// # Errors
    ///
    /// One of the stable [`SemError`] codes.
    pub fn put(
        &mut self,
        det: &mut DeterminismContext,
        key: &str,
        value: &serde_json::Value,
        source: &str,
    ) -> Result<PutOk, SemError> {
        if key.len() > MAX_KEY_LEN || !KEY_RE.is_match(key) {
            tracing::warn!(key, "sem put rejected: key format");
            return Err(SemError::InvalidKeyFormat {
                key: key.to_string(),
            });
        }
        if self.policy.block_key(key) {
            tracing::warn!(key, "sem put rejected: policy");
            return Err(SemError::PolicyBlocked {
                key: key.to_string(),
            });
        }

        let blob = canonical_serialize(value)?;
        if contains_pii(&blob) {
            tracing::warn!(key, "sem put rejected: privacy");
            return Err(SemError::PrivacyBlocked);
        }

        let counter = det.increment(scopes::SEM_WRITE);
        let last_updated = det.derive_timestamp(Some(counter))?;
        let value_hash = sha256_hex(blob.as_bytes());

        self.store
            .put(key, &blob, &last_updated)
            .map_err(|e| SemError::DbWriteFailed {
                reason: e.to_string(),
            })?;

        if let Some(journal) = self.store.journal() {
            let write_id = det.derive_id("sem_write", key, Some(counter))?;
            let entry = JournalEntry {
                write_id,
                canonical_key: key.to_string(),
                value_hash,
                source: source.to_string(),
                last_updated: last_updated.clone(),
                seed: det.seed().map(str::to_string),
                write_counter: counter,
                op: "PUT".to_string(),
                value_snapshot: value.clone(),
            };
            journal.append(&entry).map_err(|e| SemError::DbWriteFailed {
                reason: e.to_string(),
            })?;
        }

        if let Some(capture) = &mut self.capture {
            capture.record_write(key);
        }
        tracing::debug!(key, source, counter, "sem put");
        Ok(PutOk { last_updated })
    }

    /// Read a value.
    ///
    /// Backend errors and unparseable blobs are both treated as misses; a
    /// miss is still recorded in the capture buffer.
    pub fn get(&mut self, key: &str) -> GetResult {
        let fetched = match self.store.get(key) {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(key, error = %e, "sem get failed; treating as miss");
                None
            }
        };

        let hit = fetched.and_then(|(blob, last_updated)| {
            match serde_json::from_str::<serde_json::Value>(&blob) {
                Ok(value) => Some((value, last_updated)),
                Err(e) => {
                    tracing::warn!(key, error = %e, "sem blob unparseable; treating as miss");
                    None
                }
            }
        });

        match hit {
            Some((value, last_updated)) => {
                if let Some(capture) = &mut self.capture {
                    capture.record_read(
                        key,
                        CapturedRead {
                            value: Some(value.clone()),
                            exists: true,
                        },
                    );
                }
                GetResult {
                    exists: true,
                    value: Some(value),
                    last_updated,
                }
            }
            None => {
                if let Some(capture) = &mut self.capture {
                    capture.record_read(
                        key,
                        CapturedRead {
                            value: None,
                            exists: false,
                        },
                    );
                }
                GetResult::default()
            }
        }
    }
}

fn contains_pii(blob: &str) -> bool {
    blob.contains("PII") || CARD_RE.is_match(blob) || SSN_RE.is_match(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mace_governance::PolicyGate;
    use serde_json::json;
    use tempfile::TempDir;

    struct BlockList(Vec<String>);

    impl PolicyGate for BlockList {
        fn block_key(&self, key: &str) -> bool {
            self.0.iter().any(|k| k == key)
        }
    }

    fn live(tmp: &TempDir) -> SemanticMemory {
        SemanticMemory::live(
            &tmp.path().join("sem.db"),
            &tmp.path().join("journal.ndjson"),
            Box::new(AllowAllPolicy),
        )
        .unwrap()
    }

    fn det() -> DeterminismContext {
        DeterminismContext::with_seed("sem_test")
    }

    #[test]
    fn put_then_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        let ok = sem
            .put(&mut det, "user/profile/user_123/favorite_color", &json!("blue"), "test")
            .unwrap();
        assert!(!ok.last_updated.is_empty());

        let got = sem.get("user/profile/user_123/favorite_color");
        assert!(got.exists);
        assert_eq!(got.value, Some(json!("blue")));
        assert_eq!(got.last_updated.as_deref(), Some(ok.last_updated.as_str()));
    }

    #[test]
    fn invalid_keys_are_rejected_before_any_side_effect() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        for key in [
            "too/few/segments",
            "a/b/c/d/e",
            "UPPER/case/not/ok",
            "spaces in/it/are/bad",
            "",
            "a/b/c/",
        ] {
            let err = sem.put(&mut det, key, &json!(1), "test").unwrap_err();
            assert_eq!(err.code(), "INVALID_KEY_FORMAT", "key {key:?}");
        }
        let long = format!("{}/b/c/d", "a".repeat(70));
        let err = sem.put(&mut det, &long, &json!(1), "test").unwrap_err();
        assert_eq!(err.code(), "INVALID_KEY_FORMAT");

        // No journal entries and no counter movement for rejected writes.
        assert!(sem.journal().unwrap().entries().unwrap().is_empty());
        assert_eq!(det.increment("sem_write"), 1);
    }

    #[test]
    fn hyphen_allowed_only_in_third_segment() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        assert!(sem.put(&mut det, "user/profile/user-123/name", &json!("x"), "t").is_ok());
        assert_eq!(
            sem.put(&mut det, "user-x/profile/u/name", &json!("x"), "t")
                .unwrap_err()
                .code(),
            "INVALID_KEY_FORMAT"
        );
    }

    #[test]
    fn policy_gate_blocks_writes() {
        let tmp = TempDir::new().unwrap();
        let mut sem = SemanticMemory::live(
            &tmp.path().join("sem.db"),
            &tmp.path().join("journal.ndjson"),
            Box::new(BlockList(vec!["user/profile/user_123/secret".into()])),
        )
        .unwrap();
        let mut det = det();
        let err = sem
            .put(&mut det, "user/profile/user_123/secret", &json!("x"), "t")
            .unwrap_err();
        assert_eq!(err.code(), "POLICY_BLOCKED");
        assert!(sem.journal().unwrap().entries().unwrap().is_empty());
    }

    #[test]
    fn privacy_gate_blocks_pii_shapes() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        for value in [
            json!("123-45-6789"),
            json!("4111111111111111"),
            json!("4111-1111-1111-1111"),
            json!("4111 1111 1111 1111"),
            json!("contains PII marker"),
            json!({"note": "card 4111-1111-1111-1111 on file"}),
        ] {
            let err = sem
                .put(&mut det, "user/profile/user_123/field", &value, "t")
                .unwrap_err();
            assert_eq!(err.code(), "PRIVACY_BLOCKED", "value {value}");
        }
        // Neither the row nor the journal exists afterwards.
        assert!(!sem.get("user/profile/user_123/field").exists);
        assert!(sem.journal().unwrap().entries().unwrap().is_empty());
    }

    #[test]
    fn near_miss_digit_runs_are_allowed() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        for value in [json!("123-456789"), json!("123456789012345"), json!("12-34-5678")] {
            assert!(
                sem.put(&mut det, "user/profile/user_123/num", &value, "t").is_ok(),
                "value {value}"
            );
        }
    }

    #[test]
    fn journal_records_write_metadata() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        sem.put(&mut det, "user/profile/user_123/a", &json!("one"), "agent:profile_agent")
            .unwrap();
        sem.put(&mut det, "user/profile/user_123/b", &json!("two"), "agent:profile_agent")
            .unwrap();

        let entries = sem.journal().unwrap().entries().unwrap();
        assert_eq!(entries.len(), 2);
        let first = &entries[0];
        assert_eq!(first.op, "PUT");
        assert_eq!(first.write_counter, 1);
        assert_eq!(first.canonical_key, "user/profile/user_123/a");
        assert_eq!(first.source, "agent:profile_agent");
        assert_eq!(first.seed.as_deref(), Some("sem_test"));
        assert_eq!(first.value_snapshot, json!("one"));
        assert_eq!(first.value_hash, sha256_hex(b"\"one\""));
        assert_eq!(first.write_id.len(), 64);
        assert_eq!(entries[1].write_counter, 2);
    }

    #[test]
    fn sandbox_puts_never_touch_journal_or_disk() {
        let mut snapshot = BTreeMap::new();
        snapshot.insert("user/profile/user_123/color".to_string(), json!("blue"));
        let mut sem = SemanticMemory::sandbox(snapshot).unwrap();
        assert!(sem.is_sandbox());
        assert!(sem.journal().is_none());

        let mut det = det();
        sem.put(&mut det, "user/profile/user_123/color", &json!("red"), "t")
            .unwrap();
        let got = sem.get("user/profile/user_123/color");
        assert_eq!(got.value, Some(json!("red")));
    }

    #[test]
    fn capture_records_reads_writes_and_misses() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        sem.put(&mut det, "user/profile/user_123/color", &json!("blue"), "t")
            .unwrap();

        sem.start_capture();
        sem.get("user/profile/user_123/color");
        sem.get("user/profile/user_123/missing");
        sem.get("user/profile/user_123/color");
        sem.put(&mut det, "user/profile/user_123/town", &json!("oslo"), "t")
            .unwrap();
        let capture = sem.stop_capture().unwrap();

        assert_eq!(
            capture.read_keys(),
            vec![
                "user/profile/user_123/color".to_string(),
                "user/profile/user_123/missing".to_string(),
            ]
        );
        assert!(capture.reads()[0].1.exists);
        assert_eq!(capture.reads()[0].1.value, Some(json!("blue")));
        assert!(!capture.reads()[1].1.exists);
        assert_eq!(capture.writes(), ["user/profile/user_123/town"]);
    }

    #[test]
    fn writes_outside_capture_are_not_recorded() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        sem.put(&mut det, "user/profile/user_123/x", &json!(1), "t").unwrap();
        assert!(sem.stop_capture().is_none());
    }

    #[test]
    fn unparseable_blob_reads_as_miss() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("sem.db");
        let mut sem = SemanticMemory::live(
            &db,
            &tmp.path().join("journal.ndjson"),
            Box::new(AllowAllPolicy),
        )
        .unwrap();
        // Plant a corrupt row underneath the store.
        let conn = rusqlite::Connection::open(&db).unwrap();
        conn.execute(
            "INSERT INTO sem_kv (canonical_key, value, last_updated) VALUES (?1, ?2, ?3)",
            rusqlite::params!["user/profile/user_123/bad", "{not json", "t"],
        )
        .unwrap();
        drop(conn);

        sem.start_capture();
        let got = sem.get("user/profile/user_123/bad");
        assert!(!got.exists);
        let capture = sem.stop_capture().unwrap();
        assert!(!capture.reads()[0].1.exists);
    }

    #[test]
    fn last_write_wins_on_collisions() {
        let tmp = TempDir::new().unwrap();
        let mut sem = live(&tmp);
        let mut det = det();
        sem.put(&mut det, "user/profile/user_123/color", &json!("green"), "t")
            .unwrap();
        sem.put(&mut det, "user/profile/user_123/color", &json!("red"), "t")
            .unwrap();
        assert_eq!(
            sem.get("user/profile/user_123/color").value,
            Some(json!("red"))
        );
        // Both writes are journaled; the table keeps only the last.
        assert_eq!(sem.journal().unwrap().entries().unwrap().len(), 2);
    }
}
