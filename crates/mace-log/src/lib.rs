// SPDX-License-Identifier: MIT OR Apache-2.0
//! The append-only signed reflective log.
//!
//! [`LogWriter`] stamps an entry's immutable subpayload and signature, then
//! inserts the canonical JSON into the `reflective_logs` table. The table is
//! append-only by construction: this crate exposes no update or delete, and
//! a duplicate `log_id` surfaces as a storage-level constraint violation.
//! [`audit_row`] re-derives the signature over a stored row to detect
//! tampering after the fact.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod signing;

pub use signing::{SecretResolver, SigningError, env_var_for, sign_payload, verify_signature};

use mace_canon::{CanonError, canonical_serialize};
use mace_structures::{ImmutableSubpayload, ReflectiveLogEntry};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Default signing key id for reflective log entries.
pub const DEFAULT_KEY_ID: &str = "reflective_log_key";

/// Errors from the reflective log.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The SQLite backend failed (including `log_id` uniqueness violations).
    #[error("reflective log storage failure: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The log directory or file could not be created.
    #[error("reflective log io failure: {0}")]
    Io(#[from] std::io::Error),

    /// Signing-key resolution or signature computation failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// Canonical serialization failed.
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// A stored row failed the log-schema check or did not deserialize.
    #[error("stored log row is not a valid reflective log entry: {reason}")]
    SchemaViolation {
        /// What the validator reported.
        reason: String,
    },
}

/// One persisted row of the `reflective_logs` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    /// Primary key.
    pub log_id: String,
    /// Canonical JSON of the full entry.
    pub log_json: String,
    /// Canonical JSON of the signed subpayload.
    pub immutable_subpayload: String,
    /// Hex HMAC-SHA256 over `immutable_subpayload`.
    pub signature: String,
    /// Key id the signature was produced under.
    pub signature_key_id: String,
    /// Entry timestamp (RFC-3339 UTC).
    pub created_at: String,
}

/// Verdict from auditing one stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditVerdict {
    /// The audited row.
    pub log_id: String,
    /// Whether the stored signature matches the recomputed one.
    pub verified: bool,
}

/// Writes and retrieves signed reflective log entries.
pub struct LogWriter {
    conn: Connection,
    resolver: SecretResolver,
    key_id: String,
}

impl std::fmt::Debug for LogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogWriter")
            .field("key_id", &self.key_id)
            .finish()
    }
}

impl LogWriter {
    /// Open (creating if needed) the `reflective_logs` table at `db_path`,
    /// signing with [`DEFAULT_KEY_ID`].
    ///
    /// # Errors
    ///
    /// Propagates SQLite open/DDL failures.
    pub fn open(db_path: &Path, resolver: SecretResolver) -> Result<Self, LogError> {
        Self::open_with_key(db_path, resolver, DEFAULT_KEY_ID)
    }

    /// Open with an explicit signing key id.
    ///
    /// # Errors
    ///
    /// Propagates SQLite open/DDL failures.
    pub fn open_with_key(
        db_path: &Path,
        resolver: SecretResolver,
        key_id: &str,
    ) -> Result<Self, LogError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        // journal_mode answers with the resulting mode, so it needs a query.
        let _mode: String = conn.query_row("PRAGMA journal_mode=DELETE", [], |row| row.get(0))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS reflective_logs (
                 log_id TEXT PRIMARY KEY,
                 log_json TEXT NOT NULL,
                 immutable_subpayload TEXT NOT NULL,
                 signature TEXT NOT NULL,
                 signature_key_id TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );",
        )?;
        Ok(Self {
            conn,
            resolver,
            key_id: key_id.to_string(),
        })
    }

    /// Sign and persist an entry.
    ///
    /// Stamps `immutable_subpayload`, `signature`, and `signature_key_id`
    /// on the entry in place, then appends the canonical row. Inserting an
    /// existing `log_id` fails with a constraint violation; there is no
    /// overwrite path.
    ///
    /// # Errors
    ///
    /// Signing, serialization, or storage failures.
    pub fn write(&self, entry: &mut ReflectiveLogEntry) -> Result<(), LogError> {
        let subpayload = entry.subpayload();
        let secret = self.resolver.resolve(&self.key_id)?;
        let signature = sign_payload(&secret, &subpayload)?;

        entry.immutable_subpayload = Some(subpayload.clone());
        entry.signature = Some(signature.clone());
        entry.signature_key_id = Some(self.key_id.clone());

        let log_json = canonical_serialize(entry)?;
        let subpayload_json = canonical_serialize(&subpayload)?;
        self.conn.execute(
            "INSERT INTO reflective_logs
             (log_id, log_json, immutable_subpayload, signature, signature_key_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.log_id,
                log_json,
                subpayload_json,
                signature,
                self.key_id,
                entry.timestamp,
            ],
        )?;
        tracing::info!(log_id = %entry.log_id, "reflective log persisted");
        Ok(())
    }

    /// Fetch a stored row by id.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn fetch(&self, log_id: &str) -> Result<Option<StoredLog>, LogError> {
        let row = self
            .conn
            .query_row(
                "SELECT log_id, log_json, immutable_subpayload, signature,
                        signature_key_id, created_at
                 FROM reflective_logs WHERE log_id = ?1",
                params![log_id],
                |row| {
                    Ok(StoredLog {
                        log_id: row.get(0)?,
                        log_json: row.get(1)?,
                        immutable_subpayload: row.get(2)?,
                        signature: row.get(3)?,
                        signature_key_id: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Number of rows in the log table.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn len(&self) -> Result<u64, LogError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM reflective_logs", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Whether the log table is empty.
    ///
    /// # Errors
    ///
    /// Propagates storage failures.
    pub fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len()? == 0)
    }

    /// Audit a stored row: recompute the signature over the stored
    /// subpayload and compare.
    ///
    /// # Errors
    ///
    /// Signing-key resolution failures, or a subpayload that no longer
    /// parses at all.
    pub fn audit_row(&self, row: &StoredLog) -> Result<AuditVerdict, LogError> {
        let subpayload: ImmutableSubpayload = serde_json::from_str(&row.immutable_subpayload)
            .map_err(|e| LogError::SchemaViolation {
                reason: format!("subpayload unparseable: {e}"),
            })?;
        let secret = self.resolver.resolve(&row.signature_key_id)?;
        let verified = verify_signature(&secret, &subpayload, &row.signature);
        if !verified {
            tracing::warn!(log_id = %row.log_id, "reflective log signature mismatch");
        }
        Ok(AuditVerdict {
            log_id: row.log_id.clone(),
            verified,
        })
    }
}

/// Decode a stored row back into a [`ReflectiveLogEntry`].
///
/// The JSON is checked against the generated log schema before
/// deserialization, so a foreign or truncated row fails loudly instead of
/// producing a half-filled entry.
///
/// # Errors
///
/// [`LogError::SchemaViolation`] when validation or deserialization fails.
pub fn decode_entry(log_json: &str) -> Result<ReflectiveLogEntry, LogError> {
    let value: serde_json::Value =
        serde_json::from_str(log_json).map_err(|e| LogError::SchemaViolation {
            reason: format!("not JSON: {e}"),
        })?;

    let schema = serde_json::to_value(schemars::schema_for!(ReflectiveLogEntry)).map_err(|e| {
        LogError::SchemaViolation {
            reason: format!("schema serialization failed: {e}"),
        }
    })?;
    let validator =
        jsonschema::validator_for(&schema).map_err(|e| LogError::SchemaViolation {
            reason: format!("schema failed to compile: {e}"),
        })?;
    if let Some(first) = validator.iter_errors(&value).next() {
        return Err(LogError::SchemaViolation {
            reason: first.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| LogError::SchemaViolation {
        reason: format!("deserialization failed: {e}"),
    })
}
