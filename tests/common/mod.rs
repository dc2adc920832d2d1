// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the integration suites.
#![allow(dead_code)] // each test binary uses a different subset

use mace_governance::AllowAllPolicy;
use mace_log::{LogWriter, SecretResolver};
use mace_runtime::Executor;
use mace_sem::SemanticMemory;
use mace_structures::ArtifactStore;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Database file shared by `sem_kv` and `reflective_logs`.
pub fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("mace.db")
}

/// NDJSON write journal.
pub fn journal_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("logs/sem_write_journal.ndjson")
}

/// Artifact blob directory.
pub fn artifacts_dir(tmp: &TempDir) -> PathBuf {
    tmp.path().join("artifacts")
}

/// A full live executor: SQLite-backed memory, artifact store, and a
/// signing log writer using the deterministic dev secret.
pub fn live_executor(tmp: &TempDir) -> Executor {
    let sem = SemanticMemory::live(
        &db_path(tmp),
        &journal_path(tmp),
        Box::new(AllowAllPolicy),
    )
    .expect("open live sem");
    let writer = LogWriter::open(&db_path(tmp), SecretResolver::with_dev_fallback())
        .expect("open log writer");
    Executor::new(sem, ArtifactStore::new(artifacts_dir(tmp))).with_writer(writer)
}

/// An executor without log persistence, for tests that only need the entry.
pub fn unlogged_executor(tmp: &TempDir) -> Executor {
    let sem = SemanticMemory::live(
        &db_path(tmp),
        &journal_path(tmp),
        Box::new(AllowAllPolicy),
    )
    .expect("open live sem");
    Executor::new(sem, ArtifactStore::new(artifacts_dir(tmp)))
}

/// Hex SHA-256 of a file's bytes; empty-string hash for a missing file.
pub fn file_hash(path: &Path) -> String {
    let bytes = std::fs::read(path).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}
