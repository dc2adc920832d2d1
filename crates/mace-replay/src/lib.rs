// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sandbox replay of recorded requests.
//!
//! A replay rebuilds the semantic-memory view the original request saw from
//! the log's evidence items, hands it to a fresh executor as a sandbox
//! store, re-executes under the recorded seed, and compares the rerun
//! against the log field by field. Comparison is byte-exact through
//! canonical serialization; any drift is non-determinism or tampering.
//!
//! The live store is never involved: the sandbox is a separate value with
//! no journal handle and no connection to durable state, so the read-only
//! guarantee holds structurally and nothing needs restoring afterwards.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mace_canon::canonical_serialize;
use mace_runtime::{AgentRegistry, Executor};
use mace_sem::SemanticMemory;
use mace_structures::{ArtifactStore, EvidenceType, ReflectiveLogEntry};
use mace_telemetry::{CounterSet, counters};
use serde::Serialize;
use std::collections::BTreeMap;

/// Why a replay failed.
///
/// The [`code`](ReplayError::code) strings are stable and part of the
/// contract.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// The log entry carries no seed.
    #[error("MISSING_SEED: log entry has no random_seed")]
    MissingSeed,

    /// Evidence needed for the sandbox was redacted; rehydrate the artifact.
    #[error("EVIDENCE_REDACTED: evidence for {key} is redacted")]
    EvidenceRedacted {
        /// The key whose evidence is unavailable.
        key: String,
    },

    /// The rerun could not execute at all.
    #[error("REPLAY_EXECUTION_FAILED: {reason}")]
    ExecutionFailed {
        /// What went wrong.
        reason: String,
    },

    /// The rerun produced a different log id.
    #[error("LOG_ID_MISMATCH: {details}")]
    LogIdMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun produced a different final output.
    #[error("OUTPUT_MISMATCH: {details}")]
    OutputMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun routed differently.
    #[error("ROUTING_MISMATCH: {details}")]
    RoutingMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun read different keys.
    #[error("MEMORY_READS_MISMATCH: {details}")]
    MemoryReadsMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun wrote different keys.
    #[error("MEMORY_WRITES_MISMATCH: {details}")]
    MemoryWritesMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun captured different error events.
    #[error("ERROR_MISMATCH: {details}")]
    ErrorMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun produced different council votes.
    #[error("COUNCIL_VOTE_MISMATCH: {details}")]
    CouncilVoteMismatch {
        /// Expected-vs-got detail.
        details: String,
    },

    /// The rerun produced different agent outputs.
    #[error("AGENT_OUTPUT_MISMATCH: {details}")]
    AgentOutputMismatch {
        /// Expected-vs-got detail.
        details: String,
    },
}

impl ReplayError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingSeed => "MISSING_SEED",
            Self::EvidenceRedacted { .. } => "EVIDENCE_REDACTED",
            Self::ExecutionFailed { .. } => "REPLAY_EXECUTION_FAILED",
            Self::LogIdMismatch { .. } => "LOG_ID_MISMATCH",
            Self::OutputMismatch { .. } => "OUTPUT_MISMATCH",
            Self::RoutingMismatch { .. } => "ROUTING_MISMATCH",
            Self::MemoryReadsMismatch { .. } => "MEMORY_READS_MISMATCH",
            Self::MemoryWritesMismatch { .. } => "MEMORY_WRITES_MISMATCH",
            Self::ErrorMismatch { .. } => "ERROR_MISMATCH",
            Self::CouncilVoteMismatch { .. } => "COUNCIL_VOTE_MISMATCH",
            Self::AgentOutputMismatch { .. } => "AGENT_OUTPUT_MISMATCH",
        }
    }
}

/// Replays recorded requests against sandbox memory.
pub struct Replayer {
    artifacts_dir: std::path::PathBuf,
    agents: fn() -> AgentRegistry,
    telemetry: CounterSet,
}

impl std::fmt::Debug for Replayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replayer")
            .field("artifacts_dir", &self.artifacts_dir)
            .finish()
    }
}

impl Replayer {
    /// Replayer using the standard agent registry.
    ///
    /// `artifacts_dir` only receives writes if a replayed request produces
    /// oversize evidence again; identical content lands at identical paths.
    #[must_use]
    pub fn new(artifacts_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            agents: AgentRegistry::standard,
            telemetry: CounterSet::new(),
        }
    }

    /// Use a custom agent registry factory; it must build the same agents
    /// the original run used.
    #[must_use]
    pub fn with_agents(mut self, agents: fn() -> AgentRegistry) -> Self {
        self.agents = agents;
        self
    }

    /// Share a telemetry counter set.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: CounterSet) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Re-execute `entry` in a sandbox and verify byte-exact equality.
    ///
    /// # Errors
    ///
    /// One of the stable [`ReplayError`] codes; this function never panics
    /// and touches no durable state.
    pub fn replay(&self, entry: &ReflectiveLogEntry) -> Result<(), ReplayError> {
        self.telemetry.increment(counters::REPLAY_RUNS);
        let verdict = self.replay_inner(entry);
        if let Err(err) = &verdict {
            self.telemetry.increment(counters::REPLAY_FAILURES);
            tracing::warn!(log_id = %entry.log_id, code = err.code(), "replay failed");
        } else {
            tracing::debug!(log_id = %entry.log_id, "replay verified");
        }
        verdict
    }

    fn replay_inner(&self, entry: &ReflectiveLogEntry) -> Result<(), ReplayError> {
        let seed = entry
            .random_seed
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ReplayError::MissingSeed)?;

        let snapshot = build_snapshot(entry)?;
        let sem = SemanticMemory::sandbox(snapshot).map_err(|e| ReplayError::ExecutionFailed {
            reason: e.to_string(),
        })?;

        let mut executor = Executor::new(sem, ArtifactStore::new(&self.artifacts_dir))
            .with_agents((self.agents)());
        let (_, rerun) = executor
            .execute(&entry.percept.text, &entry.percept.intent, Some(seed), false)
            .map_err(|e| ReplayError::ExecutionFailed {
                reason: e.to_string(),
            })?;

        if rerun.log_id != entry.log_id {
            return Err(ReplayError::LogIdMismatch {
                details: format!("expected {}, got {}", entry.log_id, rerun.log_id),
            });
        }
        compare(&entry.final_output, &rerun.final_output, |details| {
            ReplayError::OutputMismatch { details }
        })?;
        compare(&entry.router_decision, &rerun.router_decision, |details| {
            ReplayError::RoutingMismatch { details }
        })?;
        compare(&entry.memory_reads, &rerun.memory_reads, |details| {
            ReplayError::MemoryReadsMismatch { details }
        })?;
        compare(&entry.memory_writes, &rerun.memory_writes, |details| {
            ReplayError::MemoryWritesMismatch { details }
        })?;
        compare(&entry.errors, &rerun.errors, |details| {
            ReplayError::ErrorMismatch { details }
        })?;
        compare(&entry.council_votes, &rerun.council_votes, |details| {
            ReplayError::CouncilVoteMismatch { details }
        })?;
        compare(&entry.agent_outputs, &rerun.agent_outputs, |details| {
            ReplayError::AgentOutputMismatch { details }
        })?;
        Ok(())
    }
}

/// Replay with the standard agents; convenience over [`Replayer`].
///
/// # Errors
///
/// See [`Replayer::replay`].
pub fn replay_entry(
    entry: &ReflectiveLogEntry,
    artifacts_dir: impl Into<std::path::PathBuf>,
) -> Result<(), ReplayError> {
    Replayer::new(artifacts_dir).replay(entry)
}

/// Rebuild the memory view the original request observed.
fn build_snapshot(
    entry: &ReflectiveLogEntry,
) -> Result<BTreeMap<String, serde_json::Value>, ReplayError> {
    let mut snapshot = BTreeMap::new();
    for evidence in &entry.evidence_items {
        if evidence.r#type != EvidenceType::SemReadSnapshot {
            continue;
        }
        let key = evidence.source.reference.clone();
        let value = match &evidence.content.structured {
            Some(value) => value.clone(),
            None => {
                let text = &evidence.content.text;
                if text.starts_with("<Redacted") {
                    return Err(ReplayError::EvidenceRedacted { key });
                }
                serde_json::from_str(text)
                    .unwrap_or_else(|_| serde_json::Value::String(text.clone()))
            }
        };
        snapshot.insert(key, value);
    }
    Ok(snapshot)
}

const DETAIL_LIMIT: usize = 1000;

fn compare<T: Serialize>(
    expected: &T,
    got: &T,
    into_error: impl FnOnce(String) -> ReplayError,
) -> Result<(), ReplayError> {
    let expected = canonical_serialize(expected).unwrap_or_default();
    let got = canonical_serialize(got).unwrap_or_default();
    if expected == got {
        return Ok(());
    }
    let mut details = format!("expected {expected}, got {got}");
    if details.len() > DETAIL_LIMIT {
        details.truncate(DETAIL_LIMIT);
        details.push_str("... (truncated)");
    }
    Err(into_error(details))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mace_governance::AllowAllPolicy;
    use mace_structures::ArtifactStore;
    use tempfile::TempDir;

    fn live_executor(tmp: &TempDir) -> Executor {
        let sem = SemanticMemory::live(
            &tmp.path().join("sem.db"),
            &tmp.path().join("journal.ndjson"),
            Box::new(AllowAllPolicy),
        )
        .unwrap();
        Executor::new(sem, ArtifactStore::new(tmp.path().join("artifacts")))
    }

    #[test]
    fn math_log_replays_clean() {
        let tmp = TempDir::new().unwrap();
        let mut exec = live_executor(&tmp);
        let (_, entry) = exec.execute("2 + 2", "unknown", Some("golden"), false).unwrap();
        replay_entry(&entry, tmp.path().join("replay_artifacts")).unwrap();
    }

    #[test]
    fn missing_seed_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut exec = live_executor(&tmp);
        let (_, mut entry) = exec.execute("2 + 2", "unknown", Some("golden"), false).unwrap();
        entry.random_seed = None;
        let err = replay_entry(&entry, tmp.path()).unwrap_err();
        assert_eq!(err.code(), "MISSING_SEED");
    }

    #[test]
    fn tampered_output_is_detected() {
        let tmp = TempDir::new().unwrap();
        let mut exec = live_executor(&tmp);
        let (_, mut entry) = exec.execute("2 + 2", "unknown", Some("golden"), false).unwrap();
        entry.final_output.text = "5".to_string();
        let err = replay_entry(&entry, tmp.path()).unwrap_err();
        assert_eq!(err.code(), "OUTPUT_MISMATCH");
    }

    #[test]
    fn replay_reads_evidence_not_the_live_store() {
        let tmp = TempDir::new().unwrap();
        let mut exec = live_executor(&tmp);
        exec.execute(
            "remember my favorite_color is blue",
            "unknown",
            Some("s1"),
            false,
        )
        .unwrap();
        let (output, entry) = exec
            .execute("what is my favorite_color", "unknown", Some("s2"), false)
            .unwrap();
        assert_eq!(output.text, "blue");
        assert_eq!(entry.evidence_items.len(), 1);

        // Clobber the live value; the sandbox must still see "blue".
        exec.execute(
            "remember my favorite_color is green",
            "unknown",
            Some("s3"),
            false,
        )
        .unwrap();
        replay_entry(&entry, tmp.path().join("replay_artifacts")).unwrap();
    }

    #[test]
    fn telemetry_counts_runs_and_failures() {
        let tmp = TempDir::new().unwrap();
        let mut exec = live_executor(&tmp);
        let (_, mut entry) = exec.execute("2 + 2", "unknown", Some("golden"), false).unwrap();

        let telemetry = CounterSet::new();
        let replayer =
            Replayer::new(tmp.path().join("replay_artifacts")).with_telemetry(telemetry.clone());
        replayer.replay(&entry).unwrap();
        entry.final_output.text = "5".to_string();
        assert!(replayer.replay(&entry).is_err());

        assert_eq!(telemetry.get(counters::REPLAY_RUNS), 2);
        assert_eq!(telemetry.get(counters::REPLAY_FAILURES), 1);
    }
}
