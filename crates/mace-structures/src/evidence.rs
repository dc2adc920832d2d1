// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evidence objects for observed semantic-memory reads.
//!
//! One evidence object per observed read hit. Small values are embedded both
//! as canonical text and as the structured value, which is what lets the
//! replay engine rebuild a sandbox memory from the log alone. Values past
//! the size cap are redacted in place and parked in the artifact store.

use crate::{ArtifactStore, EvidenceType, StructureError};
use mace_canon::canonical_serialize;
use mace_determinism::{DeterminismContext, scopes};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Largest canonical payload embedded inline, in bytes.
pub const MAX_EVIDENCE_BYTES: usize = 16_384;

/// Inline representation of an observed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceContent {
    /// Canonical JSON text, or a `<Redacted: N bytes>` marker.
    pub text: String,
    /// The observed value itself; `None` when redacted.
    pub structured: Option<serde_json::Value>,
}

/// Where the evidence was fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceSource {
    /// Originating subsystem; `"sem"` for semantic memory.
    pub origin: String,
    /// The canonical key that was read.
    pub reference: String,
    /// Seed active at fetch time, stringified.
    pub fetch_seed: String,
}

/// One step in the evidence provenance chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProvenanceRecord {
    /// What happened in this step.
    pub step: String,
    /// Who performed it.
    pub actor: String,
    /// When (RFC-3339 UTC).
    pub timestamp: String,
    /// Free-text detail.
    pub note: String,
    /// Content-addressed blob holding the full payload, if redacted.
    pub artifact_url: Option<String>,
}

/// A snapshot of an observed external read, embedded in the reflective log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EvidenceObject {
    /// Deterministic identifier.
    pub evidence_id: String,
    /// Discriminator; currently always a SEM read snapshot.
    pub r#type: EvidenceType,
    /// The observed value, inline or redacted.
    pub content: EvidenceContent,
    /// Where it came from.
    pub source: EvidenceSource,
    /// One-line description.
    pub summary: String,
    /// Confidence that the snapshot is faithful.
    pub confidence: f64,
    /// Creation timestamp (RFC-3339 UTC).
    pub created_at: String,
    /// Processing steps applied to the payload.
    pub provenance: Vec<ProvenanceRecord>,
    /// Verbatim canonical payload; `None` when redacted.
    pub raw_payload: Option<String>,
}

impl EvidenceObject {
    /// Build evidence for a semantic-memory read hit.
    ///
    /// Advances the `evidence` counter once; the same counter value feeds
    /// the id and the timestamp. Payloads whose canonical form exceeds
    /// [`MAX_EVIDENCE_BYTES`] are replaced by a redaction marker and written
    /// to `artifacts`, leaving the blob URL in `provenance[0]`.
    ///
    /// # Errors
    ///
    /// Propagates determinism, serialization, and artifact-store failures.
    pub fn sem_read_snapshot(
        det: &mut DeterminismContext,
        artifacts: &ArtifactStore,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<Self, StructureError> {
        let c = det.increment(scopes::EVIDENCE);
        let evidence_id = det.derive_id("evidence", key, Some(c))?;
        let created_at = det.derive_timestamp(Some(c))?;
        let fetch_seed = det.seed().unwrap_or_default().to_string();

        let blob = canonical_serialize(value)?;
        let size = blob.len();

        let (content, raw_payload, provenance) = if size <= MAX_EVIDENCE_BYTES {
            (
                EvidenceContent {
                    text: blob.clone(),
                    structured: Some(value.clone()),
                },
                Some(blob),
                Vec::new(),
            )
        } else {
            let artifact_url = artifacts.save(blob.as_bytes())?;
            tracing::debug!(key, size, %artifact_url, "evidence payload redacted");
            (
                EvidenceContent {
                    text: format!("<Redacted: {size} bytes>"),
                    structured: None,
                },
                None,
                vec![ProvenanceRecord {
                    step: "size_check".to_string(),
                    actor: "system".to_string(),
                    timestamp: created_at.clone(),
                    note: format!(
                        "payload redacted at {size} bytes (limit {MAX_EVIDENCE_BYTES})"
                    ),
                    artifact_url: Some(artifact_url),
                }],
            )
        };

        Ok(Self {
            evidence_id,
            r#type: EvidenceType::SemReadSnapshot,
            content,
            source: EvidenceSource {
                origin: "sem".to_string(),
                reference: key.to_string(),
                fetch_seed,
            },
            summary: format!("snapshot of sem key {key}"),
            confidence: 1.0,
            created_at,
            provenance,
            raw_payload,
        })
    }
}
