// SPDX-License-Identifier: MIT OR Apache-2.0
//! Record types for one MACE request.
//!
//! Constructors here are the only way the runtime mints ids and timestamps:
//! each object kind draws from its own counter scope in the
//! [`DeterminismContext`], so a request re-executed from the same seed
//! rebuilds byte-identical records in the same order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod artifact;
mod evidence;

pub use artifact::ArtifactStore;
pub use evidence::{
    EvidenceContent, EvidenceObject, EvidenceSource, MAX_EVIDENCE_BYTES, ProvenanceRecord,
};

use mace_canon::{CanonError, canonical_serialize};
use mace_determinism::{DeterminismContext, DeterminismError, scopes};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Errors from structure construction.
#[derive(Debug, thiserror::Error)]
pub enum StructureError {
    /// The deterministic primitives refused (unseeded context).
    #[error(transparent)]
    Determinism(#[from] DeterminismError),

    /// Canonical serialization failed.
    #[error(transparent)]
    Canon(#[from] CanonError),

    /// The artifact store could not persist an oversize payload.
    #[error("artifact store failure: {0}")]
    Artifact(#[from] std::io::Error),
}

/// Severity of an [`ErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recoverable; the request still completed.
    Warning,
    /// The originating component failed outright.
    Error,
}

/// Which memory layers a routed request may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemoryStrategy {
    /// Semantic memory only.
    SemOnly,
}

/// Discriminator for [`EvidenceObject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceType {
    /// A snapshot of an observed semantic-memory read.
    SemReadSnapshot,
}

/// A textual percept entering the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Percept {
    /// Deterministic identifier.
    pub percept_id: String,
    /// Raw input text.
    pub text: String,
    /// Caller-declared intent, `"unknown"` when absent.
    pub intent: String,
    /// Heuristic complexity rating.
    pub complexity: u32,
    /// Named entities, if an extractor populated them.
    pub entities: Vec<String>,
    /// Urgency rating.
    pub urgency: String,
    /// Risk rating.
    pub risk: String,
    /// Creation timestamp (RFC-3339 UTC).
    pub timestamp: String,
}

impl Percept {
    /// Build a percept from input text.
    ///
    /// Advances the `percept_time` counter once; the same counter value
    /// feeds both the id and the timestamp.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] from an unseeded context.
    pub fn build(
        det: &mut DeterminismContext,
        text: &str,
        intent: &str,
    ) -> Result<Self, StructureError> {
        let c = det.increment(scopes::PERCEPT_TIME);
        let timestamp = det.derive_timestamp(Some(c))?;
        let percept_id = det.derive_id("percept", text, Some(c))?;
        Ok(Self {
            percept_id,
            text: text.to_string(),
            intent: intent.to_string(),
            complexity: 1,
            entities: Vec::new(),
            urgency: "low".to_string(),
            risk: "none".to_string(),
            timestamp,
        })
    }
}

/// One agent chosen by the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedAgent {
    /// Registry identifier of the agent.
    pub agent_id: String,
    /// Role within the request; currently always `"primary"`.
    pub role: String,
    /// Token budget granted to the agent.
    pub budget_tokens: u64,
}

impl SelectedAgent {
    /// A primary selection with a zeroed budget.
    #[must_use]
    pub fn primary(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            role: "primary".to_string(),
            budget_tokens: 0,
        }
    }
}

/// Resource budget attached to a router decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Budget {
    /// Token allowance.
    pub token_budget: u64,
    /// Wall-time allowance in milliseconds.
    pub time_budget_ms: u64,
    /// Estimated cost in account currency.
    pub cost_estimate: f64,
}

/// Percept-analysis snapshot embedded in a router decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QcpSnapshot {
    /// Intent tags derived from the percept text.
    pub intent_tags: Vec<String>,
    /// Boolean feature flags keyed by feature name.
    pub features: BTreeMap<String, bool>,
    /// Analysis depth.
    pub depth_level: u32,
    /// Urgency rating.
    pub urgency: String,
    /// Risk rating.
    pub risk: String,
    /// Analyzer version tag.
    pub qcp_version: String,
    /// Seed active when the snapshot was taken.
    pub random_seed: Option<String>,
}

/// The router's record of which agent handles a percept and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RouterDecision {
    /// Deterministic identifier.
    pub decision_id: String,
    /// The percept this decision routes.
    pub percept_id: String,
    /// Chosen agents; exactly one primary.
    pub selected_agents: Vec<SelectedAgent>,
    /// Analysis snapshot the decision was made from.
    pub qcp_snapshot: QcpSnapshot,
    /// Feature keys that were active during selection.
    pub router_features_used: Vec<String>,
    /// Analysis depth.
    pub depth_level: u32,
    /// Memory layers the request may touch.
    pub memory_strategy: MemoryStrategy,
    /// Resource budget for the selected agents.
    pub budget: Budget,
    /// Agent to substitute when the selection fails.
    pub fallback_policy: String,
    /// Which rule matched.
    pub explain: String,
    /// Creation timestamp (RFC-3339 UTC).
    pub created_at: String,
    /// Component that produced the decision.
    pub created_by: String,
    /// Seed active when the decision was made.
    pub random_seed: Option<String>,
}

impl RouterDecision {
    /// Build a decision record for `percept_id`.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] from an unseeded context.
    pub fn build(
        det: &mut DeterminismContext,
        percept_id: &str,
        selected_agents: Vec<SelectedAgent>,
        qcp_snapshot: QcpSnapshot,
        router_features_used: Vec<String>,
        explain: &str,
    ) -> Result<Self, StructureError> {
        let decision_counter = det.increment(scopes::ID);
        let decision_id = det.derive_id("decision", percept_id, Some(decision_counter))?;
        let time_counter = det.increment(scopes::DECISION_TIME);
        let created_at = det.derive_timestamp(Some(time_counter))?;
        Ok(Self {
            decision_id,
            percept_id: percept_id.to_string(),
            selected_agents,
            qcp_snapshot,
            router_features_used,
            depth_level: 1,
            memory_strategy: MemoryStrategy::SemOnly,
            budget: Budget::default(),
            fallback_policy: "generic_agent".to_string(),
            explain: explain.to_string(),
            created_at,
            created_by: "rulebook_router".to_string(),
            random_seed: det.seed().map(str::to_string),
        })
    }
}

/// What an agent produced for a percept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentOutput {
    /// Registry identifier of the producing agent.
    pub agent_id: String,
    /// User-facing reply text.
    pub text: String,
    /// Self-reported confidence in `[0, 1]`.
    pub confidence: f64,
    /// How the agent arrived at the reply.
    pub reasoning_trace: String,
    /// Verbatim output before any post-processing.
    pub raw_output: String,
}

impl AgentOutput {
    /// Assemble an output record; `raw_output` mirrors `text`.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        text: impl Into<String>,
        confidence: f64,
        reasoning_trace: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Self {
            agent_id: agent_id.into(),
            raw_output: text.clone(),
            text,
            confidence,
            reasoning_trace: reasoning_trace.into(),
        }
    }
}

/// A council member's verdict on one agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CouncilVote {
    /// Deterministic identifier.
    pub vote_id: String,
    /// Agent whose output was evaluated.
    pub agent_id: String,
    /// Correctness score in `[0, 1]`.
    pub correctness: f64,
    /// Relevance score in `[0, 1]`.
    pub relevance: f64,
    /// Safety score in `[0, 1]`.
    pub safety: f64,
    /// Coherence score in `[0, 1]`.
    pub coherence: f64,
    /// Empathy score in `[0, 1]`.
    pub empathy: f64,
    /// Whether the output is approved for release.
    pub approve: bool,
    /// Suggested revisions, empty when approved outright.
    pub suggested_changes: String,
    /// Why the council voted this way.
    pub explain: String,
}

impl CouncilVote {
    /// Build a vote over `(agent_id, output_text)`.
    ///
    /// The vote id is deterministic in exactly that pair, so identical
    /// outputs always receive identical vote ids under one seed.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] from an unseeded context.
    pub fn build(
        det: &mut DeterminismContext,
        agent_id: &str,
        output_text: &str,
        approve: bool,
        explain: &str,
    ) -> Result<Self, StructureError> {
        let vote_id =
            det.derive_id("council_vote", &format!("{agent_id}:{output_text}"), None)?;
        Ok(Self {
            vote_id,
            agent_id: agent_id.to_string(),
            correctness: 1.0,
            relevance: 1.0,
            safety: 1.0,
            coherence: 1.0,
            empathy: 1.0,
            approve,
            suggested_changes: String::new(),
            explain: explain.to_string(),
        })
    }
}

/// Where an error originated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorOrigin {
    /// Component that observed the failure.
    pub module_id: String,
    /// Agent involved, if any.
    pub agent_id: String,
    /// Version of the observing component.
    pub module_version: String,
}

/// A failure captured during a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorEvent {
    /// Deterministic identifier.
    pub error_id: String,
    /// Id of the object the failure relates to (usually the percept).
    pub context_id: String,
    /// Creation timestamp (RFC-3339 UTC).
    pub timestamp: String,
    /// How bad it was.
    pub severity: Severity,
    /// Redacted, deterministic message text.
    pub message: String,
    /// Where it came from.
    pub origin: ErrorOrigin,
    /// Seed active when the failure was captured.
    pub deterministic_seed_snapshot: Option<String>,
    /// What the executor did about it.
    pub recovery_action: String,
    /// Retry attempts made before giving up.
    pub retries: u32,
}

static WALL_CLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?")
        .expect("wall-clock pattern compiles")
});

/// Replace embedded wall-clock timestamps so error messages stay identical
/// across live execution and replay.
#[must_use]
pub fn redact_wall_clock(message: &str) -> String {
    WALL_CLOCK_RE.replace_all(message, "<time>").into_owned()
}

impl ErrorEvent {
    /// Build an error event with a redacted message.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] from an unseeded context.
    pub fn build(
        det: &mut DeterminismContext,
        context_id: &str,
        message: &str,
        origin: ErrorOrigin,
        severity: Severity,
    ) -> Result<Self, StructureError> {
        let message = redact_wall_clock(message);
        let error_id = det.derive_id("error", &message, None)?;
        let time_counter = det.increment(scopes::ERROR_TIME);
        let timestamp = det.derive_timestamp(Some(time_counter))?;
        Ok(Self {
            error_id,
            context_id: context_id.to_string(),
            timestamp,
            severity,
            message,
            origin,
            deterministic_seed_snapshot: det.seed().map(str::to_string),
            recovery_action: "fallback_to_generic".to_string(),
            retries: 0,
        })
    }
}

/// The output the runtime hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FinalOutput {
    /// Reply text.
    pub text: String,
    /// Confidence carried over from the winning agent output.
    pub confidence: f64,
    /// Whether the reply is speculative.
    pub speculative: bool,
}

/// The signed core of a reflective log entry.
///
/// These four fields are what the HMAC signature covers; everything else in
/// the entry can be re-derived from them plus the evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImmutableSubpayload {
    /// Log identifier.
    pub log_id: String,
    /// Input text of the request.
    pub percept_text: String,
    /// Final reply text.
    pub final_output_text: String,
    /// Identifier of the routing decision.
    pub router_decision_id: String,
}

/// The append-only record of one completed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReflectiveLogEntry {
    /// Deterministic identifier.
    pub log_id: String,
    /// Creation timestamp (RFC-3339 UTC).
    pub timestamp: String,
    /// The percept that started the request.
    pub percept: Percept,
    /// How it was routed.
    pub router_decision: RouterDecision,
    /// Every agent output produced, in production order.
    pub agent_outputs: Vec<AgentOutput>,
    /// Council verdicts, one per agent output.
    pub council_votes: Vec<CouncilVote>,
    /// Snapshots of observed memory reads.
    pub evidence_items: Vec<EvidenceObject>,
    /// Keys read from semantic memory, in first-read order.
    pub memory_reads: Vec<String>,
    /// Keys written to semantic memory, in write order.
    pub memory_writes: Vec<String>,
    /// The reply handed back to the caller.
    pub final_output: FinalOutput,
    /// Failures captured along the way.
    pub errors: Vec<ErrorEvent>,
    /// Seed the request ran under.
    pub random_seed: Option<String>,
    /// Signed core; stamped by the log writer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_subpayload: Option<ImmutableSubpayload>,
    /// Hex HMAC-SHA256 over the canonical subpayload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Which signing key produced the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_key_id: Option<String>,
}

/// Everything the executor collected for one request, ready to be logged.
#[derive(Debug, Clone)]
pub struct LogEntryParts {
    /// The percept that started the request.
    pub percept: Percept,
    /// How it was routed.
    pub router_decision: RouterDecision,
    /// Every agent output produced.
    pub agent_outputs: Vec<AgentOutput>,
    /// Council verdicts.
    pub council_votes: Vec<CouncilVote>,
    /// Snapshots of observed memory reads.
    pub evidence_items: Vec<EvidenceObject>,
    /// Keys read, in first-read order.
    pub memory_reads: Vec<String>,
    /// Keys written, in write order.
    pub memory_writes: Vec<String>,
    /// The reply handed back to the caller.
    pub final_output: FinalOutput,
    /// Failures captured along the way.
    pub errors: Vec<ErrorEvent>,
}

impl ReflectiveLogEntry {
    /// Assemble the log entry for a completed request.
    ///
    /// The log id is derived from the percept id and the entry timestamp so
    /// that two requests over the same text under different seeds never
    /// share a log id.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] and [`CanonError`].
    pub fn build(
        det: &mut DeterminismContext,
        parts: LogEntryParts,
    ) -> Result<Self, StructureError> {
        let time_counter = det.increment(scopes::LOG_TIME);
        let timestamp = det.derive_timestamp(Some(time_counter))?;
        let id_payload = canonical_serialize(&serde_json::json!({
            "percept_id": parts.percept.percept_id,
            "timestamp": timestamp,
        }))?;
        let log_id = det.derive_id("reflective_log", &id_payload, None)?;
        Ok(Self {
            log_id,
            timestamp,
            percept: parts.percept,
            router_decision: parts.router_decision,
            agent_outputs: parts.agent_outputs,
            council_votes: parts.council_votes,
            evidence_items: parts.evidence_items,
            memory_reads: parts.memory_reads,
            memory_writes: parts.memory_writes,
            final_output: parts.final_output,
            errors: parts.errors,
            random_seed: det.seed().map(str::to_string),
            immutable_subpayload: None,
            signature: None,
            signature_key_id: None,
        })
    }

    /// The signed core of this entry.
    #[must_use]
    pub fn subpayload(&self) -> ImmutableSubpayload {
        ImmutableSubpayload {
            log_id: self.log_id.clone(),
            percept_text: self.percept.text.clone(),
            final_output_text: self.final_output.text.clone(),
            router_decision_id: self.router_decision.decision_id.clone(),
        }
    }
}

/// A governance amendment record.
///
/// Amendments are proposals to change runtime policy; the only kind the core
/// consumes is `block_key`, which the semantic-memory policy gate enforces
/// by exact target match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Amendment {
    /// Deterministic identifier.
    pub amendment_id: String,
    /// Policy kind, e.g. `"block_key"`.
    pub policy_type: String,
    /// Value the policy applies to.
    pub target: String,
    /// Whether the amendment is currently in force.
    pub active: bool,
    /// Creation timestamp (RFC-3339 UTC).
    pub created_at: String,
    /// Who proposed it.
    pub proposed_by: String,
}

impl Amendment {
    /// Build an active amendment.
    ///
    /// # Errors
    ///
    /// Propagates [`DeterminismError`] from an unseeded context.
    pub fn build(
        det: &mut DeterminismContext,
        policy_type: &str,
        target: &str,
        proposed_by: &str,
    ) -> Result<Self, StructureError> {
        let c = det.increment(scopes::AMENDMENT_TIME);
        let amendment_id = det.derive_id("amendment", target, Some(c))?;
        let created_at = det.derive_timestamp(Some(c))?;
        Ok(Self {
            amendment_id,
            policy_type: policy_type.to_string(),
            target: target.to_string(),
            active: true,
            created_at,
            proposed_by: proposed_by.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mace_determinism::DeterminismContext;

    fn ctx() -> DeterminismContext {
        DeterminismContext::with_seed("structures_test")
    }

    #[test]
    fn percept_ids_are_stable_under_one_seed() {
        let mut a = ctx();
        let mut b = ctx();
        let pa = Percept::build(&mut a, "hello", "unknown").unwrap();
        let pb = Percept::build(&mut b, "hello", "unknown").unwrap();
        assert_eq!(pa, pb);
        assert_eq!(pa.percept_id.len(), 64);
    }

    #[test]
    fn successive_percepts_differ() {
        let mut det = ctx();
        let first = Percept::build(&mut det, "hello", "unknown").unwrap();
        let second = Percept::build(&mut det, "hello", "unknown").unwrap();
        assert_ne!(first.percept_id, second.percept_id);
    }

    #[test]
    fn router_decision_captures_seed_and_defaults() {
        let mut det = ctx();
        let seed = det.seed().map(str::to_string);
        let decision = RouterDecision::build(
            &mut det,
            "percept-1",
            vec![SelectedAgent::primary("math_agent")],
            QcpSnapshot {
                intent_tags: vec!["math_operation".into()],
                features: [("math".to_string(), true)].into(),
                depth_level: 1,
                urgency: "medium".into(),
                risk: "low".into(),
                qcp_version: "qcp/0.1".into(),
                random_seed: seed,
            },
            vec!["math".into()],
            "matched_R1_math",
        )
        .unwrap();
        assert_eq!(decision.selected_agents.len(), 1);
        assert_eq!(decision.selected_agents[0].role, "primary");
        assert_eq!(decision.memory_strategy, MemoryStrategy::SemOnly);
        assert_eq!(decision.budget, Budget::default());
        assert_eq!(decision.random_seed.as_deref(), Some("structures_test"));
    }

    #[test]
    fn vote_id_depends_on_agent_and_text() {
        let mut det = ctx();
        let a = CouncilVote::build(&mut det, "math_agent", "4", true, "x").unwrap();
        det.init_seed("structures_test");
        let b = CouncilVote::build(&mut det, "math_agent", "5", true, "x").unwrap();
        assert_ne!(a.vote_id, b.vote_id);
    }

    #[test]
    fn error_event_redacts_wall_clock() {
        let mut det = ctx();
        let event = ErrorEvent::build(
            &mut det,
            "ctx-1",
            "backend unavailable at 2026-07-31T18:22:03Z, giving up",
            ErrorOrigin {
                module_id: "executor".into(),
                agent_id: "math_agent".into(),
                module_version: "1.0.0".into(),
            },
            Severity::Error,
        )
        .unwrap();
        assert!(!event.message.contains("2026-07-31"));
        assert!(event.message.contains("<time>"));
        assert_eq!(event.recovery_action, "fallback_to_generic");
        assert_eq!(event.retries, 0);
    }

    #[test]
    fn redaction_handles_offsets_and_fractions() {
        let s = redact_wall_clock("a 2025-01-02 03:04:05.123+02:00 b 2025-01-02T03:04:05 c");
        assert_eq!(s, "a <time> b <time> c");
    }

    #[test]
    fn log_entry_build_is_reproducible() {
        let build = || {
            let mut det = ctx();
            let percept = Percept::build(&mut det, "2 + 2", "unknown").unwrap();
            let decision = RouterDecision::build(
                &mut det,
                &percept.percept_id,
                vec![SelectedAgent::primary("math_agent")],
                QcpSnapshot {
                    intent_tags: vec!["math_operation".into()],
                    features: BTreeMap::new(),
                    depth_level: 1,
                    urgency: "medium".into(),
                    risk: "low".into(),
                    qcp_version: "qcp/0.1".into(),
                    random_seed: None,
                },
                vec![],
                "matched_R1_math",
            )
            .unwrap();
            let output = AgentOutput::new("math_agent", "4", 1.0, "evaluated 2 + 2");
            ReflectiveLogEntry::build(
                &mut det,
                LogEntryParts {
                    percept,
                    router_decision: decision,
                    agent_outputs: vec![output],
                    council_votes: vec![],
                    evidence_items: vec![],
                    memory_reads: vec![],
                    memory_writes: vec![],
                    final_output: FinalOutput {
                        text: "4".into(),
                        confidence: 1.0,
                        speculative: false,
                    },
                    errors: vec![],
                },
            )
            .unwrap()
        };
        let a = build();
        let b = build();
        assert_eq!(
            canonical_serialize(&a).unwrap(),
            canonical_serialize(&b).unwrap()
        );
        assert_eq!(a.random_seed.as_deref(), Some("structures_test"));
        assert!(a.signature.is_none());
    }

    #[test]
    fn subpayload_mirrors_entry_fields() {
        let mut det = ctx();
        let percept = Percept::build(&mut det, "hi", "unknown").unwrap();
        let decision = RouterDecision::build(
            &mut det,
            &percept.percept_id,
            vec![SelectedAgent::primary("generic_agent")],
            QcpSnapshot {
                intent_tags: vec!["general_conversation".into()],
                features: BTreeMap::new(),
                depth_level: 1,
                urgency: "medium".into(),
                risk: "low".into(),
                qcp_version: "qcp/0.1".into(),
                random_seed: None,
            },
            vec![],
            "matched_R4_fallback",
        )
        .unwrap();
        let entry = ReflectiveLogEntry::build(
            &mut det,
            LogEntryParts {
                percept: percept.clone(),
                router_decision: decision.clone(),
                agent_outputs: vec![],
                council_votes: vec![],
                evidence_items: vec![],
                memory_reads: vec![],
                memory_writes: vec![],
                final_output: FinalOutput {
                    text: "ok".into(),
                    confidence: 0.5,
                    speculative: false,
                },
                errors: vec![],
            },
        )
        .unwrap();
        let sub = entry.subpayload();
        assert_eq!(sub.log_id, entry.log_id);
        assert_eq!(sub.percept_text, "hi");
        assert_eq!(sub.final_output_text, "ok");
        assert_eq!(sub.router_decision_id, decision.decision_id);
    }

    #[test]
    fn amendment_uses_its_own_counter_scope() {
        let mut det = ctx();
        let a = Amendment::build(&mut det, "block_key", "user/profile/u/x", "ops").unwrap();
        let b = Amendment::build(&mut det, "block_key", "user/profile/u/x", "ops").unwrap();
        assert_ne!(a.amendment_id, b.amendment_id);
        assert!(a.active);
    }
}
