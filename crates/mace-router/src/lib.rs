// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deterministic routing.
//!
//! A four-rule cascade maps percept text to one primary agent. The rules
//! run in a fixed order and the first match wins, so selection depends on
//! nothing but the text (plus the seed, which only flows into ids and the
//! snapshot, never into the choice).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use mace_determinism::DeterminismContext;
use mace_structures::{Percept, QcpSnapshot, RouterDecision, SelectedAgent, StructureError};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static MATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+\s*[+\-*/^]\s*\d+\s*$").expect("math pattern compiles")
});

static PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(my name is|i like|i am|my favorite|what is my|my)\b")
        .expect("profile pattern compiles")
});

static KNOWLEDGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(what is|define|who is)\b").expect("knowledge pattern compiles"));

/// Version tag embedded in every analysis snapshot.
pub const QCP_VERSION: &str = "qcp/0.1";

struct RuleMatch {
    agent_id: &'static str,
    explain: &'static str,
    intent_tag: &'static str,
    feature: Option<&'static str>,
}

fn classify(text: &str) -> RuleMatch {
    let lower = text.to_lowercase();
    if MATH_RE.is_match(text) {
        RuleMatch {
            agent_id: "math_agent",
            explain: "matched_R1_math",
            intent_tag: "math_operation",
            feature: Some("math"),
        }
    } else if PROFILE_RE.is_match(&lower) {
        RuleMatch {
            agent_id: "profile_agent",
            explain: "matched_R2_profile",
            intent_tag: "profile_update",
            feature: Some("profile"),
        }
    } else if KNOWLEDGE_RE.is_match(&lower) {
        RuleMatch {
            agent_id: "knowledge_agent",
            explain: "matched_R3_knowledge",
            intent_tag: "knowledge_query",
            feature: Some("fact"),
        }
    } else {
        RuleMatch {
            agent_id: "generic_agent",
            explain: "matched_R4_fallback",
            intent_tag: "general_conversation",
            feature: None,
        }
    }
}

/// Analyze a percept into a QCP snapshot.
#[must_use]
pub fn analyze_percept(det: &DeterminismContext, percept: &Percept) -> QcpSnapshot {
    let rule = classify(&percept.text);
    let mut features = BTreeMap::new();
    if let Some(feature) = rule.feature {
        features.insert(feature.to_string(), true);
    }
    QcpSnapshot {
        intent_tags: vec![rule.intent_tag.to_string()],
        features,
        depth_level: 1,
        urgency: "medium".to_string(),
        risk: "low".to_string(),
        qcp_version: QCP_VERSION.to_string(),
        random_seed: det.seed().map(str::to_string),
    }
}

/// Route a percept to exactly one primary agent.
///
/// # Errors
///
/// Propagates determinism failures from an unseeded context.
pub fn route(
    det: &mut DeterminismContext,
    percept: &Percept,
) -> Result<RouterDecision, StructureError> {
    let rule = classify(&percept.text);
    let snapshot = analyze_percept(det, percept);
    let features_used: Vec<String> = snapshot.features.keys().cloned().collect();

    tracing::debug!(
        percept_id = %percept.percept_id,
        agent = rule.agent_id,
        explain = rule.explain,
        "routed percept"
    );

    RouterDecision::build(
        det,
        &percept.percept_id,
        vec![SelectedAgent::primary(rule.agent_id)],
        snapshot,
        features_used,
        rule.explain,
    )
}

/// Order scored candidates: descending score, then ascending agent id.
///
/// The current cascade never produces more than one candidate; this is the
/// tie-break contract a scoring router has to preserve.
#[must_use]
pub fn rank_candidates(mut scored: Vec<(String, f64)>) -> Vec<String> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    scored.into_iter().map(|(agent, _)| agent).collect()
}
