// SPDX-License-Identifier: MIT OR Apache-2.0
//! The standard agents.
//!
//! All four are pure functions of the percept and the semantic-memory
//! values they observe through the capture, which is the property replay
//! relies on.

use crate::{Agent, AgentContext, AgentError};
use mace_structures::{AgentOutput, Percept};
use regex::Regex;
use std::sync::LazyLock;

/// Single-user profile namespace until an identity layer exists.
pub const DEFAULT_USER_ID: &str = "user_123";

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// MathAgent
// ---------------------------------------------------------------------------

static EXPR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*([+\-*/^])\s*(\d+)\s*$").expect("expression pattern compiles")
});

/// Evaluates binary integer arithmetic like `2 + 2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathAgent;

impl Agent for MathAgent {
    fn id(&self) -> &str {
        "math_agent"
    }

    fn run(&self, percept: &Percept, _ctx: &mut AgentContext<'_>) -> Result<AgentOutput, AgentError> {
        let caps = EXPR_RE
            .captures(&percept.text)
            .ok_or_else(|| AgentError::Failed("not a binary arithmetic expression".to_string()))?;
        let lhs: i64 = caps[1]
            .parse()
            .map_err(|_| AgentError::Failed("left operand out of range".to_string()))?;
        let rhs: i64 = caps[3]
            .parse()
            .map_err(|_| AgentError::Failed("right operand out of range".to_string()))?;
        let op = &caps[2];

        let overflow = || AgentError::Failed("arithmetic overflow".to_string());
        let text = match op {
            "+" => lhs.checked_add(rhs).ok_or_else(overflow)?.to_string(),
            "-" => lhs.checked_sub(rhs).ok_or_else(overflow)?.to_string(),
            "*" => lhs.checked_mul(rhs).ok_or_else(overflow)?.to_string(),
            "/" => {
                if rhs == 0 {
                    return Err(AgentError::Failed("division by zero".to_string()));
                }
                // True division: integral quotients still render as floats.
                if lhs % rhs == 0 {
                    format!("{}.0", lhs / rhs)
                } else {
                    format!("{}", lhs as f64 / rhs as f64)
                }
            }
            "^" => {
                let exp = u32::try_from(rhs).map_err(|_| overflow())?;
                lhs.checked_pow(exp).ok_or_else(overflow)?.to_string()
            }
            _ => return Err(AgentError::Failed(format!("unknown operator {op}"))),
        };

        Ok(AgentOutput::new(
            self.id(),
            text,
            1.0,
            format!("evaluated {lhs} {op} {rhs}"),
        ))
    }
}

// ---------------------------------------------------------------------------
// ProfileAgent
// ---------------------------------------------------------------------------

static WRITE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:remember my|my) (?P<attribute>[a-z0-9_]+) is (?P<value>.+)$")
        .expect("profile write pattern compiles")
});

static READ_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:what is my|my) (?P<attribute>[a-z0-9_]+)")
        .expect("profile read pattern compiles")
});

/// Stores and recalls user profile attributes through semantic memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileAgent;

impl Agent for ProfileAgent {
    fn id(&self) -> &str {
        "profile_agent"
    }

    fn run(&self, percept: &Percept, ctx: &mut AgentContext<'_>) -> Result<AgentOutput, AgentError> {
        let text = percept.text.trim();

        if let Some(caps) = WRITE_RE.captures(text) {
            let attribute = caps["attribute"].to_lowercase();
            let value = caps["value"].trim().to_lowercase();
            let key = format!("user/profile/{DEFAULT_USER_ID}/{attribute}");

            return Ok(
                match ctx.put_sem(
                    &key,
                    &serde_json::Value::String(value.clone()),
                    "agent:profile_agent",
                ) {
                    Ok(_) => AgentOutput::new(
                        self.id(),
                        format!("Stored {attribute} = {value}"),
                        1.0,
                        format!("parsed write intent for '{attribute}'; stored in semantic memory"),
                    ),
                    Err(err) => AgentOutput::new(
                        self.id(),
                        "I tried to store this, but my memory backend failed. \
                         I may not remember this next time.",
                        0.0,
                        format!("semantic memory write failed: {}", err.code()),
                    ),
                },
            );
        }

        if let Some(caps) = READ_RE.captures(text) {
            let attribute = caps["attribute"].to_lowercase();
            let key = format!("user/profile/{DEFAULT_USER_ID}/{attribute}");
            let result = ctx.get_sem(&key);

            return Ok(if result.exists {
                let value = result.value.unwrap_or(serde_json::Value::Null);
                AgentOutput::new(
                    self.id(),
                    value_text(&value),
                    1.0,
                    format!("parsed read intent for '{attribute}'; semantic memory hit"),
                )
            } else {
                AgentOutput::new(
                    self.id(),
                    "I don't have this information stored yet.",
                    1.0,
                    format!("parsed read intent for '{attribute}'; semantic memory miss"),
                )
            });
        }

        Ok(AgentOutput::new(
            self.id(),
            "I don't understand that profile request.",
            0.0,
            "no profile pattern matched",
        ))
    }
}

// ---------------------------------------------------------------------------
// KnowledgeAgent
// ---------------------------------------------------------------------------

const KNOWLEDGE_PREFIXES: [&str; 3] = ["what is ", "define ", "who is "];

fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_sep = false;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    slug
}

/// Looks up stored facts under `world/fact/<slug>/definition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnowledgeAgent;

impl Agent for KnowledgeAgent {
    fn id(&self) -> &str {
        "knowledge_agent"
    }

    fn run(&self, percept: &Percept, ctx: &mut AgentContext<'_>) -> Result<AgentOutput, AgentError> {
        let lower = percept.text.trim().to_lowercase();
        let topic = KNOWLEDGE_PREFIXES
            .iter()
            .find_map(|prefix| lower.strip_prefix(prefix));

        if let Some(topic) = topic {
            let slug = slugify(topic);
            if !slug.is_empty() {
                let key = format!("world/fact/{slug}/definition");
                let result = ctx.get_sem(&key);
                if result.exists {
                    let value = result.value.unwrap_or(serde_json::Value::Null);
                    return Ok(AgentOutput::new(
                        self.id(),
                        value_text(&value),
                        1.0,
                        format!("stored fact found for '{slug}'"),
                    ));
                }
            }
        }

        Ok(AgentOutput::new(
            self.id(),
            "I don't have that information stored yet. If you want, tell me and I'll remember it.",
            1.0,
            "no stored fact matched the query",
        ))
    }
}

// ---------------------------------------------------------------------------
// GenericAgent
// ---------------------------------------------------------------------------

/// Canned reply for anything no specialist claims.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericAgent;

impl Agent for GenericAgent {
    fn id(&self) -> &str {
        "generic_agent"
    }

    fn run(&self, _percept: &Percept, _ctx: &mut AgentContext<'_>) -> Result<AgentOutput, AgentError> {
        Ok(AgentOutput::new(
            self.id(),
            "I'm not sure how to help with that yet, but I'm learning.",
            0.5,
            "no specialist rule matched; canned reply",
        ))
    }
}
