// SPDX-License-Identifier: MIT OR Apache-2.0
//! Agents, council, and the request executor.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod agents;
mod council;
mod executor;

pub use council::{ApproveAllCouncil, Council};
pub use executor::{Executor, ExecutorError};

use mace_determinism::DeterminismContext;
use mace_sem::{GetResult, PutOk, SemError, SemanticMemory};
use mace_structures::{AgentOutput, Percept};
use std::collections::BTreeMap;

/// How an agent reports failure.
///
/// Timeouts are a first-class variant so the executor can map them to a
/// `warning` error event deterministically instead of parsing prose.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// The agent gave up waiting on something.
    #[error("AGENT_TIMEOUT: {0}")]
    Timeout(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// What an agent may touch while it runs: semantic memory (under the
/// executor's capture) and the deterministic context.
pub struct AgentContext<'a> {
    /// Semantic memory with the request capture installed.
    pub sem: &'a mut SemanticMemory,
    /// The request's deterministic context.
    pub det: &'a mut DeterminismContext,
}

impl AgentContext<'_> {
    /// Write to semantic memory.
    ///
    /// # Errors
    ///
    /// One of the stable [`SemError`] codes.
    pub fn put_sem(
        &mut self,
        key: &str,
        value: &serde_json::Value,
        source: &str,
    ) -> Result<PutOk, SemError> {
        self.sem.put(self.det, key, value, source)
    }

    /// Read from semantic memory.
    pub fn get_sem(&mut self, key: &str) -> GetResult {
        self.sem.get(key)
    }
}

/// A black-box function from percept to output.
///
/// Agents must be pure with respect to everything except the semantic
/// memory reads and writes they perform through the context; that is what
/// makes their outputs reproducible under sandbox replay.
pub trait Agent {
    /// Stable registry identifier.
    fn id(&self) -> &str;

    /// Produce an output for the percept.
    ///
    /// # Errors
    ///
    /// [`AgentError`]; the executor converts failures into error events and
    /// substitutes a fallback output.
    fn run(&self, percept: &Percept, ctx: &mut AgentContext<'_>) -> Result<AgentOutput, AgentError>;
}

/// Registry of available agents, keyed by id.
#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Box<dyn Agent>>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.ids())
            .finish()
    }
}

impl AgentRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The four standard agents.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(agents::MathAgent));
        registry.register(Box::new(agents::ProfileAgent));
        registry.register(Box::new(agents::KnowledgeAgent));
        registry.register(Box::new(agents::GenericAgent));
        registry
    }

    /// Add an agent under its own id, replacing any previous holder.
    pub fn register(&mut self, agent: Box<dyn Agent>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Look up an agent by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&dyn Agent> {
        self.agents.get(id).map(Box::as_ref)
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }
}
