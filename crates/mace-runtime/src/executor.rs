// SPDX-License-Identifier: MIT OR Apache-2.0
//! The request executor.
//!
//! `execute` runs exactly one request to completion, synchronously. It owns
//! every piece of per-request mutable state — the deterministic context, the
//! memory capture, the error list — so no two requests can interfere through
//! shared globals.

use crate::{Agent, AgentContext, AgentError, AgentRegistry, ApproveAllCouncil, Council};
use mace_canon::sha256_hex;
use mace_determinism::{DeterminismContext, Mode};
use mace_governance::{InertKillSwitch, KillSwitch};
use mace_log::{LogError, LogWriter};
use mace_sem::SemanticMemory;
use mace_structures::{
    AgentOutput, ArtifactStore, ErrorEvent, ErrorOrigin, EvidenceObject, FinalOutput,
    LogEntryParts, Percept, ReflectiveLogEntry, Severity, StructureError,
};
use mace_telemetry::{CounterSet, counters};

/// Seed the chain starts from when a process has never executed before.
const GENESIS_SEED: &str = "genesis_seed";

const FALLBACK_TEXT: &str = "One of my internal modules failed.";

/// Errors that fail an entire `execute` call.
///
/// Agent failures are not here on purpose: they are captured inside the log
/// as error events and never cross the request boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The governance kill switch is engaged; no log is written.
    #[error("KILL_SWITCH_ACTIVE: {reason} (activated by {activated_by})")]
    KillSwitchActive {
        /// Why the switch was engaged.
        reason: String,
        /// Who engaged it.
        activated_by: String,
    },

    /// A structure constructor failed (unseeded context).
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// The reflective log could not be persisted.
    #[error(transparent)]
    Log(#[from] LogError),
}

impl ExecutorError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::KillSwitchActive { .. } => "KILL_SWITCH_ACTIVE",
            Self::Structure(_) => "STRUCTURE_FAILED",
            Self::Log(_) => "LOG_WRITE_FAILED",
        }
    }
}

/// Executes requests against one semantic memory.
pub struct Executor {
    det: DeterminismContext,
    sem: SemanticMemory,
    artifacts: ArtifactStore,
    agents: AgentRegistry,
    council: Box<dyn Council>,
    kill_switch: Box<dyn KillSwitch>,
    writer: Option<LogWriter>,
    telemetry: CounterSet,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("sandbox", &self.sem.is_sandbox())
            .field("logging", &self.writer.is_some())
            .finish()
    }
}

impl Executor {
    /// Assemble an executor with the standard agents, the stub council, and
    /// an inert kill switch. Attach collaborators with the `with_*` methods.
    #[must_use]
    pub fn new(sem: SemanticMemory, artifacts: ArtifactStore) -> Self {
        Self {
            det: DeterminismContext::new(),
            sem,
            artifacts,
            agents: AgentRegistry::standard(),
            council: Box::new(ApproveAllCouncil),
            kill_switch: Box::new(InertKillSwitch),
            writer: None,
            telemetry: CounterSet::new(),
        }
    }

    /// Persist reflective logs through `writer`.
    #[must_use]
    pub fn with_writer(mut self, writer: LogWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Replace the agent registry.
    #[must_use]
    pub fn with_agents(mut self, agents: AgentRegistry) -> Self {
        self.agents = agents;
        self
    }

    /// Replace the council.
    #[must_use]
    pub fn with_council(mut self, council: Box<dyn Council>) -> Self {
        self.council = council;
        self
    }

    /// Replace the kill switch.
    #[must_use]
    pub fn with_kill_switch(mut self, kill_switch: Box<dyn KillSwitch>) -> Self {
        self.kill_switch = kill_switch;
        self
    }

    /// Share a telemetry counter set.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: CounterSet) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// The seed of the most recent request, if any ran.
    #[must_use]
    pub fn seed(&self) -> Option<&str> {
        self.det.seed()
    }

    /// The semantic memory this executor runs against.
    #[must_use]
    pub fn sem(&self) -> &SemanticMemory {
        &self.sem
    }

    /// Execute one request to completion.
    ///
    /// A caller-supplied `seed` pins the whole deterministic state (the
    /// replay path); otherwise the next seed is chained from the current
    /// one and the input. Both paths reset every counter, which is what
    /// makes the recorded log reproducible.
    ///
    /// # Errors
    ///
    /// [`ExecutorError::KillSwitchActive`] when governance has halted
    /// execution, or a structure/log failure. Agent failures do not error;
    /// they are recorded in the returned log entry.
    pub fn execute(
        &mut self,
        text: &str,
        intent: &str,
        seed: Option<&str>,
        log_enabled: bool,
    ) -> Result<(FinalOutput, ReflectiveLogEntry), ExecutorError> {
        if self.kill_switch.is_active() {
            let status = self.kill_switch.status();
            return Err(ExecutorError::KillSwitchActive {
                reason: status.reason.unwrap_or_else(|| "UNKNOWN".to_string()),
                activated_by: status.activated_by.unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let next_seed = match seed {
            Some(supplied) => supplied.to_string(),
            None => {
                let current = self.det.seed().unwrap_or(GENESIS_SEED);
                sha256_hex(format!("{current}:{text}:{intent}").as_bytes())
            }
        };
        self.det.init_seed(next_seed.as_str());
        self.det.set_mode(Mode::Deterministic);
        tracing::debug!(seed = %next_seed, text, "request started");

        let percept = Percept::build(&mut self.det, text, intent)?;
        let decision = mace_router::route(&mut self.det, &percept)?;
        let primary = decision
            .selected_agents
            .first()
            .map(|a| a.agent_id.clone())
            .unwrap_or_else(|| "generic_agent".to_string());

        self.sem.start_capture();
        self.telemetry.increment(counters::AGENT_EXECUTIONS);

        let agent: Option<&dyn Agent> = self
            .agents
            .get(&primary)
            .or_else(|| self.agents.get("generic_agent"));
        let result = match agent {
            Some(agent) => {
                let mut ctx = AgentContext {
                    sem: &mut self.sem,
                    det: &mut self.det,
                };
                agent.run(&percept, &mut ctx)
            }
            None => Err(AgentError::Failed(format!(
                "no agent registered for '{primary}'"
            ))),
        };

        let mut errors: Vec<ErrorEvent> = Vec::new();
        let mut agent_outputs: Vec<AgentOutput> = Vec::new();
        match result {
            Ok(output) => agent_outputs.push(output),
            Err(err) => {
                let (detail, severity) = classify_agent_error(&err);
                let event = ErrorEvent::build(
                    &mut self.det,
                    &percept.percept_id,
                    &format!("Agent {primary} failed: {detail}"),
                    ErrorOrigin {
                        module_id: "executor".to_string(),
                        agent_id: primary.clone(),
                        module_version: "1.0.0".to_string(),
                    },
                    severity,
                )?;
                tracing::warn!(agent = %primary, error = %err, "agent failed; substituting fallback");
                errors.push(event);
                agent_outputs.push(AgentOutput::new(
                    "generic_agent",
                    FALLBACK_TEXT,
                    0.0,
                    "Fallback triggered.",
                ));
            }
        }

        let capture = self.sem.stop_capture().unwrap_or_default();

        let mut evidence_items: Vec<EvidenceObject> = Vec::new();
        for (key, read) in capture.reads() {
            if !read.exists {
                continue;
            }
            if let Some(value) = &read.value {
                evidence_items.push(EvidenceObject::sem_read_snapshot(
                    &mut self.det,
                    &self.artifacts,
                    key,
                    value,
                )?);
            }
        }

        let mut council_votes = Vec::with_capacity(agent_outputs.len());
        for output in &agent_outputs {
            council_votes.push(self.council.evaluate(&mut self.det, output)?);
        }

        let final_output = select_final_output(&agent_outputs);

        let mut entry = ReflectiveLogEntry::build(
            &mut self.det,
            LogEntryParts {
                percept,
                router_decision: decision,
                agent_outputs,
                council_votes,
                evidence_items,
                memory_reads: capture.read_keys(),
                memory_writes: capture.writes().to_vec(),
                final_output: final_output.clone(),
                errors,
            },
        )?;

        if log_enabled {
            if let Some(writer) = &self.writer {
                writer.write(&mut entry)?;
                self.telemetry.increment(counters::LOGS_WRITTEN);
            }
        }

        tracing::debug!(log_id = %entry.log_id, "request completed");
        Ok((final_output, entry))
    }
}

fn classify_agent_error(err: &AgentError) -> (String, Severity) {
    match err {
        AgentError::Timeout(_) => ("AGENT_TIMEOUT".to_string(), Severity::Warning),
        AgentError::Failed(message) if message.contains("TIMEOUT") => {
            ("AGENT_TIMEOUT".to_string(), Severity::Warning)
        }
        AgentError::Failed(message) => (message.clone(), Severity::Error),
    }
}

/// Pick the winning output: ascending agent id, then stably by descending
/// confidence, head wins.
fn select_final_output(outputs: &[AgentOutput]) -> FinalOutput {
    let mut ranked: Vec<&AgentOutput> = outputs.iter().collect();
    ranked.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    match ranked.first() {
        Some(best) => FinalOutput {
            text: best.text.clone(),
            confidence: best.confidence,
            speculative: false,
        },
        None => FinalOutput {
            text: "No agents produced output.".to_string(),
            confidence: 0.0,
            speculative: false,
        },
    }
}
