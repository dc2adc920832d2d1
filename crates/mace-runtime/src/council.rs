// SPDX-License-Identifier: MIT OR Apache-2.0
//! Council evaluation of agent outputs.

use mace_determinism::DeterminismContext;
use mace_structures::{AgentOutput, CouncilVote, StructureError};

/// Evaluates one agent output into a vote.
///
/// Implementations must be deterministic in their input: the vote for a
/// given `(agent_id, output_text)` pair may depend on nothing else, or
/// replay verification will flag the run.
pub trait Council {
    /// Produce a vote for `output`.
    ///
    /// # Errors
    ///
    /// Propagates determinism failures from an unseeded context.
    fn evaluate(
        &self,
        det: &mut DeterminismContext,
        output: &AgentOutput,
    ) -> Result<CouncilVote, StructureError>;
}

/// The stub council: unit scores, always approves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAllCouncil;

impl Council for ApproveAllCouncil {
    fn evaluate(
        &self,
        det: &mut DeterminismContext,
        output: &AgentOutput,
    ) -> Result<CouncilVote, StructureError> {
        CouncilVote::build(det, &output.agent_id, &output.text, true, "stub_approval")
    }
}
