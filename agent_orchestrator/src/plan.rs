//! Plan representation: an ordered step sequence with declared context keys.

use serde::{Deserialize, Serialize};

/// One unit of work: which agent to call, which context key feeds it, and
/// which context key receives its output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationStep {
    pub agent_id: String,
    pub input_key: String,
    pub output_key: String,
}

impl OrchestrationStep {
    pub fn new(
        agent_id: impl Into<String>,
        input_key: impl Into<String>,
        output_key: impl Into<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            input_key: input_key.into(),
            output_key: output_key.into(),
        }
    }
}

/// An ordered sequence of steps. The input/output keys are expected to form
/// a data-flow chain reachable from the seed key `input`; [`crate::Planner::validate_plan`]
/// checks this before execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationPlan {
    pub steps: Vec<OrchestrationStep>,
}

impl OrchestrationPlan {
    pub fn new(steps: Vec<OrchestrationStep>) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
