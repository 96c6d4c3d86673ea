//! Rule-based planner: turns a free-text task into an agent plan.
//!
//! Decomposition and matching are deliberately mechanical string operations
//! (punctuation splitting, substring scoring) so planning stays reproducible.

use crate::plan::{OrchestrationPlan, OrchestrationStep};
use crate::registry::AgentRegistry;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static SEGMENT_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,;.]|\band\b").expect("segment split pattern"));

const COMPLEXITY_KEYWORDS: [&str; 5] = ["aggregate", "verify", "validate", "cross", "multiple"];

pub struct Planner<'a> {
    registry: &'a AgentRegistry,
}

impl<'a> Planner<'a> {
    pub fn new(registry: &'a AgentRegistry) -> Self {
        Self { registry }
    }

    /// Decompose, match agents, then compact the resulting plan.
    pub fn generate_plan(&self, task: &str) -> OrchestrationPlan {
        let subtasks = self.decompose_task(task);
        let steps = self.match_agents_to_subtasks(&subtasks);
        self.optimize_plan(OrchestrationPlan::new(steps))
    }

    /// Lower-cases the task and splits on commas, semicolons, periods, and
    /// the word "and", trimming and dropping empty segments. A task with no
    /// usable segments becomes a single segment.
    pub fn decompose_task(&self, task: &str) -> Vec<String> {
        let task_lower = task.to_lowercase();
        let mut subtasks: Vec<String> = SEGMENT_SPLIT
            .split(&task_lower)
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();

        if subtasks.is_empty() {
            subtasks.push(task.to_string());
        }

        subtasks
    }

    /// Assigns each subtask to its best-scoring agent and chains the context
    /// keys so each step consumes its predecessor's output, seeded with
    /// `input` and ending at `final`. Subtasks no agent scores on are
    /// skipped.
    pub fn match_agents_to_subtasks(&self, subtasks: &[String]) -> Vec<OrchestrationStep> {
        let mut steps: Vec<OrchestrationStep> = Vec::new();

        for subtask in subtasks {
            let Some(agent_id) = self.find_best_agent(subtask) else {
                debug!(%subtask, "no agent scored on subtask, skipping");
                continue;
            };

            let position = steps.len();
            let input_key = if position == 0 {
                "input".to_string()
            } else {
                format!("step{position}")
            };
            steps.push(OrchestrationStep {
                agent_id,
                input_key,
                output_key: format!("step{}", position + 1),
            });
        }

        if let Some(last) = steps.last_mut() {
            last.output_key = "final".to_string();
        }

        steps
    }

    /// Scores every registered agent by how many of its capability tags
    /// appear as substrings of the lower-cased subtask; ties keep the
    /// earliest-registered agent.
    fn find_best_agent(&self, subtask: &str) -> Option<String> {
        let subtask_lower = subtask.to_lowercase();
        let mut best: Option<(String, usize)> = None;

        for agent in self.registry.list_agents() {
            let score = agent
                .manifest
                .tag_slice()
                .iter()
                .filter(|tag| subtask_lower.contains(&tag.to_lowercase()))
                .count();

            if score > 0 && best.as_ref().map_or(true, |(_, top)| score > *top) {
                best = Some((agent.id, score));
            }
        }

        best.map(|(id, _)| id)
    }

    /// Collapses each run of consecutive steps assigned to the same agent
    /// into one step (first input key, last output key), then re-derives the
    /// linear input chain.
    pub fn optimize_plan(&self, plan: OrchestrationPlan) -> OrchestrationPlan {
        let mut optimized: Vec<OrchestrationStep> = Vec::new();

        for step in plan.steps {
            match optimized.last_mut() {
                Some(previous) if previous.agent_id == step.agent_id => {
                    previous.output_key = step.output_key;
                }
                _ => optimized.push(step),
            }
        }

        for index in 1..optimized.len() {
            let upstream = optimized[index - 1].output_key.clone();
            optimized[index].input_key = upstream;
        }

        OrchestrationPlan::new(optimized)
    }

    /// A plan is valid iff it has at least one step, every referenced agent
    /// is registered, and a forward scan shows every input key available
    /// (seeded from `input`, growing by each step's output key).
    pub fn validate_plan(&self, plan: &OrchestrationPlan) -> bool {
        if plan.steps.is_empty() {
            return false;
        }

        for step in &plan.steps {
            if !self.registry.contains(&step.agent_id) {
                return false;
            }
        }

        let mut available: HashSet<&str> = HashSet::from(["input"]);
        for step in &plan.steps {
            if !available.contains(step.input_key.as_str()) {
                return false;
            }
            available.insert(step.output_key.as_str());
        }

        true
    }

    /// Subtask count plus 2 for each complexity keyword present in the task.
    pub fn estimate_complexity(&self, task: &str) -> usize {
        let task_lower = task.to_lowercase();
        let mut complexity = self.decompose_task(task).len();

        for keyword in COMPLEXITY_KEYWORDS {
            if task_lower.contains(keyword) {
                complexity += 2;
            }
        }

        complexity
    }
}
