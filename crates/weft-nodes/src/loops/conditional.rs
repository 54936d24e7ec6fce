use serde::{Deserialize, Serialize};
use serde_json::Value;

use weft_core::error::{Result, WeftError};
use weft_core::traits::ConfigurableNode;

use super::base::{LoopConfig, LoopNode, LoopState, StoppingCondition};
use crate::condition::{evaluate_branch, Condition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionalLoopConfig {
    #[serde(flatten)]
    pub base: LoopConfig,
    /// Exit test applied to each iteration's output record.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    10
}

/// Stop when the latest output satisfies `conditions`, or after
/// `max_iterations` bodies. At least one body always runs.
#[derive(Debug, Clone)]
pub struct UntilCondition {
    pub conditions: Vec<Condition>,
    pub max_iterations: usize,
}

impl StoppingCondition for UntilCondition {
    fn should_stop(&self, state: &LoopState<'_>) -> bool {
        if state.iteration_count >= self.max_iterations {
            return true;
        }
        if state.iteration_count == 0 {
            return false;
        }
        state
            .last_output
            .map(|out| evaluate_branch(&Value::Object(out.clone()), &self.conditions))
            .unwrap_or(false)
    }
}

pub type ConditionalLoopNode = LoopNode<UntilCondition>;

impl ConfigurableNode for LoopNode<UntilCondition> {
    const NODE_TYPE: &'static str = "ConditionalLoopNode";
    type Config = ConditionalLoopConfig;

    fn configure(config: ConditionalLoopConfig) -> Result<Self> {
        if config.max_iterations == 0 {
            return Err(WeftError::Config(
                "ConditionalLoopNode needs max_iterations >= 1".to_string(),
            ));
        }
        let dumped = serde_json::to_value(&config)?;
        let stop = UntilCondition {
            conditions: config.conditions,
            max_iterations: config.max_iterations,
        };
        LoopNode::build("conditional_loop_node", config.base, stop, dumped)
    }
}
