use serde::{Deserialize, Serialize};

use weft_core::error::{Result, WeftError};
use weft_core::traits::ConfigurableNode;

use super::base::{LoopConfig, LoopNode, LoopState, StoppingCondition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedIterationConfig {
    #[serde(flatten)]
    pub base: LoopConfig,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
}

fn default_iterations() -> usize {
    5
}

/// Stop once `iterations` bodies have run.
#[derive(Debug, Clone, Copy)]
pub struct FixedIterations(pub usize);

impl StoppingCondition for FixedIterations {
    fn should_stop(&self, state: &LoopState<'_>) -> bool {
        state.iteration_count >= self.0
    }
}

pub type FixedIterationLoopNode = LoopNode<FixedIterations>;

impl ConfigurableNode for LoopNode<FixedIterations> {
    const NODE_TYPE: &'static str = "FixedIterationLoopNode";
    type Config = FixedIterationConfig;

    fn configure(config: FixedIterationConfig) -> Result<Self> {
        if config.iterations == 0 {
            return Err(WeftError::Config(
                "FixedIterationLoopNode needs iterations >= 1".to_string(),
            ));
        }
        let dumped = serde_json::to_value(&config)?;
        LoopNode::build(
            "fixed_n_loop_node",
            config.base,
            FixedIterations(config.iterations),
            dumped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::traits::Node;

    fn config(iterations: serde_json::Value) -> serde_json::Value {
        json!({
            "input_schema": {"text": "str"},
            "output_schema": {"text": "str"},
            "iterations": iterations,
            "subworkflow": {
                "nodes": [
                    {"id": "in", "node_type": "InputNode", "config": {"input_schema": {"text": "str"}}},
                    {"id": "out", "node_type": "OutputNode", "config": {"output_schema": {"text": "str"}}}
                ],
                "links": [
                    {"source_id": "in", "source_output_key": "text", "target_id": "out", "target_input_key": "text"}
                ]
            }
        })
    }

    #[test]
    fn test_configure_from_json() {
        let parsed: FixedIterationConfig = serde_json::from_value(config(json!(3))).unwrap();
        let node = FixedIterationLoopNode::configure(parsed).unwrap();
        assert_eq!(node.name(), "fixed_n_loop_node");
        assert_eq!(node.stopping_condition().0, 3);
        assert_eq!(node.config()["iterations"], json!(3));
        assert!(node.input_type().has_field("text"));
        assert_eq!(node.input_type().name(), "fixed_n_loop_nodeInput");
    }

    #[test]
    fn test_iterations_default() {
        let mut raw = config(json!(1));
        raw.as_object_mut().unwrap().remove("iterations");
        let parsed: FixedIterationConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.iterations, 5);
        assert!(parsed.base.rerun_predecessors);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let parsed: FixedIterationConfig = serde_json::from_value(config(json!(0))).unwrap();
        let err = FixedIterationLoopNode::configure(parsed).err().unwrap();
        assert!(matches!(err, WeftError::Config(_)));
    }

    #[test]
    fn test_stops_at_count() {
        let stop = FixedIterations(2);
        let state = |n| LoopState { iteration_count: n, last_output: None };
        assert!(!stop.should_stop(&state(0)));
        assert!(!stop.should_stop(&state(1)));
        assert!(stop.should_stop(&state(2)));
    }
}
