use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::schema::{Record, RecordType, TypeTag};
use weft_core::traits::{ConfigurableNode, Node};
use weft_core::types::NodeContext;

use crate::condition::{select_branch, BranchCondition};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfElseConfig {
    /// Routing branches; the first is the default.
    pub branches: Vec<BranchCondition>,
}

/// Routes its input to exactly one of `branch1..branchN`.
///
/// The output record carries only the selected branch's key, so nodes linked
/// from the other branches see a missing value and are skipped.
pub struct IfElseNode {
    config: IfElseConfig,
    input: RecordType,
    output: RecordType,
}

impl IfElseNode {
    pub fn branch_count(&self) -> usize {
        self.config.branches.len()
    }
}

impl Node for IfElseNode {
    fn name(&self) -> &str {
        "if_else_node"
    }

    fn config(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn input_type(&self) -> &RecordType {
        &self.input
    }

    fn output_type(&self) -> &RecordType {
        &self.output
    }

    fn run(&self, input: Record, ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move {
            let value = input.get("input").cloned().unwrap_or(Value::Null);
            let branch = select_branch(&self.config.branches, &value);
            debug!(node = %ctx.node_id, branch, "Routed input");

            let mut out = Record::new();
            out.insert(format!("branch{}", branch), value);
            Ok(out)
        })
    }
}

impl ConfigurableNode for IfElseNode {
    const NODE_TYPE: &'static str = "IfElseNode";
    type Config = IfElseConfig;

    fn configure(config: IfElseConfig) -> Result<Self> {
        if config.branches.is_empty() {
            return Err(WeftError::Config(
                "IfElseNode needs at least one branch".to_string(),
            ));
        }
        let input = RecordType::new("if_else_nodeInput").field("input", TypeTag::Any);
        let output = (1..=config.branches.len()).fold(
            RecordType::new("if_else_nodeOutput"),
            |record, i| record.optional_field(format!("branch{}", i), TypeTag::Any),
        );
        Ok(Self {
            config,
            input,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{ComparisonOperator, Condition};
    use crate::contract::NodeInstance;
    use serde_json::json;
    use std::sync::Arc;

    fn node(branches: Vec<BranchCondition>) -> NodeInstance {
        let node = IfElseNode::configure(IfElseConfig { branches }).unwrap();
        NodeInstance::new("route", "IfElseNode", Arc::new(node))
    }

    fn x_over_five() -> Vec<BranchCondition> {
        vec![
            BranchCondition::default(),
            BranchCondition::new(vec![Condition::new(
                "x",
                ComparisonOperator::GreaterThan,
                json!(5),
            )]),
        ]
    }

    #[tokio::test]
    async fn test_routes_to_branch2_when_x_is_7() {
        let out = node(x_over_five())
            .invoke(json!({"input": {"x": 7}}), NodeContext::detached("route"))
            .await
            .unwrap();
        assert_eq!(Value::Object(out), json!({"branch2": {"x": 7}}));
    }

    #[tokio::test]
    async fn test_routes_to_branch1_when_x_is_3() {
        let out = node(x_over_five())
            .invoke(json!({"input": {"x": 3}}), NodeContext::detached("route"))
            .await
            .unwrap();
        assert_eq!(Value::Object(out), json!({"branch1": {"x": 3}}));
    }

    #[tokio::test]
    async fn test_malformed_input_falls_back_to_default() {
        let out = node(x_over_five())
            .invoke(json!({"input": "just text"}), NodeContext::detached("route"))
            .await
            .unwrap();
        assert!(out.contains_key("branch1"));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_empty_branches_rejected() {
        let err = IfElseNode::configure(IfElseConfig { branches: vec![] })
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_output_type_has_one_field_per_branch() {
        let node = IfElseNode::configure(IfElseConfig {
            branches: x_over_five(),
        })
        .unwrap();
        let names: Vec<&str> = node.output_type().field_names().collect();
        assert_eq!(names, vec!["branch1", "branch2"]);
        assert!(node.output_type().fields().iter().all(|f| !f.required));
        assert_eq!(node.branch_count(), 2);
    }
}
