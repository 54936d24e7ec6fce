use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::schema::{build_schema, Record, RecordType};
use weft_core::traits::{ConfigurableNode, Node, PartialRun};
use weft_core::types::NodeContext;
use weft_core::workflow::WorkflowDefinition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubworkflowConfig {
    pub workflow: WorkflowDefinition,
}

/// Runs a nested workflow as a single node.
///
/// The node's input and output types are the nested InputNode and
/// OutputNode schemas.
pub struct SubworkflowNode {
    config: SubworkflowConfig,
    input_id: String,
    output_id: String,
    input: RecordType,
    output: RecordType,
}

impl Node for SubworkflowNode {
    fn name(&self) -> &str {
        "subworkflow_node"
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
            let runner = ctx.runner()?;
            let request = PartialRun::new(&self.output_id)
                .rerun_predecessors(true)
                .seed(&self.input_id, input);
            debug!(
                node = %ctx.node_id,
                nodes = self.config.workflow.nodes.len(),
                "Running subworkflow"
            );

            let mut outputs = runner
                .run_partial(&self.config.workflow, request, &ctx)
                .await?;
            outputs
                .remove(&self.output_id)
                .ok_or_else(|| WeftError::MissingOutput(self.output_id.clone()))
        })
    }
}

impl ConfigurableNode for SubworkflowNode {
    const NODE_TYPE: &'static str = "SubworkflowNode";
    type Config = SubworkflowConfig;

    fn configure(config: SubworkflowConfig) -> Result<Self> {
        config.workflow.validate()?;
        let (input_node, output_node) = match (
            config.workflow.input_node(),
            config.workflow.output_node(),
        ) {
            (Some(i), Some(o)) => (i, o),
            _ => {
                return Err(WeftError::InvalidWorkflow(
                    "subworkflow needs an InputNode and an OutputNode".to_string(),
                ))
            }
        };
        let input = build_schema(
            &input_node.config_schema("input_schema")?,
            "subworkflow_nodeInput",
        )?;
        let output = build_schema(
            &output_node.config_schema("output_schema")?,
            "subworkflow_nodeOutput",
        )?;
        Ok(Self {
            input_id: input_node.id.clone(),
            output_id: output_node.id.clone(),
            config,
            input,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::schema::{RecordSchema, TypeTag};
    use weft_core::workflow::{WorkflowLink, WorkflowNode};

    fn nested() -> WorkflowDefinition {
        let schema = RecordSchema::new().with("text", TypeTag::STR);
        WorkflowDefinition::new(
            vec![
                WorkflowNode::input("in", &schema),
                WorkflowNode::output("out", &schema),
            ],
            vec![WorkflowLink::same_key("in", "out", "text")],
        )
    }

    #[test]
    fn test_types_follow_nested_markers() {
        let node = SubworkflowNode::configure(SubworkflowConfig { workflow: nested() }).unwrap();
        assert!(node.input_type().has_field("text"));
        assert!(node.output_type().has_field("text"));
    }

    #[test]
    fn test_missing_markers_rejected() {
        let mut workflow = nested();
        workflow.nodes.retain(|n| !n.is_output());
        workflow.links.clear();
        let err = SubworkflowNode::configure(SubworkflowConfig { workflow })
            .err()
            .unwrap();
        assert!(matches!(err, WeftError::InvalidWorkflow(_)));
    }

    #[tokio::test]
    async fn test_run_without_runner_fails() {
        let node = SubworkflowNode::configure(SubworkflowConfig { workflow: nested() }).unwrap();
        let mut input = Record::new();
        input.insert("text".into(), Value::from("a"));
        let err = node
            .run(input, NodeContext::detached("sub"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::NodeExecution { .. }));
    }
}
