use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;

use weft_core::error::Result;
use weft_core::schema::{build_schema, Record, RecordSchema, RecordType};
use weft_core::traits::{ConfigurableNode, Node};
use weft_core::types::NodeContext;
use weft_core::workflow::{INPUT_NODE, OUTPUT_NODE};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputNodeConfig {
    pub input_schema: RecordSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputNodeConfig {
    pub output_schema: RecordSchema,
}

/// Entry marker of a workflow graph. Passes its record through unchanged.
pub struct InputNode {
    schema: RecordSchema,
    record: RecordType,
}

/// Exit marker of a workflow graph. Passes its record through unchanged.
pub struct OutputNode {
    schema: RecordSchema,
    record: RecordType,
}

impl Node for InputNode {
    fn name(&self) -> &str {
        "input_node"
    }

    fn config(&self) -> serde_json::Value {
        json!({ "input_schema": self.schema })
    }

    fn input_type(&self) -> &RecordType {
        &self.record
    }

    fn output_type(&self) -> &RecordType {
        &self.record
    }

    fn run(&self, input: Record, _ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move { Ok(input) })
    }
}

impl ConfigurableNode for InputNode {
    const NODE_TYPE: &'static str = INPUT_NODE;
    type Config = InputNodeConfig;

    fn configure(config: InputNodeConfig) -> Result<Self> {
        let record = build_schema(&config.input_schema, "input_nodeRecord")?;
        Ok(Self {
            schema: config.input_schema,
            record,
        })
    }
}

impl Node for OutputNode {
    fn name(&self) -> &str {
        "output_node"
    }

    fn config(&self) -> serde_json::Value {
        json!({ "output_schema": self.schema })
    }

    fn input_type(&self) -> &RecordType {
        &self.record
    }

    fn output_type(&self) -> &RecordType {
        &self.record
    }

    fn run(&self, input: Record, _ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move { Ok(input) })
    }
}

impl ConfigurableNode for OutputNode {
    const NODE_TYPE: &'static str = OUTPUT_NODE;
    type Config = OutputNodeConfig;

    fn configure(config: OutputNodeConfig) -> Result<Self> {
        let record = build_schema(&config.output_schema, "output_nodeRecord")?;
        Ok(Self {
            schema: config.output_schema,
            record,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::NodeInstance;
    use std::sync::Arc;
    use weft_core::schema::TypeTag;
    use weft_core::WeftError;

    #[tokio::test]
    async fn test_input_node_is_identity_over_schema() {
        let node = InputNode::configure(InputNodeConfig {
            input_schema: RecordSchema::new()
                .with("text", TypeTag::STR)
                .with("n", TypeTag::INT),
        })
        .unwrap();
        let instance = NodeInstance::new("in", INPUT_NODE, Arc::new(node));
        let out = instance
            .invoke(json!({"text": "a", "n": 2, "extra": 1}), NodeContext::detached("in"))
            .await
            .unwrap();
        assert_eq!(serde_json::Value::Object(out), json!({"text": "a", "n": 2}));
    }

    #[tokio::test]
    async fn test_output_node_rejects_nonconforming() {
        let node = OutputNode::configure(OutputNodeConfig {
            output_schema: RecordSchema::new().with("text", TypeTag::STR),
        })
        .unwrap();
        let instance = NodeInstance::new("out", OUTPUT_NODE, Arc::new(node));
        let err = instance
            .invoke(json!({"text": 3}), NodeContext::detached("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::InputValidation { .. }));
    }

    #[test]
    fn test_config_dump() {
        let node = OutputNode::configure(OutputNodeConfig {
            output_schema: RecordSchema::new().with("score", TypeTag::FLOAT),
        })
        .unwrap();
        assert_eq!(node.config(), json!({"output_schema": {"score": "float"}}));
    }
}
