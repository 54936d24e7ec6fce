use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use weft_core::error::Result;
use weft_core::schema::{Record, RecordType, TypeTag};
use weft_core::traits::{ConfigurableNode, Node};
use weft_core::types::NodeContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionalConfig {}

/// Maps a boolean to the path label `"true"` or `"false"`.
pub struct ConditionalNode {
    input: RecordType,
    output: RecordType,
}

impl Node for ConditionalNode {
    fn name(&self) -> &str {
        "ConditionalNode"
    }

    fn config(&self) -> Value {
        json!({})
    }

    fn input_type(&self) -> &RecordType {
        &self.input
    }

    fn output_type(&self) -> &RecordType {
        &self.output
    }

    fn run(&self, input: Record, _ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move {
            let taken = input
                .get("condition_value")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let mut out = Record::new();
            out.insert("path".into(), json!(if taken { "true" } else { "false" }));
            Ok(out)
        })
    }
}

impl ConfigurableNode for ConditionalNode {
    const NODE_TYPE: &'static str = "ConditionalNode";
    type Config = ConditionalConfig;

    fn configure(_config: ConditionalConfig) -> Result<Self> {
        Ok(Self {
            input: RecordType::new("ConditionalNodeInput").field("condition_value", TypeTag::BOOL),
            output: RecordType::new("ConditionalNodeOutput").field("path", TypeTag::STR),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::NodeInstance;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_paths() {
        let node = NodeInstance::new(
            "c",
            "ConditionalNode",
            Arc::new(ConditionalNode::configure(ConditionalConfig::default()).unwrap()),
        );
        let yes = node
            .invoke(json!({"condition_value": true}), NodeContext::detached("c"))
            .await
            .unwrap();
        let no = node
            .invoke(json!({"condition_value": false}), NodeContext::detached("c"))
            .await
            .unwrap();
        assert_eq!(yes["path"], json!("true"));
        assert_eq!(no["path"], json!("false"));
    }

    #[tokio::test]
    async fn test_non_bool_rejected() {
        let node = NodeInstance::new(
            "c",
            "ConditionalNode",
            Arc::new(ConditionalNode::configure(ConditionalConfig::default()).unwrap()),
        );
        let err = node
            .invoke(json!({"condition_value": "yes"}), NodeContext::detached("c"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("condition_value"));
    }
}
