//! The validating envelope every node invocation goes through.

use std::future::Future;
use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde_json::Value;

use weft_core::error::{Result, WeftError};
use weft_core::schema::{Record, RecordType};
use weft_core::traits::Node;
use weft_core::types::NodeContext;

/// A configured node placed under an id.
///
/// [`invoke`](Self::invoke) is the only entry point: it validates the input
/// against the node's input type, runs the node, and validates the result
/// against its output type. Node kinds cannot override it.
#[derive(Clone)]
pub struct NodeInstance {
    id: String,
    node_type: String,
    node: Arc<dyn Node>,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, node: Arc<dyn Node>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            node,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn input_type(&self) -> &RecordType {
        self.node.input_type()
    }

    pub fn output_type(&self) -> &RecordType {
        self.node.output_type()
    }

    pub fn config(&self) -> Value {
        self.node.config()
    }

    /// Validate, run, validate.
    ///
    /// `input` may be a previous node's output record or a raw mapping;
    /// both are re-parsed against the input type.
    pub async fn invoke(&self, input: impl Into<Value>, ctx: NodeContext) -> Result<Record> {
        let input = self
            .node
            .input_type()
            .validate(&input.into())
            .map_err(|errors| WeftError::InputValidation {
                node: self.node.name().to_string(),
                errors,
            })?;

        let output = self.node.run(input, ctx).await?;

        self.node
            .output_type()
            .validate_record(&output)
            .map_err(|errors| WeftError::OutputValidation {
                node: self.node.name().to_string(),
                errors,
            })
    }
}

impl std::fmt::Debug for NodeInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeInstance")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("name", &self.node.name())
            .finish()
    }
}

/// Run `task` over every item with at most `limit` in flight.
///
/// Results keep launch order. The first failure is returned and the
/// remaining in-flight tasks are dropped.
pub async fn fan_out<T, R, F, Fut>(items: Vec<T>, limit: usize, task: F) -> Result<Vec<R>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    futures::stream::iter(items)
        .map(task)
        .buffered(limit.max(1))
        .try_collect()
        .await
}
