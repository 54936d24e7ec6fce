use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WeftError};
use crate::event::{EventBus, WorkflowEvent};
use crate::traits::GraphRunner;

/// Unique identifier of one top-level workflow run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context passed to nodes during execution.
#[derive(Clone)]
pub struct NodeContext {
    pub run_id: RunId,
    /// Id of the node being executed.
    pub node_id: String,
    /// Sub-graph nesting level; 0 for the top-level workflow.
    pub depth: usize,
    pub runner: Option<Arc<dyn GraphRunner>>,
    pub events: Option<Arc<EventBus>>,
}

impl NodeContext {
    /// A context with no engine attached, for invoking a node on its own.
    pub fn detached(node_id: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            node_id: node_id.into(),
            depth: 0,
            runner: None,
            events: None,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn GraphRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// The engine to re-enter for sub-graph execution.
    pub fn runner(&self) -> Result<Arc<dyn GraphRunner>> {
        self.runner.clone().ok_or_else(|| WeftError::NodeExecution {
            node: self.node_id.clone(),
            message: "no graph runner attached to node context".to_string(),
        })
    }

    /// Publish an event if a bus is attached.
    pub fn publish(&self, event: WorkflowEvent) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }
}

impl std::fmt::Debug for NodeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContext")
            .field("run_id", &self.run_id)
            .field("node_id", &self.node_id)
            .field("depth", &self.depth)
            .field("runner", &self.runner.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_context_has_no_runner() {
        let ctx = NodeContext::detached("loop");
        let err = ctx.runner().err().unwrap();
        assert!(err.to_string().contains("no graph runner"));
        assert_eq!(ctx.depth, 0);
    }

    #[test]
    fn test_run_ids_unique() {
        assert_ne!(RunId::new(), RunId::new());
        assert_eq!(RunId::from_str("r1").to_string(), "r1");
    }
}
