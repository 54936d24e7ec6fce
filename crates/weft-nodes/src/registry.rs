use std::collections::HashMap;
use std::sync::Arc;

use weft_core::error::{Result, WeftError};
use weft_core::traits::{ConfigurableNode, Node};
use weft_core::workflow::WorkflowNode;

use crate::contract::NodeInstance;

type NodeFactory = Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Node>> + Send + Sync>;

/// Registry of constructible node kinds, keyed by `node_type`.
#[derive(Clone)]
pub struct NodeRegistry {
    factories: HashMap<String, NodeFactory>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a node kind under its `NODE_TYPE`.
    pub fn register<N: ConfigurableNode>(&mut self) {
        self.register_factory(N::NODE_TYPE, |config| {
            let parsed: N::Config = serde_json::from_value(config.clone()).map_err(|e| {
                WeftError::Config(format!("invalid config for {}: {}", N::NODE_TYPE, e))
            })?;
            Ok(Arc::new(N::configure(parsed)?) as Arc<dyn Node>)
        });
    }

    /// Register a custom constructor under an arbitrary `node_type`.
    pub fn register_factory<F>(&mut self, node_type: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Node>> + Send + Sync + 'static,
    {
        self.factories.insert(node_type.into(), Arc::new(factory));
    }

    /// Unregister a node kind.
    pub fn unregister(&mut self, node_type: &str) -> bool {
        self.factories.remove(node_type).is_some()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.factories.contains_key(node_type)
    }

    /// List all registered node types, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        types.sort_unstable();
        types
    }

    /// Construct the node for a workflow entry. Runs the kind's setup once.
    pub fn create(&self, node: &WorkflowNode) -> Result<NodeInstance> {
        let factory = self
            .factories
            .get(&node.node_type)
            .ok_or_else(|| WeftError::UnknownNodeType(node.node_type.clone()))?;
        let built = factory(&node.config)?;
        Ok(NodeInstance::new(&node.id, &node.node_type, built))
    }

    /// Create a registry with all built-in node kinds registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        // ── Structural markers ──────────────────────────────────
        registry.register::<crate::builtin::io::InputNode>();
        registry.register::<crate::builtin::io::OutputNode>();

        // ── Routing ─────────────────────────────────────────────
        registry.register::<crate::builtin::if_else::IfElseNode>();
        registry.register::<crate::builtin::conditional::ConditionalNode>();

        // ── Composition ─────────────────────────────────────────
        registry.register::<crate::loops::FixedIterationLoopNode>();
        registry.register::<crate::loops::ConditionalLoopNode>();
        registry.register::<crate::builtin::subworkflow::SubworkflowNode>();

        registry
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            registry.list(),
            vec![
                "ConditionalLoopNode",
                "ConditionalNode",
                "FixedIterationLoopNode",
                "IfElseNode",
                "InputNode",
                "OutputNode",
                "SubworkflowNode",
            ]
        );
    }

    #[test]
    fn test_create_input_node() {
        let registry = NodeRegistry::with_builtins();
        let node = WorkflowNode::new("in", "InputNode", json!({"input_schema": {"text": "str"}}));
        let instance = registry.create(&node).unwrap();
        assert_eq!(instance.id(), "in");
        assert!(instance.output_type().has_field("text"));
    }

    #[test]
    fn test_unknown_node_type() {
        let registry = NodeRegistry::with_builtins();
        let node = WorkflowNode::new("x", "TeleportNode", json!({}));
        let err = registry.create(&node).unwrap_err();
        assert!(matches!(err, WeftError::UnknownNodeType(ref t) if t == "TeleportNode"));
    }

    #[test]
    fn test_unknown_type_tag_is_configuration_error() {
        let registry = NodeRegistry::with_builtins();
        let node = WorkflowNode::new(
            "in",
            "InputNode",
            json!({"input_schema": {"text": "string"}}),
        );
        let err = registry.create(&node).unwrap_err();
        assert!(matches!(err, WeftError::UnknownTypeTag(ref t) if t == "string"));
    }

    #[test]
    fn test_malformed_config() {
        let registry = NodeRegistry::with_builtins();
        let node = WorkflowNode::new("if", "IfElseNode", json!({"branches": "nope"}));
        let err = registry.create(&node).unwrap_err();
        assert!(matches!(err, WeftError::Config(_)));
    }

    #[test]
    fn test_unregister() {
        let mut registry = NodeRegistry::with_builtins();
        assert!(registry.unregister("ConditionalNode"));
        assert!(!registry.contains("ConditionalNode"));
        assert!(!registry.unregister("ConditionalNode"));
    }
}
