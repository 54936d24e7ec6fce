//! Declarative workflow structure: nodes, field-keyed links, and the
//! Input/Output entry and exit markers.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};
use crate::schema::RecordSchema;

/// `node_type` of the structural entry marker.
pub const INPUT_NODE: &str = "InputNode";
/// `node_type` of the structural exit marker.
pub const OUTPUT_NODE: &str = "OutputNode";

/// A node placed in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    /// Unique identifier within the graph.
    pub id: String,
    /// Registered node kind, e.g. `IfElseNode`.
    pub node_type: String,
    /// Kind-specific configuration.
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl WorkflowNode {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            config,
        }
    }

    /// An InputNode declaring `schema` as the graph's input record.
    pub fn input(id: impl Into<String>, schema: &RecordSchema) -> Self {
        Self::new(id, INPUT_NODE, serde_json::json!({ "input_schema": schema }))
    }

    /// An OutputNode declaring `schema` as the graph's output record.
    pub fn output(id: impl Into<String>, schema: &RecordSchema) -> Self {
        Self::new(id, OUTPUT_NODE, serde_json::json!({ "output_schema": schema }))
    }

    pub fn is_input(&self) -> bool {
        self.node_type == INPUT_NODE
    }

    pub fn is_output(&self) -> bool {
        self.node_type == OUTPUT_NODE
    }

    /// Read a schema embedded in this node's config under `key`.
    pub fn config_schema(&self, key: &str) -> Result<RecordSchema> {
        let raw = self.config.get(key).cloned().ok_or_else(|| {
            WeftError::InvalidWorkflow(format!("node '{}' has no '{}' in its config", self.id, key))
        })?;
        serde_json::from_value(raw).map_err(|e| {
            WeftError::InvalidWorkflow(format!(
                "node '{}' has a malformed '{}': {}",
                self.id, key, e
            ))
        })
    }
}

/// A directed edge carrying one output field into one input field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowLink {
    pub source_id: String,
    pub source_output_key: String,
    pub target_id: String,
    pub target_input_key: String,
}

impl WorkflowLink {
    pub fn new(
        source_id: impl Into<String>,
        source_output_key: impl Into<String>,
        target_id: impl Into<String>,
        target_input_key: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source_output_key: source_output_key.into(),
            target_id: target_id.into(),
            target_input_key: target_input_key.into(),
        }
    }

    /// A link whose source and target keys share one field name.
    pub fn same_key(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        let key = key.into();
        Self::new(source_id, key.clone(), target_id, key)
    }
}

/// A graph of nodes and links with one InputNode and one OutputNode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub links: Vec<WorkflowLink>,
}

impl WorkflowDefinition {
    pub fn new(nodes: Vec<WorkflowNode>, links: Vec<WorkflowLink>) -> Self {
        Self { nodes, links }
    }

    /// The single InputNode, if present.
    pub fn input_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.is_input())
    }

    /// The single OutputNode, if present.
    pub fn output_node(&self) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.is_output())
    }

    pub fn links_into<'a>(
        &'a self,
        target_id: &'a str,
    ) -> impl Iterator<Item = &'a WorkflowLink> + 'a {
        self.links.iter().filter(move |l| l.target_id == target_id)
    }

    pub fn links_from<'a>(
        &'a self,
        source_id: &'a str,
    ) -> impl Iterator<Item = &'a WorkflowLink> + 'a {
        self.links.iter().filter(move |l| l.source_id == source_id)
    }

    /// Structural checks: unique ids, links between existing nodes, and
    /// exactly one InputNode and one OutputNode.
    ///
    /// Link keys are checked against node types by the engine, which knows
    /// each node's declared input and output records.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(WeftError::InvalidWorkflow(format!("duplicate node id '{}'", node.id)));
            }
        }

        for link in &self.links {
            for id in [&link.source_id, &link.target_id] {
                if !seen.contains(id.as_str()) {
                    return Err(WeftError::InvalidWorkflow(format!(
                        "link {}.{} -> {}.{} references unknown node '{}'",
                        link.source_id,
                        link.source_output_key,
                        link.target_id,
                        link.target_input_key,
                        id
                    )));
                }
            }
        }

        let inputs = self.nodes.iter().filter(|n| n.is_input()).count();
        let outputs = self.nodes.iter().filter(|n| n.is_output()).count();
        if inputs != 1 || outputs != 1 {
            return Err(WeftError::InvalidWorkflow(format!(
                "expected exactly one {} and one {}, found {} and {}",
                INPUT_NODE, OUTPUT_NODE, inputs, outputs
            )));
        }
        Ok(())
    }
}

/// A workflow usable as a loop body.
///
/// Beyond the [`WorkflowDefinition`] invariants, every field of the
/// InputNode's `input_schema` must also be a field of the OutputNode's
/// `output_schema`, so each iteration can feed the next.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LoopSubworkflowDefinition(WorkflowDefinition);

impl LoopSubworkflowDefinition {
    pub fn new(workflow: WorkflowDefinition) -> Result<Self> {
        workflow.validate()?;

        let input = workflow
            .input_node()
            .ok_or_else(|| WeftError::InvalidWorkflow(format!("loop body has no {}", INPUT_NODE)))?;
        let output = workflow.output_node().ok_or_else(|| {
            WeftError::InvalidWorkflow(format!("loop body has no {}", OUTPUT_NODE))
        })?;
        let input_schema = input.config_schema("input_schema")?;
        let output_schema = output.config_schema("output_schema")?;

        let missing: Vec<&str> = input_schema
            .field_names()
            .filter(|f| !output_schema.contains(f))
            .collect();
        if !missing.is_empty() {
            return Err(WeftError::InvalidWorkflow(format!(
                "Output schema must include all fields from input schema (missing: {})",
                missing.join(", ")
            )));
        }
        Ok(Self(workflow))
    }

    pub fn workflow(&self) -> &WorkflowDefinition {
        &self.0
    }
}

impl<'de> Deserialize<'de> for LoopSubworkflowDefinition {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let workflow = WorkflowDefinition::deserialize(deserializer)?;
        LoopSubworkflowDefinition::new(workflow).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeTag;
    use serde_json::json;

    fn text_schema() -> RecordSchema {
        RecordSchema::new().with("text", TypeTag::STR)
    }

    fn body() -> WorkflowDefinition {
        WorkflowDefinition::new(
            vec![
                WorkflowNode::input("in", &text_schema()),
                WorkflowNode::new("step", "AppendSuffix", json!({"suffix": "*"})),
                WorkflowNode::output("out", &text_schema()),
            ],
            vec![
                WorkflowLink::same_key("in", "step", "text"),
                WorkflowLink::same_key("step", "out", "text"),
            ],
        )
    }

    #[test]
    fn test_valid_workflow() {
        let wf = body();
        assert!(wf.validate().is_ok());
        assert_eq!(wf.input_node().map(|n| n.id.as_str()), Some("in"));
        assert_eq!(wf.output_node().map(|n| n.id.as_str()), Some("out"));
        assert_eq!(wf.links_from("in").count(), 1);
        assert_eq!(wf.links_into("out").count(), 1);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut wf = body();
        wf.nodes.push(WorkflowNode::new("step", "AppendSuffix", json!({})));
        assert!(matches!(wf.validate(), Err(WeftError::InvalidWorkflow(_))));
    }

    #[test]
    fn test_dangling_link_rejected() {
        let mut wf = body();
        wf.links.push(WorkflowLink::same_key("ghost", "out", "text"));
        let err = wf.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_markers_required() {
        let mut wf = body();
        wf.nodes.retain(|n| !n.is_output());
        wf.links.retain(|l| l.target_id != "out");
        assert!(wf.validate().is_err());

        let mut wf = body();
        wf.nodes.push(WorkflowNode::input("in2", &text_schema()));
        assert!(wf.validate().is_err());
    }

    #[test]
    fn test_loop_body_accepts_covering_output() {
        let loop_body = LoopSubworkflowDefinition::new(body()).unwrap();
        assert_eq!(loop_body.workflow().nodes.len(), 3);
    }

    #[test]
    fn test_loop_body_rejects_uncovered_input_field() {
        let mut wf = body();
        wf.nodes[0] = WorkflowNode::input(
            "in",
            &text_schema().with("counter", TypeTag::INT),
        );
        let err = LoopSubworkflowDefinition::new(wf).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("counter"));
    }

    #[test]
    fn test_loop_body_deserialize_validates() {
        let raw = json!({
            "nodes": [
                {"id": "in", "node_type": "InputNode", "config": {"input_schema": {"a": "str", "b": "int"}}},
                {"id": "out", "node_type": "OutputNode", "config": {"output_schema": {"a": "str"}}}
            ],
            "links": [{"source_id": "in", "source_output_key": "a", "target_id": "out", "target_input_key": "a"}]
        });
        let err = serde_json::from_value::<LoopSubworkflowDefinition>(raw).unwrap_err();
        assert!(err.to_string().contains("Output schema must include all fields"));
    }

    #[test]
    fn test_definition_json_roundtrip() {
        let wf = body();
        let json = serde_json::to_string(&wf).unwrap();
        let parsed: WorkflowDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, wf);
    }
}
