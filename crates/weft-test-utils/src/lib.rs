//! Shared test nodes and workflow builders.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use weft_core::error::{Result, WeftError};
use weft_core::schema::{Record, RecordSchema, RecordType, TypeTag};
use weft_core::traits::{ConfigurableNode, Node};
use weft_core::types::NodeContext;
use weft_core::workflow::{WorkflowDefinition, WorkflowLink, WorkflowNode};
use weft_nodes::NodeRegistry;

// ── Test nodes ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendSuffixConfig {
    pub suffix: String,
    /// Sleep before answering.
    #[serde(default)]
    pub delay_ms: u64,
}

/// `{text} -> {text + suffix}`, optionally counting invocations.
pub struct AppendSuffix {
    config: AppendSuffixConfig,
    record: RecordType,
    calls: Option<Arc<AtomicUsize>>,
}

impl AppendSuffix {
    pub fn counted(config: AppendSuffixConfig, calls: Arc<AtomicUsize>) -> Self {
        Self {
            config,
            record: text_type("AppendSuffixRecord"),
            calls: Some(calls),
        }
    }
}

impl Node for AppendSuffix {
    fn name(&self) -> &str {
        "append_suffix"
    }

    fn config(&self) -> Value {
        json!({ "suffix": self.config.suffix, "delay_ms": self.config.delay_ms })
    }

    fn input_type(&self) -> &RecordType {
        &self.record
    }

    fn output_type(&self) -> &RecordType {
        &self.record
    }

    fn run(&self, input: Record, _ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move {
            if let Some(ref calls) = self.calls {
                calls.fetch_add(1, Ordering::SeqCst);
            }
            if self.config.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
            }
            let text = input.get("text").and_then(Value::as_str).unwrap_or_default();
            Ok(text_record(&format!("{}{}", text, self.config.suffix)))
        })
    }
}

impl ConfigurableNode for AppendSuffix {
    const NODE_TYPE: &'static str = "AppendSuffix";
    type Config = AppendSuffixConfig;

    fn configure(config: AppendSuffixConfig) -> Result<Self> {
        Ok(Self {
            config,
            record: text_type("AppendSuffixRecord"),
            calls: None,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailConfig {
    #[serde(default)]
    pub message: String,
}

/// Always fails with [`WeftError::NodeExecution`].
pub struct Fail {
    message: String,
    record: RecordType,
}

impl Node for Fail {
    fn name(&self) -> &str {
        "fail"
    }

    fn config(&self) -> Value {
        json!({ "message": self.message })
    }

    fn input_type(&self) -> &RecordType {
        &self.record
    }

    fn output_type(&self) -> &RecordType {
        &self.record
    }

    fn run(&self, _input: Record, _ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move {
            Err(WeftError::NodeExecution {
                node: "fail".into(),
                message: self.message.clone(),
            })
        })
    }
}

impl ConfigurableNode for Fail {
    const NODE_TYPE: &'static str = "Fail";
    type Config = FailConfig;

    fn configure(config: FailConfig) -> Result<Self> {
        Ok(Self {
            message: config.message,
            record: text_type("FailRecord"),
        })
    }
}

// ── Registries ──────────────────────────────────────────────────

/// Built-in nodes plus `AppendSuffix` and `Fail`.
pub fn test_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::with_builtins();
    registry.register::<AppendSuffix>();
    registry.register::<Fail>();
    registry
}

/// Like [`test_registry`], but every `AppendSuffix` bumps the returned
/// counter on each run.
pub fn counting_registry() -> (NodeRegistry, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = test_registry();
    let shared = calls.clone();
    registry.register_factory(AppendSuffix::NODE_TYPE, move |config| {
        let parsed: AppendSuffixConfig = serde_json::from_value(config.clone())
            .map_err(|e| WeftError::Config(e.to_string()))?;
        Ok(Arc::new(AppendSuffix::counted(parsed, shared.clone())) as Arc<dyn Node>)
    });
    (registry, calls)
}

// ── Records and workflows ───────────────────────────────────────

pub fn text_schema() -> RecordSchema {
    RecordSchema::new().with("text", TypeTag::STR)
}

fn text_type(name: &str) -> RecordType {
    RecordType::new(name).field("text", TypeTag::STR)
}

pub fn text_record(text: &str) -> Record {
    let mut record = Record::new();
    record.insert("text".into(), json!(text));
    record
}

pub fn append_node(id: &str, suffix: &str) -> WorkflowNode {
    WorkflowNode::new(id, AppendSuffix::NODE_TYPE, json!({ "suffix": suffix }))
}

/// `in -> step_0 -> step_1 -> ... -> out`, one `AppendSuffix` per suffix.
pub fn append_chain(suffixes: &[&str]) -> WorkflowDefinition {
    let schema = text_schema();
    let mut nodes = vec![WorkflowNode::input("in", &schema)];
    let mut links = Vec::new();
    let mut previous = "in".to_string();
    for (i, suffix) in suffixes.iter().enumerate() {
        let id = format!("step_{}", i);
        nodes.push(append_node(&id, suffix));
        links.push(WorkflowLink::same_key(&previous, &id, "text"));
        previous = id;
    }
    nodes.push(WorkflowNode::output("out", &schema));
    links.push(WorkflowLink::same_key(&previous, "out", "text"));
    WorkflowDefinition::new(nodes, links)
}

/// Loop body appending `*` to its text.
pub fn star_body() -> WorkflowDefinition {
    append_chain(&["*"])
}

/// `in -> loop(FixedIterationLoopNode over star_body) -> out`.
pub fn fixed_loop_workflow(iterations: usize, rerun_predecessors: bool) -> WorkflowDefinition {
    let schema = text_schema();
    WorkflowDefinition::new(
        vec![
            WorkflowNode::input("in", &schema),
            WorkflowNode::new(
                "loop",
                "FixedIterationLoopNode",
                json!({
                    "input_schema": schema,
                    "output_schema": schema,
                    "subworkflow": star_body(),
                    "iterations": iterations,
                    "rerun_predecessors": rerun_predecessors,
                }),
            ),
            WorkflowNode::output("out", &schema),
        ],
        vec![
            WorkflowLink::same_key("in", "loop", "text"),
            WorkflowLink::same_key("loop", "out", "text"),
        ],
    )
}
