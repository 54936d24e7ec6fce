use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use weft_core::error::{Result, WeftError};
use weft_core::event::WorkflowEvent;
use weft_core::schema::{build_schema, Record, RecordSchema, RecordType, TypeTag};
use weft_core::traits::{Node, NodeOutputs, PartialRun};
use weft_core::types::NodeContext;
use weft_core::workflow::{LoopSubworkflowDefinition, WorkflowDefinition};

use super::splice::splice;

/// Configuration shared by every loop kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_input_schema")]
    pub input_schema: RecordSchema,
    #[serde(default = "default_output_schema")]
    pub output_schema: RecordSchema,
    /// The loop body. Its OutputNode schema must cover its InputNode schema.
    pub subworkflow: WorkflowDefinition,
    /// Recompute every earlier iteration on each step instead of reusing
    /// their memoized outputs.
    #[serde(default = "default_rerun_predecessors")]
    pub rerun_predecessors: bool,
}

fn default_input_schema() -> RecordSchema {
    RecordSchema::new().with("default_input_1", TypeTag::STR)
}

fn default_output_schema() -> RecordSchema {
    RecordSchema::new().with("default_output_1", TypeTag::STR)
}

fn default_rerun_predecessors() -> bool {
    true
}

/// What a stopping condition may look at before each iteration.
#[derive(Debug, Clone, Copy)]
pub struct LoopState<'a> {
    pub iteration_count: usize,
    /// Output of the most recent iteration, if one has run.
    pub last_output: Option<&'a Record>,
}

/// Termination predicate of a loop kind. Checked before every extension.
pub trait StoppingCondition: Send + Sync + 'static {
    fn should_stop(&self, state: &LoopState<'_>) -> bool;
}

/// State of one loop run. Created by [`LoopNode::run`] and dropped when it
/// returns, so concurrent runs of one node never share an unrolled graph.
pub struct LoopExecution<'t> {
    template: &'t WorkflowDefinition,
    iteration_count: usize,
    accumulated_graph: Option<WorkflowDefinition>,
    accumulated_outputs: NodeOutputs,
}

impl<'t> LoopExecution<'t> {
    pub fn new(template: &'t WorkflowDefinition) -> Self {
        Self {
            template,
            iteration_count: 0,
            accumulated_graph: None,
            accumulated_outputs: NodeOutputs::new(),
        }
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn graph(&self) -> Option<&WorkflowDefinition> {
        self.accumulated_graph.as_ref()
    }

    pub fn outputs(&self) -> &NodeOutputs {
        &self.accumulated_outputs
    }

    pub fn state(&self) -> LoopState<'_> {
        let last_output = self
            .accumulated_graph
            .as_ref()
            .and_then(|g| g.output_node())
            .and_then(|out| self.accumulated_outputs.get(&out.id));
        LoopState {
            iteration_count: self.iteration_count,
            last_output,
        }
    }

    /// Splice one more copy of the body onto the unrolled graph.
    pub fn extend(&mut self) -> Result<()> {
        let grown = splice(
            self.accumulated_graph.as_ref(),
            self.template,
            self.iteration_count,
        )?;
        self.accumulated_graph = Some(grown);
        Ok(())
    }

    /// Evaluate the unrolled graph up to its current OutputNode.
    ///
    /// The InputNode is seeded with `input`; earlier outputs are passed as
    /// the memo and replaced by whatever the engine returns.
    pub async fn step(
        &mut self,
        input: &Record,
        rerun_predecessors: bool,
        ctx: &NodeContext,
    ) -> Result<()> {
        let graph = self
            .accumulated_graph
            .as_ref()
            .ok_or_else(|| WeftError::BrokenTemplate("step called before extend".to_string()))?;
        let (input_id, output_id) = match (graph.input_node(), graph.output_node()) {
            (Some(i), Some(o)) => (i.id.clone(), o.id.clone()),
            _ => {
                return Err(WeftError::BrokenTemplate(
                    "unrolled graph lost an Input/Output marker".to_string(),
                ))
            }
        };

        let request = PartialRun::new(output_id)
            .rerun_predecessors(rerun_predecessors)
            .seed(input_id, input.clone())
            .with_memo(std::mem::take(&mut self.accumulated_outputs));

        let runner = ctx.runner()?;
        self.accumulated_outputs = runner.run_partial(graph, request, ctx).await?;
        self.iteration_count += 1;
        Ok(())
    }

    /// The output of the last iteration.
    pub fn finish(mut self) -> Result<Record> {
        let graph = self.accumulated_graph.take().ok_or_else(|| {
            WeftError::BrokenTemplate("loop stopped before its first iteration".to_string())
        })?;
        let output_id = graph.output_node().map(|n| n.id.clone()).ok_or_else(|| {
            WeftError::BrokenTemplate("unrolled graph has no OutputNode".to_string())
        })?;
        self.accumulated_outputs
            .remove(&output_id)
            .ok_or(WeftError::MissingOutput(output_id))
    }
}

/// A loop over a body workflow, parameterized by its stopping condition.
pub struct LoopNode<S> {
    name: &'static str,
    base: LoopConfig,
    body: LoopSubworkflowDefinition,
    stop: S,
    config: Value,
    input: RecordType,
    output: RecordType,
}

impl<S: StoppingCondition> LoopNode<S> {
    pub(crate) fn build(
        name: &'static str,
        base: LoopConfig,
        stop: S,
        config: Value,
    ) -> Result<Self> {
        let body = LoopSubworkflowDefinition::new(base.subworkflow.clone())?;
        let input = build_schema(&base.input_schema, &format!("{}Input", name))?;
        let output = build_schema(&base.output_schema, &format!("{}Output", name))?;
        Ok(Self {
            name,
            base,
            body,
            stop,
            config,
            input,
            output,
        })
    }

    pub fn stopping_condition(&self) -> &S {
        &self.stop
    }
}

impl<S: StoppingCondition> Node for LoopNode<S> {
    fn name(&self) -> &str {
        self.name
    }

    fn config(&self) -> Value {
        self.config.clone()
    }

    fn input_type(&self) -> &RecordType {
        &self.input
    }

    fn output_type(&self) -> &RecordType {
        &self.output
    }

    fn run(&self, input: Record, ctx: NodeContext) -> BoxFuture<'_, Result<Record>> {
        Box::pin(async move {
            let mut execution = LoopExecution::new(self.body.workflow());

            while !self.stop.should_stop(&execution.state()) {
                execution.extend()?;
                let graph_nodes = execution.graph().map(|g| g.nodes.len()).unwrap_or(0);
                ctx.publish(WorkflowEvent::LoopIteration {
                    node_id: ctx.node_id.clone(),
                    iteration: execution.iteration_count(),
                    graph_nodes,
                });
                info!(
                    node = %ctx.node_id,
                    iteration = execution.iteration_count(),
                    graph_nodes,
                    "Loop iteration"
                );
                execution
                    .step(&input, self.base.rerun_predecessors, &ctx)
                    .await?;
            }

            execution.finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use weft_core::traits::GraphRunner;
    use weft_core::workflow::{WorkflowLink, WorkflowNode};

    /// Answers every request with the seeded text plus one `*` per body
    /// node in the graph, and records what it was asked.
    #[derive(Default)]
    struct StarRunner {
        calls: Mutex<Vec<(bool, usize)>>,
    }

    impl GraphRunner for StarRunner {
        fn run_partial<'a>(
            &'a self,
            workflow: &'a WorkflowDefinition,
            request: PartialRun,
            _parent: &'a NodeContext,
        ) -> BoxFuture<'a, Result<NodeOutputs>> {
            Box::pin(async move {
                self.calls
                    .lock()
                    .unwrap()
                    .push((request.rerun_predecessors, request.partial_outputs.len()));
                let seed = request.initial_inputs.values().next().cloned().unwrap_or_default();
                let text = seed["text"].as_str().unwrap_or_default().to_string();
                let stars = workflow
                    .nodes
                    .iter()
                    .filter(|n| n.node_type == "AppendSuffix")
                    .count();

                let mut outputs = request.partial_outputs;
                outputs.extend(request.initial_inputs);
                let mut out = Record::new();
                out.insert("text".into(), json!(format!("{}{}", text, "*".repeat(stars))));
                outputs.insert(request.target, out);
                Ok(outputs)
            })
        }
    }

    struct Times(usize);

    impl StoppingCondition for Times {
        fn should_stop(&self, state: &LoopState<'_>) -> bool {
            state.iteration_count >= self.0
        }
    }

    fn body() -> WorkflowDefinition {
        let schema = RecordSchema::new().with("text", TypeTag::STR);
        WorkflowDefinition::new(
            vec![
                WorkflowNode::input("in", &schema),
                WorkflowNode::new("star", "AppendSuffix", json!({"suffix": "*"})),
                WorkflowNode::output("out", &schema),
            ],
            vec![
                WorkflowLink::same_key("in", "star", "text"),
                WorkflowLink::same_key("star", "out", "text"),
            ],
        )
    }

    fn base(subworkflow: WorkflowDefinition, rerun: bool) -> LoopConfig {
        let schema = RecordSchema::new().with("text", TypeTag::STR);
        LoopConfig {
            input_schema: schema.clone(),
            output_schema: schema,
            subworkflow,
            rerun_predecessors: rerun,
        }
    }

    fn text(s: &str) -> Record {
        let mut r = Record::new();
        r.insert("text".into(), json!(s));
        r
    }

    #[tokio::test]
    async fn test_run_drives_each_iteration_through_runner() {
        let runner = Arc::new(StarRunner::default());
        let node = LoopNode::build("test_loop", base(body(), true), Times(3), json!({})).unwrap();
        let ctx = NodeContext::detached("loop").with_runner(runner.clone());

        let out = node.run(text("a"), ctx).await.unwrap();
        assert_eq!(out["text"], json!("a***"));

        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(rerun, _)| *rerun));
        // The memo grows with each returned map.
        assert_eq!(calls[0].1, 0);
        assert!(calls[2].1 > calls[1].1);
    }

    #[tokio::test]
    async fn test_rerun_flag_is_forwarded() {
        let runner = Arc::new(StarRunner::default());
        let node = LoopNode::build("test_loop", base(body(), false), Times(2), json!({})).unwrap();
        let ctx = NodeContext::detached("loop").with_runner(runner.clone());
        node.run(text("a"), ctx).await.unwrap();
        assert!(runner.calls.lock().unwrap().iter().all(|(rerun, _)| !rerun));
    }

    #[tokio::test]
    async fn test_zero_iterations_is_broken_template() {
        let node = LoopNode::build("test_loop", base(body(), true), Times(0), json!({})).unwrap();
        let err = node.run(text("a"), NodeContext::detached("loop")).await.unwrap_err();
        assert!(matches!(err, WeftError::BrokenTemplate(_)));
    }

    #[tokio::test]
    async fn test_loop_emits_iteration_events() {
        let events = Arc::new(weft_core::event::EventBus::new(16));
        let mut rx = events.subscribe();
        let node = LoopNode::build("test_loop", base(body(), true), Times(2), json!({})).unwrap();
        let ctx = NodeContext::detached("loop")
            .with_runner(Arc::new(StarRunner::default()))
            .with_events(events);
        node.run(text("a"), ctx).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(
            first,
            WorkflowEvent::LoopIteration { node_id: "loop".into(), iteration: 0, graph_nodes: 3 }
        );
        assert_eq!(
            second,
            WorkflowEvent::LoopIteration { node_id: "loop".into(), iteration: 1, graph_nodes: 4 }
        );
    }

    #[test]
    fn test_body_must_cover_input_fields() {
        let mut subworkflow = body();
        subworkflow.nodes[2] =
            WorkflowNode::output("out", &RecordSchema::new().with("score", TypeTag::INT));
        let err = LoopNode::build("test_loop", base(subworkflow, true), Times(1), json!({}))
            .err()
            .unwrap();
        assert!(err.to_string().contains("must include all fields"));
    }

    #[test]
    fn test_default_schemas() {
        let config: LoopConfig = serde_json::from_value(json!({"subworkflow": body()})).unwrap();
        assert_eq!(config.input_schema.get("default_input_1"), Some("str"));
        assert_eq!(config.output_schema.get("default_output_1"), Some("str"));
        assert!(config.rerun_predecessors);
    }

    #[test]
    fn test_finish_without_iteration() {
        let template = body();
        let execution = LoopExecution::new(&template);
        assert!(matches!(execution.finish(), Err(WeftError::BrokenTemplate(_))));
    }
}
