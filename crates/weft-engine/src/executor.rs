use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info};

use weft_core::config::EngineConfig;
use weft_core::error::{Result, WeftError};
use weft_core::event::{EventBus, WorkflowEvent};
use weft_core::schema::Record;
use weft_core::traits::{GraphRunner, NodeOutputs, PartialRun};
use weft_core::types::{NodeContext, RunId};
use weft_core::workflow::WorkflowDefinition;
use weft_nodes::{fan_out, NodeInstance, NodeRegistry};

use crate::plan::ExecutionPlan;

/// Which nodes a call must evaluate.
enum Scope<'r> {
    All,
    Partial { target: &'r str, rerun_predecessors: bool },
}

/// Executes workflow graphs in dependency waves.
///
/// The executor is also the [`GraphRunner`] handed to loop and subworkflow
/// nodes, so nested graphs run on the same registry and limits.
pub struct WorkflowExecutor {
    registry: Arc<NodeRegistry>,
    config: EngineConfig,
    events: Option<Arc<EventBus>>,
    this: Weak<WorkflowExecutor>,
}

impl WorkflowExecutor {
    pub fn new(registry: Arc<NodeRegistry>, config: EngineConfig) -> Arc<Self> {
        Self::build(registry, config, None)
    }

    /// An executor that publishes [`WorkflowEvent`]s on `events`.
    pub fn with_events(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        Self::build(registry, config, Some(events))
    }

    fn build(
        registry: Arc<NodeRegistry>,
        config: EngineConfig,
        events: Option<Arc<EventBus>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            config,
            events,
            this: this.clone(),
        })
    }

    /// Evaluate every node of `workflow`.
    ///
    /// `initial_inputs` seed nodes by id, typically the InputNode.
    pub async fn run(
        &self,
        workflow: &WorkflowDefinition,
        initial_inputs: NodeOutputs,
    ) -> Result<NodeOutputs> {
        self.evaluate(workflow, Scope::All, initial_inputs, NodeOutputs::new(), RunId::new(), 0)
            .await
    }

    /// Evaluate `workflow` until `request.target` is known.
    pub async fn run_partial(
        &self,
        workflow: &WorkflowDefinition,
        request: PartialRun,
    ) -> Result<NodeOutputs> {
        let PartialRun {
            target,
            rerun_predecessors,
            initial_inputs,
            partial_outputs,
        } = request;
        let scope = Scope::Partial {
            target: &target,
            rerun_predecessors,
        };
        self.evaluate(workflow, scope, initial_inputs, partial_outputs, RunId::new(), 0)
            .await
    }

    async fn evaluate(
        &self,
        workflow: &WorkflowDefinition,
        scope: Scope<'_>,
        initial_inputs: NodeOutputs,
        memo: NodeOutputs,
        run_id: RunId,
        depth: usize,
    ) -> Result<NodeOutputs> {
        let plan = ExecutionPlan::build(workflow, &self.registry)?;

        let (needed, rerun) = match scope {
            Scope::All => (plan.order().iter().cloned().collect::<HashSet<_>>(), true),
            Scope::Partial {
                target,
                rerun_predecessors,
            } => {
                if !plan.contains(target) {
                    return Err(WeftError::InvalidWorkflow(format!(
                        "target node '{}' is not in the workflow",
                        target
                    )));
                }
                // Seeded nodes are never rerun; memoized ones only without rerun.
                let needed = plan.ancestors_of(target, |id| {
                    initial_inputs.contains_key(id)
                        || (!rerun_predecessors && memo.contains_key(id))
                });
                (needed, rerun_predecessors)
            }
        };

        info!(
            run_id = %run_id,
            depth,
            nodes = plan.order().len(),
            needed = needed.len(),
            rerun,
            "Executing workflow"
        );

        let mut outputs = NodeOutputs::new();
        for (id, seed) in initial_inputs {
            let instance = plan.instance(&id).ok_or_else(|| {
                WeftError::InvalidWorkflow(format!("seeded node '{}' is not in the workflow", id))
            })?;
            let value = instance
                .output_type()
                .validate_record(&seed)
                .map_err(|errors| WeftError::InputValidation {
                    node: instance.name().to_string(),
                    errors,
                })?;
            outputs.insert(id, value);
        }

        let mut pending: Vec<&str> = Vec::new();
        for id in plan.order() {
            if outputs.contains_key(id) {
                continue;
            }
            if needed.contains(id) && rerun {
                pending.push(id);
            } else if let Some(previous) = memo.get(id) {
                outputs.insert(id.clone(), previous.clone());
            } else if needed.contains(id) {
                pending.push(id);
            }
        }

        let mut skipped: HashSet<String> = HashSet::new();
        while !pending.is_empty() {
            let (ready, waiting): (Vec<&str>, Vec<&str>) = pending.iter().copied().partition(|id| {
                plan.incoming(id)
                    .all(|l| outputs.contains_key(&l.source_id) || skipped.contains(&l.source_id))
            });
            if ready.is_empty() {
                return Err(WeftError::InvalidWorkflow(format!(
                    "nodes cannot be scheduled: {}",
                    waiting.join(", ")
                )));
            }
            pending = waiting;

            let mut wave: Vec<(NodeInstance, Record)> = Vec::with_capacity(ready.len());
            for id in ready {
                match gather_input(&plan, id, &outputs) {
                    Some(input) => {
                        if let Some(instance) = plan.instance(id) {
                            wave.push((instance.clone(), input));
                        }
                    }
                    None => {
                        debug!(node_id = %id, "Linked input unavailable, skipping node");
                        self.publish(WorkflowEvent::NodeSkipped {
                            node_id: id.to_string(),
                        });
                        skipped.insert(id.to_string());
                    }
                }
            }

            let results = fan_out(wave, self.config.max_concurrency, |(instance, input)| {
                let ctx = self.node_context(&run_id, instance.id(), depth);
                self.invoke(instance, input, ctx)
            })
            .await?;
            outputs.extend(results);
        }

        debug!(
            run_id = %run_id,
            depth,
            outputs = outputs.len(),
            skipped = skipped.len(),
            "Workflow complete"
        );
        Ok(outputs)
    }

    async fn invoke(
        &self,
        instance: NodeInstance,
        input: Record,
        ctx: NodeContext,
    ) -> Result<(String, Record)> {
        let start = Instant::now();
        info!(
            node_id = %instance.id(),
            node_type = %instance.node_type(),
            depth = ctx.depth,
            "Executing node"
        );
        self.publish(WorkflowEvent::NodeStarted {
            node_id: instance.id().to_string(),
            node_type: instance.node_type().to_string(),
            depth: ctx.depth,
        });

        let output = instance.invoke(input, ctx).await?;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        debug!(node_id = %instance.id(), elapsed_ms, "Node execution complete");
        self.publish(WorkflowEvent::NodeCompleted {
            node_id: instance.id().to_string(),
            elapsed_ms,
        });
        Ok((instance.id().to_string(), output))
    }

    fn node_context(&self, run_id: &RunId, node_id: &str, depth: usize) -> NodeContext {
        NodeContext {
            run_id: run_id.clone(),
            node_id: node_id.to_string(),
            depth,
            runner: self.this.upgrade().map(|this| this as Arc<dyn GraphRunner>),
            events: self.events.clone(),
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(ref events) = self.events {
            events.publish(event);
        }
    }
}

impl GraphRunner for WorkflowExecutor {
    fn run_partial<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        request: PartialRun,
        parent: &'a NodeContext,
    ) -> BoxFuture<'a, Result<NodeOutputs>> {
        Box::pin(async move {
            let depth = parent.depth + 1;
            if depth > self.config.max_depth {
                return Err(WeftError::DepthExceeded(self.config.max_depth));
            }
            let PartialRun {
                target,
                rerun_predecessors,
                initial_inputs,
                partial_outputs,
            } = request;
            let scope = Scope::Partial {
                target: &target,
                rerun_predecessors,
            };
            self.evaluate(
                workflow,
                scope,
                initial_inputs,
                partial_outputs,
                parent.run_id.clone(),
                depth,
            )
            .await
        })
    }
}

/// Assemble a node's input from its incoming links. `None` when any linked
/// source was skipped or did not produce the linked field.
fn gather_input(
    plan: &ExecutionPlan<'_>,
    id: &str,
    outputs: &HashMap<String, Record>,
) -> Option<Record> {
    let mut input = Record::new();
    for link in plan.incoming(id) {
        let value = outputs.get(&link.source_id)?.get(&link.source_output_key)?;
        input.insert(link.target_input_key.clone(), value.clone());
    }
    Some(input)
}
