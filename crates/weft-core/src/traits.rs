use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::schema::{Record, RecordType};
use crate::types::NodeContext;
use crate::workflow::WorkflowDefinition;

/// Per-node outputs keyed by node id.
pub type NodeOutputs = HashMap<String, Record>;

/// A unit of computation with declared input and output records.
///
/// Implementations supply `run`; callers never invoke it directly but go
/// through the validating envelope in `weft_nodes::NodeInstance`.
pub trait Node: Send + Sync + 'static {
    /// Node name used in logs and validation errors.
    fn name(&self) -> &str;

    /// The validated configuration, dumped back to JSON.
    fn config(&self) -> serde_json::Value;

    /// Record type every input must conform to.
    fn input_type(&self) -> &RecordType;

    /// Record type every output must conform to.
    fn output_type(&self) -> &RecordType;

    /// The node's own logic, run on an already validated input.
    fn run(&self, input: Record, ctx: NodeContext) -> BoxFuture<'_, Result<Record>>;
}

/// A node kind that can be constructed from configuration.
///
/// `configure` is the one-time setup step: it validates the configuration
/// and builds any configuration-dependent input/output types.
pub trait ConfigurableNode: Node + Sized {
    /// The `node_type` string this kind is registered under.
    const NODE_TYPE: &'static str;

    type Config: DeserializeOwned + Send;

    fn configure(config: Self::Config) -> Result<Self>;
}

/// A partial-evaluation request against one workflow graph.
#[derive(Debug, Clone, Default)]
pub struct PartialRun {
    /// Node whose value must be known when the call returns.
    pub target: String,
    /// Recompute every ancestor of `target`, even those in `partial_outputs`.
    pub rerun_predecessors: bool,
    /// Nodes treated as already computed with the given value; never rerun.
    pub initial_inputs: NodeOutputs,
    /// Memo of previously computed outputs.
    pub partial_outputs: NodeOutputs,
}

impl PartialRun {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn rerun_predecessors(mut self, rerun: bool) -> Self {
        self.rerun_predecessors = rerun;
        self
    }

    pub fn seed(mut self, node_id: impl Into<String>, value: Record) -> Self {
        self.initial_inputs.insert(node_id.into(), value);
        self
    }

    pub fn with_memo(mut self, memo: NodeOutputs) -> Self {
        self.partial_outputs = memo;
        self
    }
}

/// Graph execution engine, as seen from inside a node.
///
/// Loop and subworkflow nodes re-enter the engine through this trait so the
/// node crate does not depend on the engine crate.
pub trait GraphRunner: Send + Sync + 'static {
    /// Evaluate `workflow` until `request.target` is known, returning every
    /// node output computed or reused during the call.
    ///
    /// `parent` is the context of the node making the nested call.
    fn run_partial<'a>(
        &'a self,
        workflow: &'a WorkflowDefinition,
        request: PartialRun,
        parent: &'a NodeContext,
    ) -> BoxFuture<'a, Result<NodeOutputs>>;
}
