pub mod config;
pub mod dataset;
pub mod error;
pub mod event;
pub mod schema;
pub mod traits;
pub mod types;
pub mod workflow;

pub use config::WeftConfig;
pub use error::{FieldError, Result, ValidationErrors, WeftError};
pub use event::{EventBus, WorkflowEvent};
pub use schema::{build_schema, infer_schema, Record, RecordSchema, RecordType, Scalar, TypeTag};
pub use traits::{ConfigurableNode, GraphRunner, Node, NodeOutputs, PartialRun};
pub use types::{NodeContext, RunId};
pub use workflow::{
    LoopSubworkflowDefinition, WorkflowDefinition, WorkflowLink, WorkflowNode, INPUT_NODE,
    OUTPUT_NODE,
};
