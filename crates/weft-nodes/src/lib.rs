//! Node contract envelope, node registry, and the built-in node kinds.

pub mod builtin;
pub mod condition;
pub mod contract;
pub mod loops;
pub mod registry;

pub use builtin::conditional::ConditionalNode;
pub use builtin::if_else::IfElseNode;
pub use builtin::io::{InputNode, OutputNode};
pub use builtin::subworkflow::SubworkflowNode;
pub use condition::{BranchCondition, ComparisonOperator, Condition, LogicalOperator};
pub use contract::{fan_out, NodeInstance};
pub use loops::{splice, ConditionalLoopNode, FixedIterationLoopNode, LoopNode};
pub use registry::NodeRegistry;
