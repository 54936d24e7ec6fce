//! Loop nodes: a body workflow unrolled one iteration at a time.

mod base;
mod conditional;
mod fixed;
mod splice;

pub use base::{LoopConfig, LoopExecution, LoopNode, LoopState, StoppingCondition};
pub use conditional::{ConditionalLoopConfig, ConditionalLoopNode, UntilCondition};
pub use fixed::{FixedIterationConfig, FixedIterationLoopNode, FixedIterations};
pub use splice::{relabel, splice};
