pub mod executor;
pub mod plan;

pub use executor::WorkflowExecutor;
pub use plan::ExecutionPlan;
