pub mod grading_ctx;
pub mod grading_flow;

pub use grading_ctx::{GradingCtx, GradingRequest, RubricSource};
pub use grading_flow::{FlowState, GradingFlow, GradingOutcome};
