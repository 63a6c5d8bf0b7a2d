pub mod dispatcher;
pub mod fallback;
pub mod judgment_parser;
pub mod prompt;
pub mod rubric_drafter;
pub mod rubric_validator;
pub mod scoring_engine;

pub use dispatcher::{AiTask, DispatchOutcome, ProviderDispatcher};
pub use fallback::{FallbackEvaluator, OptimisticFallbackEvaluator, ZeroCreditFallbackEvaluator};
pub use prompt::Prompt;
pub use rubric_drafter::{DraftRequest, RubricDrafter};
pub use rubric_validator::ValidationReport;
