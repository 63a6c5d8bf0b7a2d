pub mod identity;
pub mod judgment;
pub mod loaders;
pub mod rubric;
pub mod score;
pub mod trace;

pub use identity::{GradingRecord, QuotaStatus, ScopeIdentity};
pub use judgment::{CheckpointVerdict, DimensionVerdict, Judgment};
pub use loaders::{load_rubric_file, load_rubric_folder};
pub use rubric::{
    Constraint, Dimension, Level, RubricMetadata, RubricPoint, RubricSpec, RubricStrategy,
    ScoringStrategy, StrategyKind,
};
pub use score::{BreakdownItem, GradingResponse, ScoreResult};
pub use trace::{ProviderAttempt, ProviderTrace, TraceMode};
