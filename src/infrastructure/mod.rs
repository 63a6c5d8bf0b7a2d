//! 基础设施层：外部协作方的契约与内置实现
//!
//! - `QuotaLedger` - 额度检查与原子扣减
//! - `GradingRecordStore` - 评分记录保存
//! - `RubricStore` - 评分细则存取

pub mod quota;
pub mod record_store;
pub mod rubric_store;

pub use quota::{InMemoryQuotaLedger, QuotaLedger};
pub use record_store::{GradingRecordStore, InMemoryRecordStore, JsonlRecordStore};
pub use rubric_store::{InMemoryRubricStore, RubricStore};
