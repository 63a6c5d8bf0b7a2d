//! # Rubric Grader
//!
//! 按评分细则（rubric v3）给主观题答案打分的 AI 评分引擎
//!
//! ## 架构设计
//!
//! ### ① 客户端与基础设施层（Clients / Infrastructure）
//! - `clients/` - `LlmProvider` trait 及 OpenAI 兼容、Gemini 两个实现
//! - `infrastructure/` - 额度账本、评分记录存储、评分细则存储（全部是 trait + 内置实现）
//!
//! ### ② 业务能力层（Services）
//! - `rubric_validator` - 评分细则校验，拒绝旧版字段
//! - `dispatcher` - 按梯队依次调用 provider，每次尝试都有超时
//! - `judgment_parser` - 从模型输出中提取并规整判定结果
//! - `scoring_engine` - `(RubricSpec, Judgment) -> ScoreResult` 纯函数
//! - `fallback` - AI 全部失败时的兜底评估
//! - `rubric_drafter` - 让 AI 起草评分细则
//!
//! ### ③ 流程层（Workflow）
//! - `GradingFlow` - 单次评分状态机（校验 → 调度 → 判定 → 计分 / 兜底 → 保存）
//!
//! ### ④ 编排层（Orchestration）
//! - `App` / `BatchGrader` - 应用装配与批量评分
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::{Config, ProviderLadder, ProviderRoute};
pub use error::{AppResult, GradingError};
pub use models::{GradingResponse, Judgment, ProviderTrace, RubricSpec, ScopeIdentity, ScoreResult};
pub use orchestrator::{App, BatchGrader, BatchReport, BatchStats};
pub use workflow::{FlowState, GradingFlow, GradingOutcome, GradingRequest, RubricSource};
