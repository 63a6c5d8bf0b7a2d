//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责应用装配和批量调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor`
//! - 根据 `Config` 装配 provider、梯队、额度账本和记录存储（`App`）
//! - 批量评分：同一份评分细则下的多份答案（`BatchGrader`）
//! - 控制并发数量（Semaphore），输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<GradingRequest>)
//!     ↓
//! workflow::GradingFlow (处理单次评分)
//!     ↓
//! services (能力层：validator / dispatcher / parser / scoring / fallback)
//!     ↓
//! clients + infrastructure (provider、额度、记录、细则存储)
//! ```
//!
//! 每次评分都是独立的调用，除额度账本外不共享任何锁。

pub mod batch_processor;

pub use batch_processor::{App, BatchGrader, BatchReport, BatchStats};
