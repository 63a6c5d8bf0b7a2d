//! 结果来源追踪
//!
//! 每次评分调用生成一个 [`ProviderTrace`]，返回后不再修改。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// 由 AI 评分
    Ai,
    /// 由兜底评估器给出
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTrace {
    pub mode: TraceMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<ProviderAttempt>,
}

impl ProviderTrace {
    pub fn ai(attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            mode: TraceMode::Ai,
            reason: None,
            attempts,
        }
    }

    pub fn fallback(reason: impl Into<String>, attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            mode: TraceMode::Fallback,
            reason: Some(reason.into()),
            attempts,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.mode == TraceMode::Fallback
    }
}

/// 单次 provider 调用记录（无论成败都会记录）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAttempt {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ProviderAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
