//! 评分结果与对外响应结构

use serde::{Deserialize, Serialize};

use crate::models::trace::ProviderTrace;

/// 评分引擎输出
///
/// 不变量：`0 <= score <= max_score`；累加型策略下 breakdown 分数之和等于 `score`。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub score: f64,
    pub max_score: f64,
    pub breakdown: Vec<BreakdownItem>,
    pub confidence: f64,
    pub needs_review: bool,
}

impl ScoreResult {
    /// 各项得分之和
    pub fn breakdown_total(&self) -> f64 {
        self.breakdown.iter().map(|item| item.score).sum()
    }
}

/// 分项得分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownItem {
    pub label: String,
    pub score: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl BreakdownItem {
    pub fn new(label: impl Into<String>, score: f64, max: f64) -> Self {
        Self {
            label: label.into(),
            score,
            max,
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// 评分接口的响应（线上格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingResponse {
    pub score: f64,
    pub max_score: f64,
    pub breakdown: Vec<BreakdownItem>,
    pub comment: String,
    pub provider_trace: ProviderTrace,
}

impl GradingResponse {
    pub fn new(result: &ScoreResult, comment: impl Into<String>, trace: ProviderTrace) -> Self {
        Self {
            score: result.score,
            max_score: result.max_score,
            breakdown: result.breakdown.clone(),
            comment: comment.into(),
            provider_trace: trace,
        }
    }
}
