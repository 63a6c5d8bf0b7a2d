//! 评分细则（RubricSpec v3）数据模型
//!
//! `strategyType` + `content` 建模为带标签的枚举 [`RubricStrategy`]，
//! 评分引擎对其做穷尽匹配，新增策略时未处理的地方无法编译。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// 当前唯一接受的版本号
pub const RUBRIC_VERSION: &str = "3.0";

/// 已校验的评分细则
///
/// 校验通过后不可变；修订通过 [`RubricSpec::revise`] 生成新实例。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RubricSpec {
    pub(crate) version: String,
    pub(crate) metadata: RubricMetadata,
    #[serde(flatten)]
    pub(crate) strategy: RubricStrategy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) constraints: Vec<Constraint>,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl RubricSpec {
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &RubricMetadata {
        &self.metadata
    }

    pub fn strategy(&self) -> &RubricStrategy {
        &self.strategy
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn question_id(&self) -> &str {
        &self.metadata.question_id
    }

    /// 用新的策略内容生成修订版
    ///
    /// 修订版重新走一遍完整校验，`updatedAt` 取当前时间，原实例不变。
    pub fn revise(
        &self,
        strategy: RubricStrategy,
        constraints: Vec<Constraint>,
    ) -> Result<RubricSpec, ValidationError> {
        let draft = RubricSpec {
            version: self.version.clone(),
            metadata: self.metadata.clone(),
            strategy,
            constraints,
            created_at: self.created_at,
            updated_at: Utc::now().max(self.updated_at),
        };
        let raw = serde_json::to_value(&draft).map_err(|e| ValidationError {
            issues: vec![crate::error::ValidationIssue::new("", e.to_string())],
        })?;
        crate::services::rubric_validator::validate(&raw).into_result()
    }
}

/// 题目元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RubricMetadata {
    pub question_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
}

/// 三种结构不同的评分策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategyType", content = "content", rename_all = "snake_case")]
pub enum RubricStrategy {
    /// 按得分点累加
    PointAccumulation(PointAccumulationContent),
    /// 按步骤给分
    SequentialLogic(SequentialLogicContent),
    /// 多维度等级矩阵
    RubricMatrix(RubricMatrixContent),
}

impl RubricStrategy {
    /// `strategyType` 标签
    pub fn type_name(&self) -> &'static str {
        match self {
            RubricStrategy::PointAccumulation(_) => StrategyType::PointAccumulation.as_str(),
            RubricStrategy::SequentialLogic(_) => StrategyType::SequentialLogic.as_str(),
            RubricStrategy::RubricMatrix(_) => StrategyType::RubricMatrix.as_str(),
        }
    }

    /// 显式声明的总分（`content.totalScore`）
    pub fn total_score(&self) -> Option<f64> {
        match self {
            RubricStrategy::PointAccumulation(c) => c.total_score,
            RubricStrategy::SequentialLogic(c) => c.total_score,
            RubricStrategy::RubricMatrix(c) => c.total_score,
        }
    }
}

/// `strategyType` 的取值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyType {
    PointAccumulation,
    SequentialLogic,
    RubricMatrix,
}

impl StrategyType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "point_accumulation" => Some(StrategyType::PointAccumulation),
            "sequential_logic" => Some(StrategyType::SequentialLogic),
            "rubric_matrix" => Some(StrategyType::RubricMatrix),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyType::PointAccumulation => "point_accumulation",
            StrategyType::SequentialLogic => "sequential_logic",
            StrategyType::RubricMatrix => "rubric_matrix",
        }
    }

    /// 该策略下 `content` 允许出现的字段
    pub fn content_keys(self) -> &'static [&'static str] {
        match self {
            StrategyType::PointAccumulation => &["scoringStrategy", "points", "totalScore"],
            StrategyType::SequentialLogic => {
                &["scoringStrategy", "steps", "requireOrder", "totalScore"]
            }
            StrategyType::RubricMatrix => &["dimensions", "totalScore"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PointAccumulationContent {
    pub scoring_strategy: ScoringStrategy,
    pub points: Vec<RubricPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SequentialLogicContent {
    pub scoring_strategy: ScoringStrategy,
    pub steps: Vec<RubricPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub require_order: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RubricMatrixContent {
    pub dimensions: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<f64>,
}

/// 得分点 / 步骤
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RubricPoint {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 该点满分，非负
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

/// 评分维度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Dimension {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    pub levels: Vec<Level>,
}

impl Dimension {
    /// 最高等级分，作为该维度的上限
    pub fn ceiling(&self) -> f64 {
        self.levels
            .iter()
            .map(|level| level.score)
            .fold(0.0, f64::max)
    }

    pub fn level(&self, label: &str) -> Option<&Level> {
        let label = label.trim();
        self.levels.iter().find(|level| level.label == label)
    }
}

/// 维度等级
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Level {
    pub label: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 计分策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScoringStrategy {
    #[serde(rename = "type")]
    pub kind: StrategyKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_alternative: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_ended: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// 任选 N 点
    PickN,
    /// 全部答对才得分
    All,
    /// 按点累加
    Weighted,
}

/// 附加约束（字数、格式等），进入提示词，不参与计分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Constraint {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<f64>,
}
