//! 模型判定结果
//!
//! 由 [`crate::services::judgment_parser`] 从模型输出中构建，用完即弃。
//! 缺少某个得分点 / 维度的条目等价于"未达成" / "无证据"，查询永不失败。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 模型未给出置信度时的默认值
pub const DEFAULT_CONFIDENCE: f64 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Judgment {
    /// 取值 [0, 1]
    pub confidence: f64,
    pub needs_review: bool,
    #[serde(default)]
    pub checkpoints: BTreeMap<String, CheckpointVerdict>,
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionVerdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for Judgment {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            needs_review: false,
            checkpoints: BTreeMap::new(),
            dimensions: BTreeMap::new(),
            notes: None,
        }
    }
}

impl Judgment {
    /// 得分点是否达成（只有明确的 `met: true` 才算）
    pub fn is_met(&self, point_id: &str) -> bool {
        self.checkpoints
            .get(point_id)
            .map(|verdict| verdict.met)
            .unwrap_or(false)
    }

    pub fn checkpoint(&self, point_id: &str) -> Option<&CheckpointVerdict> {
        self.checkpoints.get(point_id)
    }

    pub fn dimension(&self, dimension_id: &str) -> Option<&DimensionVerdict> {
        self.dimensions.get(dimension_id)
    }
}

/// 单个得分点的判定
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CheckpointVerdict {
    pub met: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// 单个维度的判定
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DimensionVerdict {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}
