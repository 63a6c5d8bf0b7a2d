//! 调用方身份、额度与评分记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::score::BreakdownItem;

/// 调用方身份：设备或授权码
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeIdentity {
    /// 未激活设备（试用额度）
    Device { device_id: String },
    /// 已激活的授权码
    License {
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
    },
}

impl ScopeIdentity {
    pub fn device(device_id: impl Into<String>) -> Self {
        ScopeIdentity::Device {
            device_id: device_id.into(),
        }
    }

    pub fn license(code: impl Into<String>, device_id: Option<String>) -> Self {
        ScopeIdentity::License {
            code: code.into(),
            device_id,
        }
    }

    /// 额度账本使用的 key
    pub fn scope_key(&self) -> String {
        match self {
            ScopeIdentity::Device { device_id } => format!("device:{}", device_id),
            ScopeIdentity::License { code, .. } => format!("license:{}", code.to_uppercase()),
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            ScopeIdentity::Device { device_id } => Some(device_id),
            ScopeIdentity::License { device_id, .. } => device_id.as_deref(),
        }
    }
}

/// 额度状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub scope_key: String,
    pub remaining: u32,
    pub total: u32,
    pub is_paid: bool,
}

impl QuotaStatus {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// 持久化的评分记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingRecord {
    pub scope_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub breakdown: Vec<BreakdownItem>,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub graded_at: DateTime<Utc>,
}
