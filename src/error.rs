//! 错误类型
//!
//! 两类错误的处理策略完全不同：
//! - 外部模型不可靠导致的错误（`AiGateway` / `Parse`）在内部吸收，降级为兜底评分
//! - 调用方输入或授权导致的错误（`Validation` / `QuotaExhausted` / `License`）立即失败
//!
//! 每个致命错误都带有稳定的机器可读错误码（见 [`GradingError::code`]）。

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::models::trace::ProviderAttempt;

/// 评分流程错误
#[derive(Debug, Error)]
pub enum GradingError {
    /// 评分细则结构非法或含有旧版字段
    #[error("评分细则校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 找不到存储的评分细则
    #[error("未找到评分细则 (scope: {scope_key}, question: {question_key})")]
    RubricNotFound {
        scope_key: String,
        question_key: String,
    },

    /// 额度已用完
    #[error("额度已用完 (scope: {scope_key}, 总额度: {total})")]
    QuotaExhausted { scope_key: String, total: u32 },

    /// 授权码不可用
    #[error("授权错误 [{code}]: {message}")]
    License {
        code: LicenseErrorCode,
        message: String,
    },

    /// 所有 AI provider 都失败
    #[error(transparent)]
    AiGateway(#[from] AiGatewayError),

    /// 模型输出无法解析为判定结果
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// 评分记录保存失败
    #[error("评分记录保存失败: {message}")]
    Persistence { message: String },

    /// 调用方截止时间已到
    #[error("评分超时 (截止时间: {0:?})")]
    DeadlineExceeded(Duration),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 评分任务异常退出（panic 或被取消）
    #[error("评分任务异常退出: {0}")]
    TaskFailed(String),
}

impl GradingError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            GradingError::Validation(_) => "invalid_rubric",
            GradingError::RubricNotFound { .. } => "rubric_not_found",
            GradingError::QuotaExhausted { .. } => "quota_exhausted",
            GradingError::License { code, .. } => code.as_str(),
            GradingError::AiGateway(e) => e.code,
            GradingError::Parse(_) => "judgment_parse_failed",
            GradingError::Persistence { .. } => "persistence_failed",
            GradingError::DeadlineExceeded(_) => "deadline_exceeded",
            GradingError::Config(_) => "config_error",
            GradingError::TaskFailed(_) => "task_failed",
        }
    }

    /// 对应的 HTTP 状态码：调用方输入与授权问题是 4xx
    pub fn http_status(&self) -> u16 {
        match self {
            GradingError::Validation(_) => 400,
            GradingError::RubricNotFound { .. } => 404,
            GradingError::QuotaExhausted { .. } => 402,
            GradingError::License { .. } => 403,
            GradingError::DeadlineExceeded(_) => 504,
            GradingError::AiGateway(_) => 502,
            GradingError::Parse(_)
            | GradingError::Persistence { .. }
            | GradingError::Config(_)
            | GradingError::TaskFailed(_) => 500,
        }
    }

    /// 是否可以通过兜底评分恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GradingError::AiGateway(_) | GradingError::Parse(_))
    }

    pub fn license(code: LicenseErrorCode, message: impl Into<String>) -> Self {
        GradingError::License {
            code,
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        GradingError::Persistence {
            message: message.into(),
        }
    }
}

/// 授权错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseErrorCode {
    /// 授权码不存在
    NotFound,
    /// 授权码已停用
    Disabled,
    /// 授权码已过期
    Expired,
    /// 绑定设备数已达上限
    DeviceLimitReached,
}

impl LicenseErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            LicenseErrorCode::NotFound => "license_not_found",
            LicenseErrorCode::Disabled => "license_disabled",
            LicenseErrorCode::Expired => "license_expired",
            LicenseErrorCode::DeviceLimitReached => "device_limit_reached",
        }
    }
}

impl fmt::Display for LicenseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单条校验问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON 路径，例如 `content.points[2].score`
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// 评分细则校验错误，携带全部问题
#[derive(Debug, Clone, Error)]
#[error("{} 个问题: {}", .issues.len(), join_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// AI 网关错误：梯队中每个 provider/model 都已尝试且失败
#[derive(Debug, Clone, Error)]
#[error("AI 网关失败 [{code}]: 共尝试 {} 次", .attempts.len())]
pub struct AiGatewayError {
    pub code: &'static str,
    pub attempts: Vec<ProviderAttempt>,
}

impl AiGatewayError {
    pub const EXHAUSTED: &'static str = "ai_gateway_exhausted";
    pub const NO_ROUTES: &'static str = "ai_gateway_no_routes";

    pub fn exhausted(attempts: Vec<ProviderAttempt>) -> Self {
        Self {
            code: Self::EXHAUSTED,
            attempts,
        }
    }

    pub fn no_routes() -> Self {
        Self {
            code: Self::NO_ROUTES,
            attempts: Vec::new(),
        }
    }
}

/// 判定结果解析错误
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// 文本中找不到 JSON 对象
    #[error("模型输出中没有 JSON 对象")]
    NoJsonObject,
    /// 找到的片段不是合法 JSON
    #[error("JSON 解析失败: {0}")]
    InvalidJson(String),
    /// JSON 顶层不是对象
    #[error("JSON 顶层必须是对象")]
    NotAnObject,
}

/// 评分结果类型
pub type AppResult<T> = Result<T, GradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let err = GradingError::QuotaExhausted {
            scope_key: "device:abc".to_string(),
            total: 20,
        };
        assert_eq!(err.code(), "quota_exhausted");
        assert_eq!(err.http_status(), 402);
        assert!(!err.is_recoverable());

        let err = GradingError::license(LicenseErrorCode::Expired, "已过期");
        assert_eq!(err.code(), "license_expired");
        assert_eq!(err.http_status(), 403);

        let err = GradingError::TaskFailed("task 7 panicked".to_string());
        assert_eq!(err.code(), "task_failed");
        assert_eq!(err.http_status(), 500);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_ai_failures_are_recoverable() {
        let err: GradingError = AiGatewayError::exhausted(Vec::new()).into();
        assert!(err.is_recoverable());
        assert_eq!(err.code(), "ai_gateway_exhausted");

        let err: GradingError = ParseError::NoJsonObject.into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_validation_error_lists_all_issues() {
        let err = ValidationError {
            issues: vec![
                ValidationIssue::new("version", "必须为 \"3.0\""),
                ValidationIssue::new("", "缺少 content"),
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 个问题"));
        assert!(text.contains("version: 必须为"));
        assert!(text.contains("缺少 content"));
    }
}
