//! 评分请求与上下文
//!
//! 封装"我正在为谁、给哪道题评分"这一信息

use std::fmt::Display;

use serde_json::Value as JsonValue;

use crate::models::identity::ScopeIdentity;

/// 评分细则来源
#[derive(Debug, Clone)]
pub enum RubricSource {
    /// 请求里直接携带的原始 JSON，评分前需要校验
    Inline(JsonValue),
    /// 按 (scope_key, question_key) 从细则存储中读取
    Stored,
}

/// 单次评分请求
#[derive(Debug, Clone)]
pub struct GradingRequest {
    pub identity: ScopeIdentity,
    pub question_key: Option<String>,
    pub student_name: Option<String>,
    pub rubric: RubricSource,
    /// 学生答案文本（OCR 结果或手动输入）
    pub answer_text: String,
    /// 答题图片（URL 或 data URL）
    pub images: Vec<String>,
}

impl GradingRequest {
    pub fn new(identity: ScopeIdentity, rubric: RubricSource, answer_text: impl Into<String>) -> Self {
        Self {
            identity,
            question_key: None,
            student_name: None,
            rubric,
            answer_text: answer_text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_question_key(mut self, question_key: impl Into<String>) -> Self {
        self.question_key = Some(question_key.into());
        self
    }

    pub fn with_student(mut self, student_name: impl Into<String>) -> Self {
        self.student_name = Some(student_name.into());
        self
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// 评分上下文（仅用于日志前缀）
#[derive(Debug, Clone)]
pub struct GradingCtx {
    pub scope_key: String,
    pub question_key: Option<String>,
    pub student_name: Option<String>,
}

impl GradingCtx {
    pub fn from_request(request: &GradingRequest) -> Self {
        Self {
            scope_key: request.identity.scope_key(),
            question_key: request.question_key.clone(),
            student_name: request.student_name.clone(),
        }
    }
}

impl Display for GradingCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[评分 {} 题目#{}",
            self.scope_key,
            self.question_key.as_deref().unwrap_or("-")
        )?;
        if let Some(student) = &self.student_name {
            write!(f, " 学生#{}", student)?;
        }
        f.write_str("]")
    }
}
