//! 评分细则起草 - 业务能力层
//!
//! 让 AI 根据题目和参考答案起草 v3 评分细则。草稿必须完整通过校验才会返回，
//! 不做任何修补；起草没有兜底，AI 全部失败时直接返回错误。

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::error::GradingError;
use crate::models::rubric::{RubricSpec, RUBRIC_VERSION};
use crate::services::dispatcher::{AiTask, ProviderDispatcher};
use crate::services::{prompt, rubric_validator};

/// 起草请求
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub question_id: String,
    pub title: String,
    pub question: String,
    pub reference_answer: String,
    pub total_score: f64,
    pub subject: Option<String>,
}

/// 评分细则起草服务
pub struct RubricDrafter {
    dispatcher: Arc<ProviderDispatcher>,
}

impl RubricDrafter {
    pub fn new(dispatcher: Arc<ProviderDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn draft(&self, request: &DraftRequest) -> Result<RubricSpec, GradingError> {
        let prompt =
            prompt::build_draft_prompt(&request.question, &request.reference_answer, request.total_score);

        let outcome = self
            .dispatcher
            .dispatch(AiTask::RubricDraft, &prompt, &[])
            .await?;

        info!(
            "评分细则草稿由 {}/{} 生成，开始校验",
            outcome.provider, outcome.model
        );

        let document = wrap_draft(request, outcome.json);
        rubric_validator::validate(&document)
            .into_result()
            .map_err(|e| {
                warn!("AI 起草的评分细则未通过校验: {}", e);
                GradingError::Validation(e)
            })
    }
}

/// 给草稿补上 version / metadata / 时间字段，其余字段原样保留交给校验
fn wrap_draft(request: &DraftRequest, draft: JsonValue) -> JsonValue {
    let now = Utc::now().to_rfc3339();
    let mut metadata = json!({
        "questionId": request.question_id,
        "title": request.title,
    });
    if let Some(subject) = &request.subject {
        metadata["subject"] = json!(subject);
    }

    let mut document = json!({
        "version": RUBRIC_VERSION,
        "metadata": metadata,
        "createdAt": now,
        "updatedAt": now,
    });

    if let (Some(target), JsonValue::Object(fields)) = (document.as_object_mut(), draft) {
        for (key, value) in fields {
            if !target.contains_key(&key) {
                target.insert(key, value);
            }
        }
    }

    document
}
