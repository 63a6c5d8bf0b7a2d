//! 评分流程 - 流程层
//!
//! 核心职责：定义"一次评分"的完整处理流程
//!
//! 流程顺序：
//! 1. Validating：校验 / 读取评分细则，检查额度（失败即终止，不调用 AI）
//! 2. Dispatching → Judging → Scoring：按梯队调用 AI，解析判定并计分
//! 3. Fallback：AI 或解析失败时降级为兜底评估，继续后续流程
//! 4. 扣减额度（AI 与兜底都算一次）
//! 5. Persisting：保存评分记录，失败只报告不回滚

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::GradingError;
use crate::infrastructure::{GradingRecordStore, QuotaLedger, RubricStore};
use crate::models::identity::GradingRecord;
use crate::models::rubric::RubricSpec;
use crate::models::score::{GradingResponse, ScoreResult};
use crate::models::trace::ProviderTrace;
use crate::services::dispatcher::{AiTask, ProviderDispatcher};
use crate::services::fallback::{FallbackEvaluator, OptimisticFallbackEvaluator};
use crate::services::{judgment_parser, prompt, rubric_validator, scoring_engine};
use crate::workflow::grading_ctx::{GradingCtx, GradingRequest, RubricSource};

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Validating,
    Dispatching,
    Judging,
    Scoring,
    Fallback,
    Persisting,
    Done,
    RejectedInvalidRubric,
    QuotaExhausted,
    PersistenceFailed,
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Validating => "validating",
            FlowState::Dispatching => "dispatching",
            FlowState::Judging => "judging",
            FlowState::Scoring => "scoring",
            FlowState::Fallback => "fallback",
            FlowState::Persisting => "persisting",
            FlowState::Done => "done",
            FlowState::RejectedInvalidRubric => "rejected_invalid_rubric",
            FlowState::QuotaExhausted => "quota_exhausted",
            FlowState::PersistenceFailed => "persistence_failed",
        };
        f.write_str(name)
    }
}

/// 一次评分的结果
#[derive(Debug)]
pub struct GradingOutcome {
    pub result: ScoreResult,
    /// 对外响应
    pub response: GradingResponse,
    pub trace: ProviderTrace,
    /// 经过的状态（按顺序）
    pub states: Vec<FlowState>,
    /// `Done` 或 `PersistenceFailed`
    pub final_state: FlowState,
    pub persistence_error: Option<GradingError>,
    /// 扣减后的剩余额度
    pub remaining_quota: u32,
}

impl GradingOutcome {
    pub fn is_fallback(&self) -> bool {
        self.trace.is_fallback()
    }
}

/// 评分完成、尚未扣减额度和保存的中间结果
struct Evaluation {
    ctx: GradingCtx,
    scope_key: String,
    result: ScoreResult,
    comment: String,
    trace: ProviderTrace,
    states: Vec<FlowState>,
}

/// 评分流程
///
/// - 编排完整的评分流程，决定何时调用 AI、何时兜底
/// - 协作方（额度、记录、细则存储）全部通过 trait 注入
/// - 不同请求之间不共享可变状态
pub struct GradingFlow {
    dispatcher: Arc<ProviderDispatcher>,
    quota: Arc<dyn QuotaLedger>,
    records: Arc<dyn GradingRecordStore>,
    rubrics: Arc<dyn RubricStore>,
    fallback: Arc<dyn FallbackEvaluator>,
    verbose_logging: bool,
}

impl GradingFlow {
    /// 创建评分流程，兜底策略默认为 [`OptimisticFallbackEvaluator`]
    pub fn new(
        dispatcher: Arc<ProviderDispatcher>,
        quota: Arc<dyn QuotaLedger>,
        records: Arc<dyn GradingRecordStore>,
        rubrics: Arc<dyn RubricStore>,
    ) -> Self {
        Self {
            dispatcher,
            quota,
            records,
            rubrics,
            fallback: Arc::new(OptimisticFallbackEvaluator),
            verbose_logging: false,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackEvaluator>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_verbose_logging(mut self, verbose_logging: bool) -> Self {
        self.verbose_logging = verbose_logging;
        self
    }

    /// 执行一次完整评分
    ///
    /// # 返回
    /// - `Ok(GradingOutcome)`：AI 或兜底给出了结果（保存失败也算，见 `persistence_error`）
    /// - `Err`：细则非法、额度 / 授权问题、扣减失败
    pub async fn run(&self, request: GradingRequest) -> Result<GradingOutcome, GradingError> {
        let evaluation = self.evaluate(&request).await?;
        self.commit(&request, evaluation).await
    }

    /// 带截止时间执行
    ///
    /// 截止时间只覆盖评分阶段：超时会丢弃正在进行的 provider 调用，
    /// 既不扣减额度也不保存记录。
    pub async fn run_with_deadline(
        &self,
        request: GradingRequest,
        deadline: Duration,
    ) -> Result<GradingOutcome, GradingError> {
        let ctx = GradingCtx::from_request(&request);
        let evaluation = match tokio::time::timeout(deadline, self.evaluate(&request)).await {
            Ok(evaluation) => evaluation?,
            Err(_) => {
                error!("{} ⏱️ 超过截止时间 {:?}，放弃本次评分", ctx, deadline);
                return Err(GradingError::DeadlineExceeded(deadline));
            }
        };
        self.commit(&request, evaluation).await
    }

    async fn evaluate(&self, request: &GradingRequest) -> Result<Evaluation, GradingError> {
        let ctx = GradingCtx::from_request(request);
        let scope_key = request.identity.scope_key();
        let mut states = vec![FlowState::Validating];

        // ========== 1. 细则与额度：失败即终止 ==========
        let rubric = self.resolve_rubric(request, &scope_key).await.map_err(|e| {
            let state = match e {
                GradingError::Validation(_) => FlowState::RejectedInvalidRubric,
                _ => FlowState::Validating,
            };
            error!("{} ❌ {} : {}", ctx, state, e);
            e
        })?;

        let quota = self.quota.ensure_scope_quota(&request.identity).await.map_err(|e| {
            error!("{} ❌ 授权检查失败: {}", ctx, e);
            e
        })?;
        if quota.is_exhausted() {
            error!("{} ❌ {} : 剩余 0/{}", ctx, FlowState::QuotaExhausted, quota.total);
            return Err(GradingError::QuotaExhausted {
                scope_key: quota.scope_key,
                total: quota.total,
            });
        }
        debug!("{} 额度检查通过，剩余 {}/{}", ctx, quota.remaining, quota.total);

        // ========== 2. AI 评分 ==========
        states.push(FlowState::Dispatching);
        info!(
            "{} 🤖 开始 AI 评分 ({}，{} 张图片)",
            ctx,
            rubric.strategy().type_name(),
            request.images.len()
        );

        let prompt = prompt::build_grading_prompt(&rubric, &request.answer_text, request.images.len());
        let judged = match self
            .dispatcher
            .dispatch(AiTask::Grading, &prompt, &request.images)
            .await
        {
            Ok(outcome) => {
                states.push(FlowState::Judging);
                if self.verbose_logging {
                    debug!("{} 模型原始判定: {}", ctx, outcome.json);
                }
                match judgment_parser::coerce_judgment(&outcome.json) {
                    Ok(judgment) => Ok((judgment, outcome.attempts)),
                    Err(e) => Err((GradingError::from(e), outcome.attempts)),
                }
            }
            Err(e) => {
                let attempts = e.attempts.clone();
                Err((GradingError::from(e), attempts))
            }
        };

        // ========== 3. 计分或兜底 ==========
        let (result, comment, trace) = match judged {
            Ok((judgment, attempts)) => {
                states.push(FlowState::Scoring);
                let result = scoring_engine::score(&rubric, &judgment);
                let comment = judgment
                    .notes
                    .as_deref()
                    .map(str::trim)
                    .filter(|notes| !notes.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| summarize(&result));
                info!(
                    "{} ✓ AI 评分完成: {}/{} (置信度 {:.2}{})",
                    ctx,
                    result.score,
                    result.max_score,
                    result.confidence,
                    if result.needs_review { "，需复核" } else { "" }
                );
                (result, comment, ProviderTrace::ai(attempts))
            }
            Err((err, attempts)) => {
                states.push(FlowState::Fallback);
                warn!(
                    "{} ⚠️ AI 评分失败 ({} 次尝试)，使用 {} 兜底: {}",
                    ctx,
                    attempts.len(),
                    self.fallback.name(),
                    err
                );
                let result = self.fallback.evaluate(&rubric);
                let comment = format!(
                    "AI 评分暂不可用，以下为 {} 兜底结果，仅供参考，请人工复核。",
                    self.fallback.name()
                );
                let reason = format!("{}: {}", err.code(), err);
                (result, comment, ProviderTrace::fallback(reason, attempts))
            }
        };

        Ok(Evaluation {
            ctx,
            scope_key,
            result,
            comment,
            trace,
            states,
        })
    }

    async fn commit(
        &self,
        request: &GradingRequest,
        evaluation: Evaluation,
    ) -> Result<GradingOutcome, GradingError> {
        let Evaluation {
            ctx,
            scope_key,
            result,
            comment,
            trace,
            mut states,
        } = evaluation;

        // ========== 4. 扣减额度 ==========
        let remaining_quota = self.quota.decrement(&scope_key).await.map_err(|e| {
            error!("{} ❌ 扣减额度失败，结果作废: {}", ctx, e);
            e
        })?;

        // ========== 5. 保存记录 ==========
        states.push(FlowState::Persisting);
        let record = GradingRecord {
            scope_key,
            question_key: request.question_key.clone(),
            student_name: request.student_name.clone(),
            score: result.score,
            max_score: result.max_score,
            breakdown: result.breakdown.clone(),
            comment: comment.clone(),
            device_id: request.identity.device_id().map(str::to_string),
            graded_at: Utc::now(),
        };

        let persistence_error = match self.records.save(&record).await {
            Ok(()) => None,
            Err(e) => {
                error!("{} ❌ 评分记录保存失败（结果仍然返回）: {}", ctx, e);
                Some(e)
            }
        };

        let final_state = if persistence_error.is_some() {
            FlowState::PersistenceFailed
        } else {
            FlowState::Done
        };
        states.push(final_state);

        info!(
            "{} ✅ {}: {}/{}，剩余额度 {}",
            ctx, final_state, result.score, result.max_score, remaining_quota
        );

        let response = GradingResponse::new(&result, comment, trace.clone());
        Ok(GradingOutcome {
            result,
            response,
            trace,
            states,
            final_state,
            persistence_error,
            remaining_quota,
        })
    }

    async fn resolve_rubric(
        &self,
        request: &GradingRequest,
        scope_key: &str,
    ) -> Result<RubricSpec, GradingError> {
        match &request.rubric {
            RubricSource::Inline(raw) => Ok(rubric_validator::validate(raw).into_result()?),
            RubricSource::Stored => {
                let question_key = request.question_key.as_deref().ok_or_else(|| {
                    GradingError::RubricNotFound {
                        scope_key: scope_key.to_string(),
                        question_key: "-".to_string(),
                    }
                })?;
                self.rubrics
                    .get(scope_key, question_key)
                    .await?
                    .ok_or_else(|| GradingError::RubricNotFound {
                        scope_key: scope_key.to_string(),
                        question_key: question_key.to_string(),
                    })
            }
        }
    }
}

/// 模型没给评语时，根据得分明细生成一句
fn summarize(result: &ScoreResult) -> String {
    let missed: Vec<&str> = result
        .breakdown
        .iter()
        .filter(|item| item.score < item.max)
        .map(|item| item.label.as_str())
        .collect();

    if missed.is_empty() {
        format!("得分 {}/{}，要点齐全。", result.score, result.max_score)
    } else {
        format!(
            "得分 {}/{}，未得分或未得满分：{}。",
            result.score,
            result.max_score,
            missed.join("；")
        )
    }
}
