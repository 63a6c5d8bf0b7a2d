//! 批量评分处理器 - 编排层
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：读取梯队配置，注册 provider，创建额度账本和记录存储
//! 2. **并发控制**：使用 Semaphore 限制同时进行的评分数量
//! 3. **分批处理**：每批完成后再开始下一批
//! 4. **全局统计**：汇总成功 / 兜底 / 失败数量

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::clients::{GeminiProvider, OpenAiProvider};
use crate::config::Config;
use crate::error::GradingError;
use crate::infrastructure::{InMemoryQuotaLedger, InMemoryRubricStore, JsonlRecordStore, RubricStore};
use crate::models::identity::ScopeIdentity;
use crate::models::rubric::RubricSpec;
use crate::services::dispatcher::{AiTask, ProviderDispatcher};
use crate::services::rubric_drafter::RubricDrafter;
use crate::utils::logging::{
    log_answers_loaded, log_batch_complete, log_batch_start, log_startup, print_final_stats,
};
use crate::workflow::{FlowState, GradingFlow, GradingOutcome, GradingRequest};

/// provider 名称，梯队配置通过它引用
pub const OPENAI_PROVIDER: &str = "openai";
pub const GEMINI_PROVIDER: &str = "gemini";

/// 应用主结构
pub struct App {
    config: Config,
    dispatcher: Arc<ProviderDispatcher>,
    flow: Arc<GradingFlow>,
    rubrics: Arc<InMemoryRubricStore>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> Result<Self> {
        let ladder = config.ladder().context("加载 provider 梯队失败")?;
        log_startup(
            config.max_concurrent_gradings,
            ladder.routes(AiTask::Grading).len(),
        );

        let dispatcher = ProviderDispatcher::new(ladder)
            .with_provider(Arc::new(OpenAiProvider::new(
                OPENAI_PROVIDER,
                &config.openai_api_key,
                &config.openai_api_base_url,
            )))
            .with_provider(Arc::new(GeminiProvider::new(
                GEMINI_PROVIDER,
                &config.gemini_api_key,
                &config.gemini_api_base_url,
            )));

        let dispatcher = Arc::new(dispatcher);
        let rubrics = Arc::new(InMemoryRubricStore::new());
        let flow = GradingFlow::new(
            dispatcher.clone(),
            Arc::new(InMemoryQuotaLedger::new(config.free_quota)),
            Arc::new(JsonlRecordStore::with_path(config.record_file.clone())),
            rubrics.clone(),
        )
        .with_verbose_logging(config.verbose_logging);

        Ok(Self {
            config,
            dispatcher,
            flow: Arc::new(flow),
            rubrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn flow(&self) -> Arc<GradingFlow> {
        self.flow.clone()
    }

    /// 评分细则起草服务（与评分共用 provider）
    pub fn drafter(&self) -> RubricDrafter {
        RubricDrafter::new(self.dispatcher.clone())
    }

    /// 命令行使用的设备身份
    pub fn identity(&self) -> ScopeIdentity {
        ScopeIdentity::device(&self.config.device_id)
    }

    /// 把已校验的评分细则登记到当前身份下，返回题目 key
    pub async fn register_rubric(&self, rubric: RubricSpec) -> Result<String> {
        let question_key = rubric.question_id().to_string();
        self.rubrics
            .upsert(&self.identity().scope_key(), &question_key, rubric)
            .await?;
        Ok(question_key)
    }

    /// 单次评分（带总截止时间）
    pub async fn grade(&self, request: GradingRequest) -> Result<GradingOutcome, GradingError> {
        self.flow
            .run_with_deadline(request, self.config.overall_timeout())
            .await
    }

    /// 批量评分并输出统计
    pub async fn grade_batch(&self, requests: Vec<GradingRequest>) -> Result<BatchReport> {
        let grader = BatchGrader::new(
            self.flow.clone(),
            self.config.max_concurrent_gradings,
            self.config.overall_timeout(),
        );
        let report = grader.run(requests).await?;

        print_final_stats(
            report.stats.success,
            report.stats.fallback,
            report.stats.failed,
            report.stats.total,
            &self.config.record_file,
        );
        Ok(report)
    }
}

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    pub total: usize,
    /// 拿到结果的数量（含兜底）
    pub success: usize,
    pub fallback: usize,
    pub failed: usize,
    /// 有结果但记录没保存成功
    pub persistence_failed: usize,
}

/// 批量评分结果，`outcomes` 与输入顺序一致
#[derive(Debug)]
pub struct BatchReport {
    pub stats: BatchStats,
    pub outcomes: Vec<Result<GradingOutcome, GradingError>>,
}

/// 批量评分器
///
/// 每份答案都是一次独立的 [`GradingFlow`] 调用
pub struct BatchGrader {
    flow: Arc<GradingFlow>,
    max_concurrent: usize,
    deadline: Duration,
}

impl BatchGrader {
    pub fn new(flow: Arc<GradingFlow>, max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            flow,
            max_concurrent: max_concurrent.max(1),
            deadline,
        }
    }

    /// 处理所有请求
    pub async fn run(&self, requests: Vec<GradingRequest>) -> Result<BatchReport> {
        let total = requests.len();
        log_answers_loaded(total, self.max_concurrent);

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let total_batches = (total + self.max_concurrent - 1) / self.max_concurrent;
        let mut stats = BatchStats {
            total,
            ..Default::default()
        };
        let mut outcomes = Vec::with_capacity(total);

        let mut pending = requests.into_iter();
        for batch_num in 1..=total_batches {
            let batch: Vec<GradingRequest> = pending.by_ref().take(self.max_concurrent).collect();
            let batch_start = (batch_num - 1) * self.max_concurrent;
            log_batch_start(
                batch_num,
                total_batches,
                batch_start + 1,
                batch_start + batch.len(),
                total,
            );

            let batch_len = batch.len();
            let batch_outcomes = self.run_batch(batch, batch_start, semaphore.clone()).await?;

            let mut batch_success = 0;
            for outcome in &batch_outcomes {
                match outcome {
                    Ok(outcome) => {
                        batch_success += 1;
                        if outcome.is_fallback() {
                            stats.fallback += 1;
                        }
                        if outcome.final_state == FlowState::PersistenceFailed {
                            stats.persistence_failed += 1;
                        }
                    }
                    Err(_) => stats.failed += 1,
                }
            }
            stats.success += batch_success;
            log_batch_complete(batch_num, batch_success, batch_len);

            outcomes.extend(batch_outcomes);
        }

        info!(
            "批量评分结束: 成功 {} / 兜底 {} / 失败 {} / 记录保存失败 {}",
            stats.success, stats.fallback, stats.failed, stats.persistence_failed
        );
        Ok(BatchReport { stats, outcomes })
    }

    /// 处理单个批次
    async fn run_batch(
        &self,
        batch: Vec<GradingRequest>,
        batch_start: usize,
        semaphore: Arc<Semaphore>,
    ) -> Result<Vec<Result<GradingOutcome, GradingError>>> {
        let mut handles = Vec::with_capacity(batch.len());

        for (idx, request) in batch.into_iter().enumerate() {
            let answer_index = batch_start + idx + 1;
            let permit = semaphore.clone().acquire_owned().await?;
            let flow = self.flow.clone();
            let deadline = self.deadline;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = flow.run_with_deadline(request, deadline).await;
                if let Err(e) = &result {
                    error!("[答案 {}] ❌ 评分失败 [{}]: {}", answer_index, e.code(), e);
                }
                result
            });
            handles.push((answer_index, handle));
        }

        // 等待本批所有任务完成
        let (indexes, handles): (Vec<usize>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(handles).await;

        // 单个任务 panic 只记为该答案失败，不影响同批其他结果
        let results = indexes
            .into_iter()
            .zip(joined)
            .map(|(answer_index, joined)| {
                joined.unwrap_or_else(|e| {
                    error!("[答案 {}] ❌ 任务执行失败: {}", answer_index, e);
                    Err(GradingError::TaskFailed(e.to_string()))
                })
            })
            .collect();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderRoute;

    #[test]
    fn test_app_initializes_from_default_config() {
        let app = App::initialize(Config::default()).unwrap();
        assert_eq!(app.identity().scope_key(), "device:local-cli");
    }

    #[test]
    fn test_app_rejects_missing_ladder_file() {
        let config = Config {
            ladder_file: Some("/no/such/ladder.toml".to_string()),
            ..Config::default()
        };
        assert!(App::initialize(config).is_err());
    }

    #[test]
    fn test_default_ladder_uses_registered_names() {
        let ladder = Config::default().ladder().unwrap();
        let names: Vec<&str> = ladder
            .routes(AiTask::Grading)
            .iter()
            .map(|route: &ProviderRoute| route.provider.as_str())
            .collect();
        assert!(names.iter().all(|name| *name == OPENAI_PROVIDER || *name == GEMINI_PROVIDER));
    }
}
