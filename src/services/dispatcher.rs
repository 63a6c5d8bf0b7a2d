//! Provider 调度器
//!
//! 按注入的梯队顺序逐个尝试 provider/model：
//! - 每次尝试都有独立超时，超时即丢弃进行中的请求（future 被 drop，连接随之中止）
//! - 无论成败都记录 `{provider, model, error?, elapsedMs}`
//! - 第一个返回"可解析且符合任务结构"JSON 的尝试即为结果
//! - 全部失败才返回 [`AiGatewayError`]
//!
//! 尝试严格串行，不并发，避免重复计费。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::llm_client::{LlmProvider, ProviderRequest};
use crate::config::{ProviderLadder, ProviderRoute};
use crate::error::AiGatewayError;
use crate::models::trace::ProviderAttempt;
use crate::services::judgment_parser;
use crate::services::prompt::Prompt;

/// AI 任务类型，每种任务有自己的梯队和结果结构要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AiTask {
    /// 按评分细则给出判定
    Grading,
    /// 根据题目和参考答案起草评分细则
    RubricDraft,
}

impl AiTask {
    pub fn as_str(self) -> &'static str {
        match self {
            AiTask::Grading => "grading",
            AiTask::RubricDraft => "rubric_draft",
        }
    }

    /// 检查 JSON 是否符合该任务期望的结构
    pub fn check_shape(self, value: &Value) -> Result<(), String> {
        let obj = value.as_object().ok_or("JSON 顶层不是对象")?;
        match self {
            AiTask::Grading => {
                let has_checkpoints = obj.get("checkpoints").is_some_and(Value::is_object);
                let has_dimensions = obj.get("dimensions").is_some_and(Value::is_object);
                if has_checkpoints || has_dimensions {
                    Ok(())
                } else {
                    Err("缺少 checkpoints 或 dimensions 对象".to_string())
                }
            }
            AiTask::RubricDraft => {
                let has_type = obj.get("strategyType").is_some_and(Value::is_string);
                let has_content = obj.get("content").is_some_and(Value::is_object);
                if has_type && has_content {
                    Ok(())
                } else {
                    Err("缺少 strategyType 或 content".to_string())
                }
            }
        }
    }
}

/// 调度成功的结果
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub json: Value,
    pub provider: String,
    pub model: String,
    /// 包括成功那一次在内的全部尝试
    pub attempts: Vec<ProviderAttempt>,
}

/// Provider 调度器
pub struct ProviderDispatcher {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    ladder: ProviderLadder,
}

impl ProviderDispatcher {
    pub fn new(ladder: ProviderLadder) -> Self {
        Self {
            providers: HashMap::new(),
            ladder,
        }
    }

    /// 注册 provider，名称取 [`LlmProvider::name`]
    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn ladder(&self) -> &ProviderLadder {
        &self.ladder
    }

    /// 按梯队依次尝试
    pub async fn dispatch(
        &self,
        task: AiTask,
        prompt: &Prompt,
        images: &[String],
    ) -> Result<DispatchOutcome, AiGatewayError> {
        let routes = self.ladder.routes(task);
        if routes.is_empty() {
            warn!("任务 {} 没有配置任何 provider", task.as_str());
            return Err(AiGatewayError::no_routes());
        }

        let mut attempts = Vec::with_capacity(routes.len());

        for (idx, route) in routes.iter().enumerate() {
            debug!(
                "[{}] 第 {}/{} 次尝试: {}/{} (超时 {} ms)",
                task.as_str(),
                idx + 1,
                routes.len(),
                route.provider,
                route.model,
                route.timeout_ms
            );

            let started = Instant::now();
            let result = self.attempt(task, route, prompt, images).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(json) => {
                    attempts.push(ProviderAttempt {
                        provider: route.provider.clone(),
                        model: route.model.clone(),
                        error: None,
                        elapsed_ms,
                    });
                    info!(
                        "[{}] ✓ {}/{} 成功，耗时 {} ms",
                        task.as_str(),
                        route.provider,
                        route.model,
                        elapsed_ms
                    );
                    return Ok(DispatchOutcome {
                        json,
                        provider: route.provider.clone(),
                        model: route.model.clone(),
                        attempts,
                    });
                }
                Err(error) => {
                    warn!(
                        "[{}] ⚠️ {}/{} 失败 ({} ms): {}",
                        task.as_str(),
                        route.provider,
                        route.model,
                        elapsed_ms,
                        error
                    );
                    attempts.push(ProviderAttempt {
                        provider: route.provider.clone(),
                        model: route.model.clone(),
                        error: Some(error),
                        elapsed_ms,
                    });
                }
            }
        }

        Err(AiGatewayError::exhausted(attempts))
    }

    async fn attempt(
        &self,
        task: AiTask,
        route: &ProviderRoute,
        prompt: &Prompt,
        images: &[String],
    ) -> Result<Value, String> {
        let provider = self
            .providers
            .get(&route.provider)
            .ok_or_else(|| format!("未注册的 provider: {}", route.provider))?;

        let request = ProviderRequest {
            model: &route.model,
            system: &prompt.system,
            prompt: &prompt.user,
            images,
        };

        let text = match tokio::time::timeout(route.timeout(), provider.complete(request)).await {
            Err(_) => return Err(format!("超时 ({} ms)", route.timeout_ms)),
            Ok(Err(e)) => return Err(e.to_string()),
            Ok(Ok(text)) => text,
        };

        let span = judgment_parser::extract_json_span(&text).map_err(|e| e.to_string())?;
        let json: Value =
            serde_json::from_str(&span).map_err(|e| format!("JSON 解析失败: {}", e))?;
        task.check_shape(&json)?;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::llm_client::ProviderError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 固定返回内容的假 provider
    struct FakeProvider {
        name: &'static str,
        reply: Result<&'static str, &'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn ok(name: &'static str, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Err("503 Service Unavailable"),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply: Ok(r#"{"checkpoints": {}}"#),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _request: ProviderRequest<'_>) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .map(str::to_string)
                .map_err(|e| ProviderError::Request(e.to_string()))
        }
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "你是阅卷老师".to_string(),
            user: "请评分".to_string(),
        }
    }

    fn ladder(routes: &[(&str, &str, u64)]) -> ProviderLadder {
        ProviderLadder::for_grading(
            routes
                .iter()
                .map(|(provider, model, timeout)| ProviderRoute::new(*provider, *model, *timeout))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_first_success_stops_ladder() {
        let fast = FakeProvider::ok("fast", r#"好的 {"checkpoints": {"p1": {"met": true}}}"#);
        let precise = FakeProvider::ok("precise", r#"{"checkpoints": {}}"#);
        let dispatcher = ProviderDispatcher::new(ladder(&[
            ("fast", "mini", 1000),
            ("precise", "large", 1000),
        ]))
        .with_provider(fast.clone())
        .with_provider(precise.clone());

        let outcome = dispatcher
            .dispatch(AiTask::Grading, &prompt(), &[])
            .await
            .unwrap();

        assert_eq!(outcome.provider, "fast");
        assert_eq!(outcome.model, "mini");
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].succeeded());
        assert_eq!(precise.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_escalates_after_failure_and_bad_shape() {
        let broken = FakeProvider::failing("broken");
        let chatty = FakeProvider::ok("chatty", r#"{"score": 5}"#);
        let good = FakeProvider::ok("good", r#"{"dimensions": {"d1": {"level": "A"}}}"#);
        let dispatcher = ProviderDispatcher::new(ladder(&[
            ("broken", "m1", 1000),
            ("chatty", "m2", 1000),
            ("good", "m3", 1000),
        ]))
        .with_provider(broken)
        .with_provider(chatty)
        .with_provider(good);

        let outcome = dispatcher
            .dispatch(AiTask::Grading, &prompt(), &[])
            .await
            .unwrap();

        assert_eq!(outcome.provider, "good");
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome.attempts[0].error.as_deref().unwrap().contains("503"));
        assert!(outcome.attempts[1]
            .error
            .as_deref()
            .unwrap()
            .contains("checkpoints"));
    }

    #[tokio::test]
    async fn test_exhaustion_reports_every_attempt() {
        let dispatcher = ProviderDispatcher::new(ladder(&[
            ("a", "m1", 1000),
            ("b", "m2", 1000),
        ]))
        .with_provider(FakeProvider::failing("a"))
        .with_provider(FakeProvider::ok("b", "抱歉，我无法评分"));

        let err = dispatcher
            .dispatch(AiTask::Grading, &prompt(), &[])
            .await
            .unwrap_err();

        assert_eq!(err.code, AiGatewayError::EXHAUSTED);
        assert_eq!(err.attempts.len(), 2);
        assert!(err.attempts.iter().all(|a| a.error.is_some()));
    }

    #[tokio::test]
    async fn test_timeout_aborts_attempt() {
        let dispatcher = ProviderDispatcher::new(ladder(&[
            ("slow", "m1", 50),
            ("fast", "m2", 1000),
        ]))
        .with_provider(FakeProvider::slow("slow", Duration::from_secs(5)))
        .with_provider(FakeProvider::ok("fast", r#"{"checkpoints": {}}"#));

        let started = Instant::now();
        let outcome = dispatcher
            .dispatch(AiTask::Grading, &prompt(), &[])
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(outcome.provider, "fast");
        assert!(outcome.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("超时"));
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_an_attempt_failure() {
        let dispatcher = ProviderDispatcher::new(ladder(&[("ghost", "m1", 1000)]));
        let err = dispatcher
            .dispatch(AiTask::Grading, &prompt(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.attempts.len(), 1);
        assert!(err.attempts[0].error.as_deref().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_empty_ladder() {
        let dispatcher = ProviderDispatcher::new(ProviderLadder::default());
        let err = dispatcher
            .dispatch(AiTask::RubricDraft, &prompt(), &[])
            .await
            .unwrap_err();
        assert_eq!(err.code, AiGatewayError::NO_ROUTES);
        assert!(err.attempts.is_empty());
    }

    #[test]
    fn test_rubric_draft_shape() {
        let ok = serde_json::json!({"strategyType": "rubric_matrix", "content": {}});
        assert!(AiTask::RubricDraft.check_shape(&ok).is_ok());
        let bad = serde_json::json!({"content": {}});
        assert!(AiTask::RubricDraft.check_shape(&bad).is_err());
    }
}
