//! 集成测试共用的假 provider、假存储和评分细则

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rubric_grader::clients::{LlmProvider, ProviderError, ProviderRequest};
use rubric_grader::error::GradingError;
use rubric_grader::infrastructure::{
    GradingRecordStore, InMemoryQuotaLedger, InMemoryRecordStore, InMemoryRubricStore,
};
use rubric_grader::models::GradingRecord;
use rubric_grader::services::ProviderDispatcher;
use rubric_grader::{GradingFlow, ProviderLadder, ProviderRoute};
use serde_json::{json, Value};

/// 按脚本返回的假 provider
pub struct ScriptedProvider {
    name: &'static str,
    reply: Result<String, String>,
    delay: Duration,
    /// 提示词包含该标记时直接 panic
    panic_marker: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn ok(name: &'static str, reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Ok(reply.into()),
            delay: Duration::ZERO,
            panic_marker: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Err("503 Service Unavailable".to_string()),
            delay: Duration::ZERO,
            panic_marker: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(name: &'static str, delay: Duration, reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Ok(reply.into()),
            delay,
            panic_marker: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// 答案中出现 `marker` 时 panic，否则返回 `reply`
    pub fn panics_on(name: &'static str, marker: &'static str, reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name,
            reply: Ok(reply.into()),
            delay: Duration::ZERO,
            panic_marker: Some(marker),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn complete(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(marker) = self.panic_marker {
            if request.prompt.contains(marker) {
                panic!("scripted provider panic");
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(ProviderError::Request)
    }
}

/// 永远保存失败的记录存储
pub struct BrokenRecordStore;

#[async_trait]
impl GradingRecordStore for BrokenRecordStore {
    async fn save(&self, _record: &GradingRecord) -> Result<(), GradingError> {
        Err(GradingError::persistence("磁盘已满"))
    }
}

/// 测试用的评分流程及其协作方
pub struct Harness {
    pub flow: GradingFlow,
    pub quota: Arc<InMemoryQuotaLedger>,
    pub records: Arc<InMemoryRecordStore>,
    pub rubrics: Arc<InMemoryRubricStore>,
}

/// 用给定 provider 组装评分流程，梯队顺序与 provider 顺序一致
pub fn harness(providers: Vec<Arc<ScriptedProvider>>, free_quota: u32) -> Harness {
    let routes = providers
        .iter()
        .map(|provider| ProviderRoute::new(provider.name, "test-model", 1_000))
        .collect();

    let mut dispatcher = ProviderDispatcher::new(ProviderLadder::for_grading(routes));
    for provider in providers {
        dispatcher.register(provider);
    }

    let quota = Arc::new(InMemoryQuotaLedger::new(free_quota));
    let records = Arc::new(InMemoryRecordStore::new());
    let rubrics = Arc::new(InMemoryRubricStore::new());
    let flow = GradingFlow::new(
        Arc::new(dispatcher),
        quota.clone(),
        records.clone(),
        rubrics.clone(),
    );

    Harness {
        flow,
        quota,
        records,
        rubrics,
    }
}

/// 两个得分点、各 2 分的累加型细则
pub fn weighted_rubric() -> Value {
    json!({
        "version": "3.0",
        "metadata": {"questionId": "hist-1", "title": "辛亥革命的历史意义", "subject": "历史"},
        "strategyType": "point_accumulation",
        "content": {
            "scoringStrategy": {"type": "weighted"},
            "points": [
                {"id": "p1", "content": "推翻了封建帝制", "keywords": ["帝制"], "score": 2},
                {"id": "p2", "content": "民主共和观念深入人心", "keywords": ["民主共和"], "score": 2}
            ]
        },
        "constraints": [],
        "createdAt": "2025-03-01T08:00:00Z",
        "updatedAt": "2025-03-01T08:00:00Z"
    })
}

/// 只达成 p1 的判定
pub const P1_ONLY: &str = r#"```json
{"checkpoints": {"p1": {"met": true, "evidence": "推翻帝制"}, "p2": {"met": false}},
 "confidence": 0.92, "notes": "答出了推翻帝制，缺少对民主共和的论述"}
```"#;
