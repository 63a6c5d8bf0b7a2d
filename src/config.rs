use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::services::dispatcher::AiTask;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 批量评分时同时进行的数量
    pub max_concurrent_gradings: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 日志级别（RUST_LOG 未设置时使用）
    pub log_level: String,
    /// 评分记录文件（JSON Lines）
    pub record_file: String,
    /// 单次评分的总截止时间（秒）
    pub overall_timeout_secs: u64,
    /// 未激活设备的试用额度
    pub free_quota: u32,
    /// 命令行评分时使用的设备 ID
    pub device_id: String,
    /// 梯队配置文件（TOML），为空时按下面的模型配置生成
    pub ladder_file: Option<String>,
    // --- OpenAI 兼容服务 ---
    pub openai_api_key: String,
    pub openai_api_base_url: String,
    // --- Gemini ---
    pub gemini_api_key: String,
    pub gemini_api_base_url: String,
    // --- 默认梯队：快 → 准 → 推理 ---
    pub fast_model: String,
    pub precise_model: String,
    pub reasoning_model: String,
    pub fast_timeout_ms: u64,
    pub precise_timeout_ms: u64,
    pub reasoning_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_gradings: 8,
            verbose_logging: false,
            log_level: "info".to_string(),
            record_file: "grading_records.jsonl".to_string(),
            overall_timeout_secs: 180,
            free_quota: 20,
            device_id: "local-cli".to_string(),
            ladder_file: None,
            openai_api_key: String::new(),
            openai_api_base_url: "https://api.openai.com/v1".to_string(),
            gemini_api_key: String::new(),
            gemini_api_base_url: "https://generativelanguage.googleapis.com".to_string(),
            fast_model: "gpt-4o-mini".to_string(),
            precise_model: "gpt-4o".to_string(),
            reasoning_model: "gemini-2.5-pro".to_string(),
            fast_timeout_ms: 20_000,
            precise_timeout_ms: 45_000,
            reasoning_timeout_ms: 90_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            max_concurrent_gradings: std::env::var("MAX_CONCURRENT_GRADINGS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_concurrent_gradings),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(default.log_level),
            record_file: std::env::var("RECORD_FILE").unwrap_or(default.record_file),
            overall_timeout_secs: std::env::var("OVERALL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.overall_timeout_secs),
            free_quota: std::env::var("FREE_QUOTA").ok().and_then(|v| v.parse().ok()).unwrap_or(default.free_quota),
            device_id: std::env::var("DEVICE_ID").unwrap_or(default.device_id),
            ladder_file: std::env::var("LADDER_FILE").ok().filter(|v| !v.is_empty()),
            openai_api_key: std::env::var("OPENAI_API_KEY").unwrap_or(default.openai_api_key),
            openai_api_base_url: std::env::var("OPENAI_API_BASE_URL").unwrap_or(default.openai_api_base_url),
            gemini_api_key: std::env::var("GEMINI_API_KEY").unwrap_or(default.gemini_api_key),
            gemini_api_base_url: std::env::var("GEMINI_API_BASE_URL").unwrap_or(default.gemini_api_base_url),
            fast_model: std::env::var("FAST_MODEL").unwrap_or(default.fast_model),
            precise_model: std::env::var("PRECISE_MODEL").unwrap_or(default.precise_model),
            reasoning_model: std::env::var("REASONING_MODEL").unwrap_or(default.reasoning_model),
            fast_timeout_ms: std::env::var("FAST_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.fast_timeout_ms),
            precise_timeout_ms: std::env::var("PRECISE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.precise_timeout_ms),
            reasoning_timeout_ms: std::env::var("REASONING_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.reasoning_timeout_ms),
        }
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_secs)
    }

    /// 生成 provider 梯队：优先读取 TOML 文件
    pub fn ladder(&self) -> Result<ProviderLadder, GradingError> {
        match &self.ladder_file {
            Some(path) => ProviderLadder::load(Path::new(path)),
            None => Ok(self.default_ladder()),
        }
    }

    fn default_ladder(&self) -> ProviderLadder {
        let fast = ProviderRoute::new("openai", &self.fast_model, self.fast_timeout_ms);
        let precise = ProviderRoute::new("openai", &self.precise_model, self.precise_timeout_ms);
        let reasoning =
            ProviderRoute::new("gemini", &self.reasoning_model, self.reasoning_timeout_ms);

        ProviderLadder {
            grading: vec![fast, precise.clone(), reasoning.clone()],
            rubric_draft: vec![precise, reasoning],
        }
    }
}

/// 单个梯队节点
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRoute {
    pub provider: String,
    pub model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ProviderRoute {
    pub fn new(provider: impl Into<String>, model: impl Into<String>, timeout_ms: u64) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            timeout_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 按任务划分的有序 provider 梯队
///
/// 顺序即尝试顺序：便宜快速的模型在前，能力更强、成本更高的在后。
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLadder {
    #[serde(default)]
    pub grading: Vec<ProviderRoute>,
    #[serde(default)]
    pub rubric_draft: Vec<ProviderRoute>,
}

impl ProviderLadder {
    pub fn routes(&self, task: AiTask) -> &[ProviderRoute] {
        match task {
            AiTask::Grading => &self.grading,
            AiTask::RubricDraft => &self.rubric_draft,
        }
    }

    /// 只给评分任务配置梯队
    pub fn for_grading(routes: Vec<ProviderRoute>) -> Self {
        Self {
            grading: routes,
            rubric_draft: Vec::new(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, GradingError> {
        toml::from_str(content).map_err(|e| GradingError::Config(format!("梯队配置解析失败: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, GradingError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GradingError::Config(format!("无法读取梯队配置 {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}
