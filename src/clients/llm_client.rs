/// LLM provider 抽象
///
/// 每个 provider 只负责"把一次请求发出去并拿回文本"，
/// 超时、重试梯队、结果校验都由 `ProviderDispatcher` 负责。
use async_trait::async_trait;
use thiserror::Error;

/// 一次模型调用的请求
#[derive(Debug, Clone, Copy)]
pub struct ProviderRequest<'a> {
    /// 模型名称
    pub model: &'a str,
    /// 系统消息
    pub system: &'a str,
    /// 用户消息
    pub prompt: &'a str,
    /// 图片 URL（可以是 `data:` URL）
    pub images: &'a [String],
}

/// provider 调用错误
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 请求构建或发送失败
    #[error("请求失败: {0}")]
    Request(String),

    /// 服务端返回非 2xx
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 返回内容为空
    #[error("返回内容为空 (模型: {model})")]
    EmptyContent { model: String },

    /// 网络错误
    #[error("网络错误: {0}")]
    Http(#[from] reqwest::Error),

    /// 缺少密钥等配置
    #[error("配置错误: {0}")]
    Config(String),
}

/// LLM provider
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// provider 名称，对应梯队配置中的 `provider` 字段
    fn name(&self) -> &str;

    /// 发送请求，返回模型的原始文本输出
    async fn complete(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError>;
}
