//! OpenAI 兼容 provider
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Azure, DeepSeek, Doubao 等）
//! - 有图片时走 Vision 多段内容

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContent,
        ChatCompletionRequestUserMessageContentPart, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::llm_client::{LlmProvider, ProviderError, ProviderRequest};

/// 评分用的采样温度，尽量稳定
const GRADING_TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 2048;

/// OpenAI 兼容 provider
pub struct OpenAiProvider {
    name: String,
    client: Client<OpenAIConfig>,
}

impl OpenAiProvider {
    /// 创建新的 provider
    ///
    /// # 参数
    /// - `name`: 梯队配置中引用的名称，例如 `"openai"` 或 `"deepseek"`
    /// - `api_key`: API 密钥
    /// - `api_base_url`: API 基础 URL
    pub fn new(name: impl Into<String>, api_key: &str, api_base_url: &str) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base_url);

        Self {
            name: name.into(),
            client: Client::with_config(openai_config),
        }
    }

    /// 构建用户消息（有图片时使用多段内容）
    fn build_user_message(
        prompt: &str,
        images: &[String],
    ) -> Result<ChatCompletionRequestMessage, ProviderError> {
        let user_msg = if images.is_empty() {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
        } else {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> =
                Vec::with_capacity(images.len() + 1);

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ));

            for url in images {
                content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                    ChatCompletionRequestMessageContentPartImage {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some(ImageDetail::High),
                        },
                    },
                ));
            }

            debug!("使用 Vision API，包含 {} 张图片", images.len());

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(
                    content_parts,
                ))
                .build()
        }
        .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(ChatCompletionRequestMessage::User(user_msg))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        debug!(
            "调用 {} API，模型: {}，提示词长度: {} 字符",
            self.name,
            request.model,
            request.prompt.len()
        );

        let mut messages = Vec::with_capacity(2);

        if !request.system.is_empty() {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system)
                .build()
                .map_err(|e| ProviderError::Request(e.to_string()))?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        messages.push(Self::build_user_message(request.prompt, request.images)?);

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(request.model)
            .messages(messages)
            .temperature(GRADING_TEMPERATURE)
            .max_tokens(MAX_TOKENS)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            warn!("{} API 调用失败: {}", self.name, e);
            ProviderError::Request(e.to_string())
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::EmptyContent {
                model: request.model.to_string(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_with_images() {
        let images = vec!["data:image/png;base64,AAAA".to_string()];
        let message = OpenAiProvider::build_user_message("请评分", &images).unwrap();
        match message {
            ChatCompletionRequestMessage::User(user) => match user.content {
                ChatCompletionRequestUserMessageContent::Array(parts) => assert_eq!(parts.len(), 2),
                other => panic!("应为多段内容: {:?}", other),
            },
            other => panic!("应为用户消息: {:?}", other),
        }
    }

    #[test]
    fn test_provider_name() {
        let provider = OpenAiProvider::new("deepseek", "sk-test", "http://localhost:1/v1");
        assert_eq!(provider.name(), "deepseek");
    }
}
