//! Gemini provider
//!
//! 直接调用 `generateContent` REST 接口（reqwest），要求模型以 JSON 返回。
//! 图片只支持 `data:` URL（截图上传场景），其他 URL 会被跳过并记录警告。

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::clients::llm_client::{LlmProvider, ProviderError, ProviderRequest};

/// Gemini provider
pub struct GeminiProvider {
    name: String,
    client: Client,
    api_key: String,
    api_base_url: String,
}

impl GeminiProvider {
    pub fn new(name: impl Into<String>, api_key: &str, api_base_url: &str) -> Self {
        Self {
            name: name.into(),
            client: Client::new(),
            api_key: api_key.to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.api_base_url, model)
    }

    /// 构建请求体
    fn build_body(request: &ProviderRequest<'_>) -> JsonValue {
        let mut parts = vec![json!({ "text": request.prompt })];

        for url in request.images {
            match parse_data_url(url) {
                Some((mime_type, data)) => parts.push(json!({
                    "inline_data": { "mime_type": mime_type, "data": data }
                })),
                None => warn!("Gemini 只支持 data: URL 图片，已跳过: {}", truncate(url, 60)),
            }
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": 0.2,
                "responseMimeType": "application/json"
            }
        });

        if !request.system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": request.system }] });
        }

        body
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest<'_>) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Config(format!("{} 未配置 API 密钥", self.name)));
        }

        debug!("调用 {} API，模型: {}", self.name, request.model);

        let response = self
            .client
            .post(self.endpoint(request.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_body(&request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ProviderError::EmptyContent {
                model: request.model.to_string(),
            });
        }

        Ok(text.trim().to_string())
    }
}

/// 解析 `data:image/png;base64,XXXX`
fn parse_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64")?;
    Some((mime_type, data))
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_url() {
        assert_eq!(
            parse_data_url("data:image/jpeg;base64,/9j/4AAQ"),
            Some(("image/jpeg", "/9j/4AAQ"))
        );
        assert_eq!(parse_data_url("https://example.com/a.png"), None);
        assert_eq!(parse_data_url("data:text/plain,hello"), None);
    }

    #[test]
    fn test_build_body_skips_remote_images() {
        let images = vec![
            "data:image/png;base64,AAAA".to_string(),
            "https://example.com/a.png".to_string(),
        ];
        let request = ProviderRequest {
            model: "gemini-2.5-pro",
            system: "你是阅卷老师",
            prompt: "请评分",
            images: &images,
        };
        let body = GeminiProvider::build_body(&request);
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 2);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "你是阅卷老师");
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let provider = GeminiProvider::new("gemini", "", "http://localhost:1");
        let request = ProviderRequest {
            model: "gemini-2.5-flash",
            system: "",
            prompt: "hi",
            images: &[],
        };
        assert!(matches!(
            provider.complete(request).await,
            Err(ProviderError::Config(_))
        ));
    }
}
