//! OpenAI 兼容 API 客户端
//!
//! 对话通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 图像生成走同一端点的 `/images/generations`（reqwest 直接请求；DeepSeek 等没有图像接口的后端用 without_images 关闭）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::timeout;

use crate::core::ModelError;
use crate::llm::{GenerateOptions, Generation, LlmClient};
use crate::memory::{Message, Role};

const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    /// None 表示该后端没有图像接口
    image_model: Option<String>,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());
        let api_base = base_url
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();

        let config = OpenAIConfig::new()
            .with_api_base(api_base.clone())
            .with_api_key(api_key.clone());

        Self {
            client: Client::with_config(config),
            http: reqwest::Client::new(),
            api_base,
            api_key,
            model: model.to_string(),
            image_model: Some(DEFAULT_IMAGE_MODEL.to_string()),
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = Some(model.into());
        self
    }

    /// 关闭图像生成（generate_image 返回 Unsupported）
    pub fn without_images(mut self) -> Self {
        self.image_model = None;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout = Duration::from_secs(secs);
        self
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, ModelError> {
        messages
            .iter()
            .map(|m| {
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(|e| ModelError::Request(e.to_string()))
            })
            .collect()
    }
}

/// 把期望的 schema 作为额外 system 指令附加在最前面
fn with_schema_instruction(messages: &[Message], options: &GenerateOptions) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    if let Some(schema) = &options.response_schema {
        out.push(Message::system(format!(
            "Respond with a single JSON object that validates against this JSON Schema. \
             Output only the JSON, no prose, no code fences.\n{}",
            schema
        )));
    }
    out.extend(messages.iter().cloned());
    out
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(model)
            .messages(self.to_openai_messages(&with_schema_instruction(messages, options))?);
        if let Some(temperature) = options.temperature {
            args.temperature(temperature);
        }
        let request = args.build().map_err(|e| ModelError::Request(e.to_string()))?;

        let response = timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| ModelError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| ModelError::classify(e.to_string()))?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if options.response_schema.is_some() {
            let object = Generation::Text(content).into_object()?;
            Ok(Generation::Structured(serde_json::Value::Object(object)))
        } else {
            Ok(Generation::Text(content))
        }
    }

    async fn generate_image(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let Some(default_model) = self.image_model.as_deref() else {
            return Err(ModelError::Unsupported(format!(
                "image generation is not available at {}",
                self.api_base
            )));
        };
        let model = options.model.as_deref().unwrap_or(default_model);
        let body = serde_json::json!({
            "model": model,
            "prompt": prompt,
            "n": 1,
            "size": "1024x1024",
        });

        tracing::info!(model = %model, "image generation request");

        let send = self
            .http
            .post(format!("{}/images/generations", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();
        let response = timeout(self.request_timeout, send)
            .await
            .map_err(|_| ModelError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ModelError::classify(format!("HTTP {}: {}", status.as_u16(), text)));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        parsed
            .data
            .into_iter()
            .find_map(|d| {
                d.url
                    .filter(|u| !u.is_empty())
                    .or_else(|| d.b64_json.map(|b| format!("data:image/png;base64,{}", b)))
            })
            .ok_or_else(|| ModelError::Malformed("image response without url".to_string()))
    }
}
