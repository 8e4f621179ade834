//! 生成能力抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（文本或结构化输出）、
//! generate_image（返回图像 URL 或 data URI）。单次调用，不在此层重试。

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ModelError;
use crate::llm::extract::extract_json_object;
use crate::memory::Message;

/// 单次调用的参数；None 表示使用后端默认值
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    /// 期望的输出 JSON Schema；有值时后端应返回 Structured
    pub response_schema: Option<Value>,
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

/// 生成结果：纯文本或结构化对象
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    Text(String),
    Structured(Value),
}

impl Generation {
    /// 文本视图（结构化结果序列化为 JSON 文本）
    pub fn into_text(self) -> String {
        match self {
            Generation::Text(text) => text,
            Generation::Structured(value) => value.to_string(),
        }
    }

    /// 对象视图：Structured 直接返回；Text 则从中提取第一个 JSON 对象。调用方仍需校验字段。
    pub fn into_object(self) -> Result<serde_json::Map<String, Value>, ModelError> {
        match self {
            Generation::Structured(Value::Object(map)) => Ok(map),
            Generation::Structured(other) => Err(ModelError::Malformed(format!(
                "expected JSON object, got {}",
                other
            ))),
            Generation::Text(text) => extract_json_object(&text)
                .ok_or_else(|| ModelError::Malformed(preview(&text))),
        }
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 生成能力 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Generation, ModelError>;

    /// 图像生成，返回可直接展示的 URL（或 data URI）
    async fn generate_image(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ModelError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
