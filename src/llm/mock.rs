//! Mock / 脚本化客户端（用于测试与无 API Key 的本地运行）
//!
//! - MockLlmClient：回显最后一条 User 消息；图像生成返回占位 URL。
//! - ScriptedLlmClient：按 prompt 子串匹配预设回复，并记录每次调用的起止时间，便于验证阶段顺序与并发。

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::core::ModelError;
use crate::llm::{GenerateOptions, Generation, LlmClient};
use crate::memory::{Message, Role};

/// Mock 客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(Generation::Text(format!("Echo from Mock: {}", last_user)))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let seed: String = prompt
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(16)
            .collect();
        Ok(format!("https://picsum.photos/seed/{}/800/600", seed.to_lowercase()))
    }
}

/// 预设回复
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Structured(Value),
    Image(String),
    Fail(ModelError),
}

/// 一次调用的记录
#[derive(Debug, Clone)]
pub struct CallRecord {
    /// 匹配到的规则子串；未匹配时为 None
    pub rule: Option<String>,
    pub prompt: String,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
}

/// 脚本化客户端：规则按添加顺序匹配，首个子串命中者生效；规则可重复命中
pub struct ScriptedLlmClient {
    rules: Vec<(String, ScriptedReply)>,
    fallback: ScriptedReply,
    delay: Duration,
    calls: Mutex<Vec<CallRecord>>,
}

impl Default for ScriptedLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: ScriptedReply::Fail(ModelError::Request("no scripted reply".to_string())),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, needle: impl Into<String>, reply: ScriptedReply) -> Self {
        self.rules.push((needle.into(), reply));
        self
    }

    pub fn otherwise(mut self, reply: ScriptedReply) -> Self {
        self.fallback = reply;
        self
    }

    /// 每次调用前等待的时间（用于观察并发重叠）
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 命中指定规则的调用次数
    pub fn hits(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.rule.as_deref() == Some(needle))
            .count()
    }

    async fn respond(&self, prompt: String) -> ScriptedReply {
        let matched = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()));
        let rule = matched.map(|(needle, _)| needle.clone());
        let reply = matched
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone());

        let index = match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(CallRecord {
                    rule,
                    prompt,
                    started_at: Instant::now(),
                    finished_at: None,
                });
                Some(calls.len() - 1)
            }
            Err(_) => None,
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let (Some(index), Ok(mut calls)) = (index, self.calls.lock()) {
            if let Some(record) = calls.get_mut(index) {
                record.finished_at = Some(Instant::now());
            }
        }
        reply
    }
}

fn joined_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _options: &GenerateOptions,
    ) -> Result<Generation, ModelError> {
        match self.respond(joined_prompt(messages)).await {
            ScriptedReply::Text(text) | ScriptedReply::Image(text) => Ok(Generation::Text(text)),
            ScriptedReply::Structured(value) => Ok(Generation::Structured(value)),
            ScriptedReply::Fail(err) => Err(err),
        }
    }

    async fn generate_image(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        match self.respond(prompt.to_string()).await {
            ScriptedReply::Image(url) | ScriptedReply::Text(url) => Ok(url),
            ScriptedReply::Structured(value) => Err(ModelError::Malformed(format!(
                "expected image url, got {}",
                value
            ))),
            ScriptedReply::Fail(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_echoes_last_user_message() {
        let out = MockLlmClient
            .complete(
                &[Message::user("first"), Message::user("second")],
                &GenerateOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(out, Generation::Text("Echo from Mock: second".to_string()));
    }

    #[tokio::test]
    async fn test_scripted_rules_and_records() {
        let llm = ScriptedLlmClient::new()
            .on("lore", ScriptedReply::Structured(json!({"title": "T"})))
            .on("map", ScriptedReply::Image("https://img/map.png".to_string()));

        let out = llm
            .complete(&[Message::user("write the lore")], &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(out, Generation::Structured(json!({"title": "T"})));

        let url = llm
            .generate_image("draw a map", &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(url, "https://img/map.png");

        let err = llm
            .complete(&[Message::user("unknown")], &GenerateOptions::default())
            .await;
        assert!(err.is_err());

        assert_eq!(llm.calls().len(), 3);
        assert_eq!(llm.hits("lore"), 1);
        assert!(llm.calls().iter().all(|c| c.finished_at.is_some()));
    }
}
