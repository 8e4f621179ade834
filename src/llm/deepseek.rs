//! DeepSeek 后端
//!
//! 走 OpenAI 兼容的对话端点（https://api.deepseek.com），没有图像接口：
//! Cosmos / Catalyst 的图像阶段在该后端上会以 Unsupported 失败。

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
/// 思考模式
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 选模型：`DEEPSEEK_MODEL` 优先；配置里不是 deepseek-* 的模型名（比如 OpenAI 默认值）换成 deepseek-chat
fn pick_model(env_model: Option<String>, configured: &str) -> String {
    match env_model.filter(|m| !m.trim().is_empty()) {
        Some(model) => model,
        None if configured.starts_with("deepseek") => configured.to_string(),
        None => DEEPSEEK_CHAT.to_string(),
    }
}

/// 按 [llm] 段创建 DeepSeek 客户端；Key 取 `DEEPSEEK_API_KEY`，没有时回退到 `OPENAI_API_KEY`
pub fn create_deepseek_client(llm: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY").ok();
    let model = pick_model(std::env::var("DEEPSEEK_MODEL").ok(), &llm.model);
    tracing::info!(model = %model, "Using DeepSeek LLM");

    OpenAiClient::new(Some(DEEPSEEK_BASE_URL), &model, api_key.as_deref())
        .with_request_timeout(llm.request_timeout_secs)
        .without_images()
}
