//! 编排器：模式分发
//!
//! 单一入口 dispatch：Canvas 走 Planner → TaskExecutor（不读历史与附件）；
//! 其余模式先组合上下文（附件 + 对话记录 + 问题），再进入对话、规划或多阶段流水线。
//! 每个请求独立处理，编排器本身不持有可变状态。

use std::sync::Arc;
use std::time::Instant;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::{BrowserBackend, Plan};
use crate::canvas::{Planner, TaskExecutor, TaskResult};
use crate::config::AppConfig;
use crate::core::{Attachment, DispatchError, Mode, Request, RequestOptions};
use crate::llm::{
    create_deepseek_client, extract_json_object, GenerateOptions, Generation, LlmClient,
    MockLlmClient, OpenAiClient,
};
use crate::memory::{transcript, Message};
use crate::pipeline::{
    run_catalyst, run_cosmos, run_crucible, run_synthesis, CatalystOutput, CosmosOutput,
    CrucibleOutput, PipelineRunner, SynthesisOutput,
};

/// 对话模式的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
}

/// CodeX 模式的结果：一段可渲染的组件代码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOutput {
    pub component_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// 按模式归一化后的结果
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DispatchOutput {
    Answer(ChatAnswer),
    Component(ComponentOutput),
    Blueprint { goal: String, target: String, plan: Plan },
    Canvas { plan: Plan, result: TaskResult },
    Cosmos(CosmosOutput),
    Catalyst(CatalystOutput),
    Synthesis(SynthesisOutput),
    Crucible(CrucibleOutput),
}

const KNOWLEDGE_SYSTEM: &str = "You are AGI-S, a knowledgeable assistant. Answer accurately and concisely. \
When useful, reply as a JSON object {\"answer\": string, \"reasoning\": string, \"confidenceScore\": number between 0 and 1}.";

const CODER_SYSTEM: &str = "You are AGI-S Coder, an expert software engineer. Give working code with brief explanations. \
When useful, reply as a JSON object {\"answer\": string, \"reasoning\": string, \"confidenceScore\": number between 0 and 1}.";

const CODEX_SYSTEM: &str = "You are AGI-S CodeX. Generate a single self-contained React component (TSX, Tailwind classes) \
that fulfils the request. Put the full source in componentCode and a one-sentence summary in description.";

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key，或配置为 deepseek 且只有 OpenAI Key 时也走 DeepSeek 兼容端点
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        Arc::new(create_deepseek_client(&cfg.llm))
    } else if use_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        let mut client = OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        )
        .with_request_timeout(cfg.llm.request_timeout_secs);
        if let Some(image_model) = &cfg.llm.image_model {
            client = client.with_image_model(image_model.clone());
        }
        Arc::new(client)
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient)
    }
}

/// 模式分发器
pub struct Orchestrator {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    executor: TaskExecutor,
    runner: PipelineRunner,
    config: AppConfig,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, backend: Arc<dyn BrowserBackend>, config: AppConfig) -> Self {
        let planner = Planner::new(llm.clone(), config.canvas.default_target.clone())
            .with_temperature(config.canvas.planner_temperature);
        let executor = TaskExecutor::new(backend, config.canvas.clone());
        let runner = PipelineRunner::new(llm.clone())
            .with_temperature(config.pipeline.temperature)
            .with_image_model(config.pipeline.image_model.clone());
        Self {
            llm,
            planner,
            executor,
            runner,
            config,
        }
    }

    /// 按配置选择 LLM 后端后构建
    pub fn from_config(config: AppConfig, backend: Arc<dyn BrowserBackend>) -> Self {
        let llm = create_llm_from_config(&config);
        Self::new(llm, backend, config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 当前后端的累计 token：(prompt, completion, total)
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 以字符串模式名调用（先解析模式，未知模式返回 UnsupportedMode）
    pub async fn dispatch_raw(
        &self,
        query: &str,
        mode: &str,
        history: Vec<Message>,
        attachment: Option<Attachment>,
        options: RequestOptions,
    ) -> Result<DispatchOutput, DispatchError> {
        let mode: Mode = mode.parse()?;
        let request = Request {
            query: query.to_string(),
            mode,
            history,
            attachment,
            options,
        };
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: Request) -> Result<DispatchOutput, DispatchError> {
        let mode = request.mode;
        let started = Instant::now();
        let usage_before = self.llm.token_usage();
        tracing::info!(mode = %mode, history = request.history.len(), "dispatch");

        let result = match mode {
            Mode::Canvas => self.run_canvas(&request.query, request.options.target.as_deref()).await,
            Mode::Knowledge => self.run_chat(mode, KNOWLEDGE_SYSTEM, &request).await,
            Mode::Coder => self.run_chat(mode, CODER_SYSTEM, &request).await,
            Mode::CodeX => self.run_component(&request).await,
            Mode::Blueprint => {
                let goal = self.compose(&request);
                let target = self
                    .planner
                    .resolve_target(request.options.target.as_deref().unwrap_or_default());
                let plan = self.planner.plan(&goal, &target).await;
                Ok(DispatchOutput::Blueprint { goal, target, plan })
            }
            Mode::Cosmos => run_cosmos(&self.runner, &self.compose(&request))
                .await
                .map(DispatchOutput::Cosmos)
                .map_err(|source| DispatchError::Pipeline { mode, source }),
            Mode::Catalyst => run_catalyst(&self.runner, &self.compose(&request))
                .await
                .map(DispatchOutput::Catalyst)
                .map_err(|source| DispatchError::Pipeline { mode, source }),
            Mode::Synthesis => run_synthesis(&self.runner, &self.compose(&request))
                .await
                .map(DispatchOutput::Synthesis)
                .map_err(|source| DispatchError::Pipeline { mode, source }),
            Mode::Crucible => {
                run_crucible(&self.runner, &self.compose(&request), &request.options.personas)
                    .await
                    .map(DispatchOutput::Crucible)
                    .map_err(|source| DispatchError::Pipeline { mode, source })
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let (prompt_tokens, completion_tokens) = usage_delta(usage_before, self.llm.token_usage());
        match &result {
            Ok(_) => tracing::info!(
                mode = %mode,
                duration_ms,
                prompt_tokens,
                completion_tokens,
                "dispatch completed"
            ),
            Err(e) => tracing::warn!(mode = %mode, duration_ms, error = %e, "dispatch failed"),
        }
        result
    }

    /// Canvas：只看 goal 与 target，历史与附件一律不读
    async fn run_canvas(&self, goal: &str, target: Option<&str>) -> Result<DispatchOutput, DispatchError> {
        let target = self.planner.resolve_target(target.unwrap_or_default());
        let plan = self.planner.plan(goal, &target).await;
        let result = self.executor.execute(&plan, &target).await;

        if result.success() {
            Ok(DispatchOutput::Canvas { plan, result })
        } else {
            Err(DispatchError::Execution {
                mode: Mode::Canvas,
                message: result
                    .error()
                    .unwrap_or("browser task failed")
                    .to_string(),
                steps: result.steps().to_vec(),
            })
        }
    }

    async fn run_chat(
        &self,
        mode: Mode,
        system: &str,
        request: &Request,
    ) -> Result<DispatchOutput, DispatchError> {
        let messages = vec![Message::system(system), Message::user(self.compose(request))];
        let options = GenerateOptions::default().with_temperature(self.config.llm.temperature);
        let generation = self
            .llm
            .complete(&messages, &options)
            .await
            .map_err(|source| DispatchError::Generation { mode, source })?;
        Ok(DispatchOutput::Answer(normalize_answer(generation)))
    }

    async fn run_component(&self, request: &Request) -> Result<DispatchOutput, DispatchError> {
        let schema = serde_json::to_value(schemars::schema_for!(ComponentOutput)).unwrap_or_default();
        let messages = vec![Message::system(CODEX_SYSTEM), Message::user(self.compose(request))];
        let options = GenerateOptions::default()
            .with_temperature(self.config.llm.temperature)
            .with_schema(schema);
        let generation = self
            .llm
            .complete(&messages, &options)
            .await
            .map_err(|source| DispatchError::Generation {
                mode: Mode::CodeX,
                source,
            })?;
        Ok(DispatchOutput::Component(normalize_component(generation)))
    }

    /// 组合上下文：附件（带类型分隔符）+ 对话记录 + 当前问题
    fn compose(&self, request: &Request) -> String {
        let mut parts = Vec::new();
        if let Some(attachment) = &request.attachment {
            parts.push(fold_attachment(attachment, self.config.app.max_attachment_chars));
        }
        let history = transcript(&request.history);
        if !history.is_empty() {
            parts.push(format!("Conversation so far:\n{}", history));
        }
        parts.push(request.query.clone());
        parts.join("\n\n")
    }
}

/// 本次分发消耗的 token（并发请求共享计数器时为近似值）
fn usage_delta(before: (u64, u64, u64), after: (u64, u64, u64)) -> (u64, u64) {
    (after.0.saturating_sub(before.0), after.1.saturating_sub(before.1))
}

/// 附件折叠进 prompt；超长时截断并注明
pub fn fold_attachment(attachment: &Attachment, max_chars: usize) -> String {
    let kind = attachment.kind.as_str().to_uppercase();
    let total = attachment.payload.chars().count();
    let body = if total > max_chars {
        let kept: String = attachment.payload.chars().take(max_chars).collect();
        format!("{}\n[truncated {} of {} characters]", kept, total - max_chars, total)
    } else {
        attachment.payload.clone()
    };
    format!("--- BEGIN ATTACHED {kind} ---\n{body}\n--- END ATTACHED {kind} ---")
}

/// 结构化对象取字段；文本先尝试提取 JSON 对象，失败则整段作为答案
fn normalize_answer(generation: Generation) -> ChatAnswer {
    let (object, raw) = match generation {
        Generation::Structured(Value::Object(map)) => (Some(map), None),
        Generation::Structured(other) => (None, Some(other.to_string())),
        Generation::Text(text) => (extract_json_object(&text), Some(text)),
    };

    match object.as_ref().and_then(|o| o.get("answer")).and_then(Value::as_str) {
        Some(answer) => {
            let object = object.as_ref();
            ChatAnswer {
                answer: answer.to_string(),
                reasoning: object
                    .and_then(|o| o.get("reasoning"))
                    .and_then(Value::as_str)
                    .map(String::from),
                confidence_score: object
                    .and_then(|o| o.get("confidenceScore"))
                    .and_then(Value::as_f64),
            }
        }
        None => ChatAnswer {
            answer: raw.unwrap_or_else(|| object.map(|o| Value::Object(o).to_string()).unwrap_or_default()),
            reasoning: None,
            confidence_score: None,
        },
    }
}

fn normalize_component(generation: Generation) -> ComponentOutput {
    let parsed = generation
        .clone()
        .into_object()
        .ok()
        .and_then(|object| serde_json::from_value::<ComponentOutput>(Value::Object(object)).ok());
    parsed.unwrap_or_else(|| ComponentOutput {
        component_code: generation.into_text(),
        description: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AttachmentKind;
    use serde_json::json;

    /// 每次调用计 10 + 5 个 token 的假后端
    #[derive(Default)]
    struct MeteredLlm {
        calls: std::sync::atomic::AtomicU64,
    }

    #[async_trait::async_trait]
    impl LlmClient for MeteredLlm {
        async fn complete(
            &self,
            _messages: &[Message],
            _options: &GenerateOptions,
        ) -> Result<Generation, crate::core::ModelError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(Generation::Text("ok".to_string()))
        }

        async fn generate_image(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<String, crate::core::ModelError> {
            Ok("https://img/x.png".to_string())
        }

        fn token_usage(&self) -> (u64, u64, u64) {
            let n = self.calls.load(std::sync::atomic::Ordering::SeqCst);
            (10 * n, 5 * n, 15 * n)
        }
    }

    #[tokio::test]
    async fn test_token_usage_follows_backend() {
        let orchestrator = Orchestrator::new(
            Arc::new(MeteredLlm::default()),
            Arc::new(crate::browser::UnavailableBackend),
            AppConfig::default(),
        );
        assert_eq!(orchestrator.token_usage(), (0, 0, 0));

        let before = orchestrator.token_usage();
        orchestrator
            .dispatch(Request::new("hi", Mode::Knowledge))
            .await
            .unwrap();
        orchestrator
            .dispatch(Request::new("again", Mode::Coder))
            .await
            .unwrap();
        assert_eq!(orchestrator.token_usage(), (20, 10, 30));
        assert_eq!(usage_delta(before, orchestrator.token_usage()), (20, 10));
    }

    #[test]
    fn test_usage_delta_never_underflows() {
        assert_eq!(usage_delta((5, 5, 10), (3, 7, 10)), (0, 2));
    }

    #[test]
    fn test_fold_attachment_delimits_and_truncates() {
        let attachment = Attachment {
            kind: AttachmentKind::Csv,
            payload: "a,b\n1,2".to_string(),
        };
        let folded = fold_attachment(&attachment, 3);
        assert!(folded.starts_with("--- BEGIN ATTACHED CSV ---\na,b\n"));
        assert!(folded.contains("[truncated 4 of 7 characters]"));
        assert!(folded.ends_with("--- END ATTACHED CSV ---"));
    }

    #[test]
    fn test_normalize_structured_answer() {
        let answer = normalize_answer(Generation::Structured(json!({
            "answer": "42",
            "reasoning": "deep thought",
            "confidenceScore": 0.9
        })));
        assert_eq!(answer.answer, "42");
        assert_eq!(answer.reasoning.as_deref(), Some("deep thought"));
        assert_eq!(answer.confidence_score, Some(0.9));
    }

    #[test]
    fn test_normalize_plain_text_answer() {
        let answer = normalize_answer(Generation::Text("Just text {not json".to_string()));
        assert_eq!(answer.answer, "Just text {not json");
        assert!(answer.reasoning.is_none());
    }

    #[test]
    fn test_normalize_object_without_answer_keeps_raw_text() {
        let raw = r#"{"foo": 1}"#.to_string();
        let answer = normalize_answer(Generation::Text(raw.clone()));
        assert_eq!(answer.answer, raw);
    }

    #[test]
    fn test_normalize_component_from_text() {
        let out = normalize_component(Generation::Text(
            "```json\n{\"componentCode\": \"<div/>\", \"description\": \"empty\"}\n```".to_string(),
        ));
        assert_eq!(out.component_code, "<div/>");
        let out = normalize_component(Generation::Text("export default () => null".to_string()));
        assert_eq!(out.component_code, "export default () => null");
    }
}
