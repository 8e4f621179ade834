//! Planner：把自然语言目标转换为网页动作计划
//!
//! 单次调用 LLM，不重试。解析顺序：整段严格 JSON → 第一个配平的 `[...]` → 最小安全计划。
//! 规划失败只会降级，永远不会作为错误向上传播。

use std::sync::Arc;

use serde_json::Value;

use crate::browser::{Action, Plan};
use crate::llm::{extract_json_array, GenerateOptions, LlmClient};
use crate::memory::Message;

const PLANNER_SYSTEM: &str = "You are the Universal Action Layer planner. You convert goals into precise \
web automation actions. Always return valid JSON arrays.";

/// 规划结果（含模型原文，便于展示与排查）
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    /// 模型原始输出；调用失败时为 None
    pub raw: Option<String>,
    /// 是否使用了最小安全计划
    pub degraded: bool,
}

/// Planner：持有 LLM 与默认目标地址
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    default_target: String,
    temperature: f32,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, default_target: impl Into<String>) -> Self {
        Self {
            llm,
            default_target: default_target.into(),
            temperature: 0.3,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// 空目标回退到默认地址
    pub fn resolve_target(&self, target: &str) -> String {
        let target = target.trim();
        if target.is_empty() {
            self.default_target.clone()
        } else {
            target.to_string()
        }
    }

    /// 生成计划；保证非空
    pub async fn plan(&self, goal: &str, target: &str) -> Plan {
        self.plan_detailed(goal, target).await.plan
    }

    pub async fn plan_detailed(&self, goal: &str, target: &str) -> PlanOutcome {
        let target = self.resolve_target(target);
        let messages = vec![
            Message::system(PLANNER_SYSTEM),
            Message::user(build_prompt(goal, &target)),
        ];
        let options = GenerateOptions::default().with_temperature(self.temperature);

        let raw = match self.llm.complete(&messages, &options).await {
            Ok(generation) => generation.into_text(),
            Err(e) => {
                tracing::warn!(error = %e, "planner generation failed, using fallback plan");
                return PlanOutcome {
                    plan: Plan::fallback(&target),
                    raw: None,
                    degraded: true,
                };
            }
        };

        match parse_plan(&raw) {
            Some(plan) => {
                tracing::info!(actions = plan.len(), "plan ready");
                PlanOutcome {
                    plan,
                    raw: Some(raw),
                    degraded: false,
                }
            }
            None => {
                tracing::warn!("planner output not parseable, using fallback plan");
                PlanOutcome {
                    plan: Plan::fallback(&target),
                    raw: Some(raw),
                    degraded: true,
                }
            }
        }
    }
}

/// 解析模型输出为计划；无法得到至少一个合法动作时返回 None
///
/// 数组中不在词表内或缺少参数的元素会被丢弃。
pub fn parse_plan(raw: &str) -> Option<Plan> {
    let items = extract_json_array(raw)?;
    let total = items.len();
    let actions: Vec<Action> = items
        .into_iter()
        .filter_map(|item: Value| serde_json::from_value::<Action>(item).ok())
        .filter(Action::is_well_formed)
        .collect();
    if actions.len() < total {
        tracing::warn!(dropped = total - actions.len(), "dropped invalid plan actions");
    }
    if actions.is_empty() {
        None
    } else {
        Some(Plan::new(actions))
    }
}

fn build_prompt(goal: &str, target: &str) -> String {
    format!(
        r#"Convert the user goal into a sequence of web automation actions.

User Goal: "{goal}"
Target URL: "{target}"

Available actions:
- navigate: {{ "type": "navigate", "url": "https://..." }}
- click: {{ "type": "click", "selector": "button.submit" }}
- type: {{ "type": "type", "selector": "input#email", "value": "text" }}
- scroll: {{ "type": "scroll" }}
- wait: {{ "type": "wait", "timeout": 1000 }}
- screenshot: {{ "type": "screenshot" }}
- extract: {{ "type": "extract" }}

Example output:
[
  {{ "type": "navigate", "url": "https://google.com" }},
  {{ "type": "type", "selector": "input[name='q']", "value": "AI news" }},
  {{ "type": "click", "selector": "input[type='submit']" }},
  {{ "type": "wait", "timeout": 2000 }},
  {{ "type": "screenshot" }}
]

Return ONLY the JSON array, no explanation."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ModelError;
    use crate::llm::{ScriptedLlmClient, ScriptedReply};

    fn planner(reply: ScriptedReply) -> Planner {
        let llm = ScriptedLlmClient::new().otherwise(reply);
        Planner::new(Arc::new(llm), "https://google.com")
    }

    #[tokio::test]
    async fn test_strict_json_plan() {
        let p = planner(ScriptedReply::Text(
            r#"[{"type":"navigate","url":"https://x.test"},{"type":"scroll"}]"#.to_string(),
        ));
        let outcome = p.plan_detailed("scroll x", "https://x.test").await;
        assert!(!outcome.degraded);
        assert_eq!(
            outcome.plan.actions(),
            &[Action::navigate("https://x.test"), Action::Scroll]
        );
    }

    #[tokio::test]
    async fn test_array_embedded_in_prose() {
        let p = planner(ScriptedReply::Text(
            "Here is the plan:\n```json\n[{\"type\":\"click\",\"selector\":\"#go\"}]\n```\nGood luck!"
                .to_string(),
        ));
        let plan = p.plan("click go", "").await;
        assert_eq!(plan.actions(), &[Action::click("#go")]);
    }

    #[tokio::test]
    async fn test_garbage_falls_back() {
        for garbage in ["", "I cannot help with that", "[not json at all", "[]", "{\"a\": 1}"] {
            let p = planner(ScriptedReply::Text(garbage.to_string()));
            let outcome = p.plan_detailed("anything", "https://x.test").await;
            assert!(outcome.degraded, "input {:?}", garbage);
            assert_eq!(outcome.plan, Plan::fallback("https://x.test"));
        }
    }

    #[tokio::test]
    async fn test_model_error_falls_back_to_default_target() {
        let p = planner(ScriptedReply::Fail(ModelError::Timeout(60)));
        let outcome = p.plan_detailed("anything", "   ").await;
        assert!(outcome.degraded);
        assert!(outcome.raw.is_none());
        assert_eq!(outcome.plan, Plan::fallback("https://google.com"));
    }

    #[test]
    fn test_invalid_elements_dropped() {
        let plan = parse_plan(
            r#"[{"type":"hover","selector":"a"},{"type":"click","selector":""},{"type":"wait","timeout":10}]"#,
        )
        .unwrap();
        assert_eq!(plan.actions(), &[Action::wait(10)]);
    }

    #[test]
    fn test_prompt_contains_vocabulary_and_example() {
        let prompt = build_prompt("find news", "https://news.test");
        assert!(prompt.contains("\"https://news.test\""));
        assert!(prompt.contains("Example output"));
        assert!(prompt.contains("\"type\": \"extract\""));
    }
}
