//! 多阶段内容流水线
//!
//! seed → 依赖链 → 并行 fan-out → 组装。四个领域特化：
//! - cosmos：世界观设定集
//! - catalyst：课程大纲
//! - synthesis：数据集报告
//! - crucible：多角色红队评审

pub mod builder;
pub mod catalyst;
pub mod cosmos;
pub mod crucible;
pub mod runner;
pub mod stage;
pub mod synthesis;

pub use builder::{Pipeline, PipelineBuilder};
pub use catalyst::{catalyst_pipeline, run_catalyst, CatalystOutput};
pub use cosmos::{cosmos_pipeline, run_cosmos, CosmosOutput};
pub use crucible::{crucible_pipeline, run_crucible, CrucibleOutput, Persona, PERSONAS};
pub use runner::{PipelineResult, PipelineRunner};
pub use stage::{deep_merge, field_text, lookup, PipelineStage, Record, StageKind};
pub use synthesis::{run_synthesis, synthesis_pipeline, SynthesisOutput};

/// 所有领域流水线共用的输入字段
pub const PROMPT_FIELD: &str = "prompt";

/// 构造只含 prompt 字段的输入
pub fn prompt_input(prompt: &str) -> Record {
    let mut input = Record::new();
    input.insert(
        PROMPT_FIELD.to_string(),
        serde_json::Value::String(prompt.to_string()),
    );
    input
}

/// 把对象数组渲染成 "- a: b" 形式的列表，供下游 prompt 使用
pub fn bullet_list(record: &Record, path: &str, label: &str, detail: &str) -> String {
    lookup(record, path)
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let text = |key: &str| item.get(key).and_then(|v| v.as_str()).unwrap_or("");
                    format!("- {}: {}", text(label), text(detail))
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}
