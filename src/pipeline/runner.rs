//! 流水线执行器
//!
//! seed 只读输入；链上阶段只读累积记录，逐个顺序执行；fan-out 成员并发发出、全部落定后
//! 按声明顺序取第一个失败。任何失败都不返回部分结果。

use std::sync::Arc;
use std::time::Instant;

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;

use crate::core::PipelineError;
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::Message;
use crate::pipeline::builder::Pipeline;
use crate::pipeline::stage::{
    deep_merge, has_field, has_value, nest, PipelineStage, Record, StageKind,
};

/// 流水线结果：所有阶段输出的深度合并（不可变）
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pipeline: String,
    record: Record,
    stages: Vec<String>,
}

impl PipelineResult {
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// 已完成的阶段名（按完成顺序；fan-out 成员按声明顺序）
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// 反序列化为领域类型
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T, PipelineError> {
        serde_json::from_value(Value::Object(self.record)).map_err(|e| PipelineError::StageFailed {
            stage: "assembly".to_string(),
            reason: e.to_string(),
        })
    }
}

/// 流水线执行器
pub struct PipelineRunner {
    llm: Arc<dyn LlmClient>,
    temperature: f32,
    image_model: Option<String>,
}

impl PipelineRunner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            temperature: 0.8,
            image_model: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_image_model(mut self, model: Option<String>) -> Self {
        self.image_model = model;
        self
    }

    pub async fn run(&self, pipeline: &Pipeline, input: Record) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        let mut completed = Vec::with_capacity(pipeline.len());

        // 1. seed
        let seed = pipeline.seed();
        ensure_inputs(seed, &input)?;
        let seed_out = self
            .invoke(pipeline, seed, &input)
            .await
            .map_err(|reason| PipelineError::SeedFailed {
                stage: seed.name().to_string(),
                reason,
            })?;
        let mut record = Record::new();
        deep_merge(&mut record, seed_out);
        completed.push(seed.name().to_string());

        // 2. 依赖链
        for stage in pipeline.chain() {
            ensure_inputs(stage, &record)?;
            let out = self
                .invoke(pipeline, stage, &record)
                .await
                .map_err(|reason| PipelineError::StageFailed {
                    stage: stage.name().to_string(),
                    reason,
                })?;
            deep_merge(&mut record, out);
            completed.push(stage.name().to_string());
        }

        // 3. fan-out：先校验所有成员的输入，再一起发出
        for stage in pipeline.fan_out() {
            ensure_inputs(stage, &record)?;
        }
        let settled = join_all(
            pipeline
                .fan_out()
                .iter()
                .map(|stage| self.invoke(pipeline, stage, &record)),
        )
        .await;

        let mut outputs = Vec::with_capacity(settled.len());
        for (stage, result) in pipeline.fan_out().iter().zip(settled) {
            match result {
                Ok(out) => outputs.push((stage.name(), out)),
                Err(reason) => {
                    tracing::warn!(
                        pipeline = %pipeline.name(),
                        stage = %stage.name(),
                        reason = %reason,
                        "fan-out member failed, discarding sibling outputs"
                    );
                    return Err(PipelineError::FanOutFailed {
                        stage: stage.name().to_string(),
                        reason,
                    });
                }
            }
        }

        // 4. 组装
        for (name, out) in outputs {
            deep_merge(&mut record, out);
            completed.push(name.to_string());
        }

        tracing::info!(
            pipeline = %pipeline.name(),
            stages = completed.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "pipeline completed"
        );

        Ok(PipelineResult {
            pipeline: pipeline.name().to_string(),
            record,
            stages: completed,
        })
    }

    /// 调用一次生成能力并把输出整理成只含声明字段的记录
    async fn invoke(
        &self,
        pipeline: &Pipeline,
        stage: &PipelineStage,
        record: &Record,
    ) -> Result<Record, String> {
        let started = Instant::now();
        let prompt = stage.build_prompt(record);

        let out = match stage.kind() {
            StageKind::Structured { schema, validate, at } => {
                let messages = vec![
                    Message::system(format!(
                        "Pipeline: {}\nStage: {}",
                        pipeline.name(),
                        stage.name()
                    )),
                    Message::user(prompt),
                ];
                let options = GenerateOptions::default()
                    .with_temperature(self.temperature)
                    .with_schema(schema.clone());
                let object = self
                    .llm
                    .complete(&messages, &options)
                    .await
                    .and_then(|generation| generation.into_object())
                    .map_err(|e| e.to_string())?;
                let value = Value::Object(object);
                validate(&value).map_err(|e| format!("invalid output: {}", e))?;

                match (at, value) {
                    (Some(path), value) => nest(path, value),
                    (None, Value::Object(object)) => select_produced(stage, object),
                    (None, _) => return Err("expected JSON object".to_string()),
                }
            }
            StageKind::Image { path } => {
                let mut options = GenerateOptions::default();
                if let Some(model) = &self.image_model {
                    options = options.with_model(model.clone());
                }
                let url = self
                    .llm
                    .generate_image(&prompt, &options)
                    .await
                    .map_err(|e| e.to_string())?;
                if url.trim().is_empty() {
                    return Err("empty image url".to_string());
                }
                nest(path, Value::String(url))
            }
        };

        if let Some(field) = stage
            .produced_fields()
            .iter()
            .find(|field| !has_value(&out, field))
        {
            return Err(format!("output is missing field '{}'", field));
        }

        tracing::debug!(
            pipeline = %pipeline.name(),
            stage = %stage.name(),
            duration_ms = started.elapsed().as_millis() as u64,
            "stage settled"
        );
        Ok(out)
    }
}

/// 只保留声明为产出的顶层字段，避免覆盖前面阶段的结果
fn select_produced(stage: &PipelineStage, mut object: Record) -> Record {
    let mut out = Record::new();
    for field in stage.produced_fields() {
        let top = field.split('.').next().unwrap_or(field);
        if let Some(value) = object.remove(top) {
            out.insert(top.to_string(), value);
        }
    }
    out
}

fn ensure_inputs(stage: &PipelineStage, record: &Record) -> Result<(), PipelineError> {
    match stage
        .required_fields()
        .iter()
        .find(|field| !has_field(record, field))
    {
        Some(field) => Err(PipelineError::MissingInput {
            stage: stage.name().to_string(),
            field: field.clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ModelError;
    use crate::llm::{ScriptedLlmClient, ScriptedReply};
    use crate::pipeline::PipelineBuilder;
    use serde_json::json;

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Titled {
        title: String,
    }

    #[derive(serde::Deserialize, schemars::JsonSchema)]
    #[allow(dead_code)]
    struct Listed {
        items: Vec<String>,
    }

    fn pipeline() -> Pipeline {
        PipelineBuilder::new("demo")
            .input_fields(["prompt"])
            .seed(
                PipelineStage::structured::<Titled, _>("seed", |r| {
                    format!("Make a title for {}", crate::pipeline::field_text(r, "prompt"))
                })
                .requires(["prompt"])
                .produces(["title"]),
            )
            .then(
                PipelineStage::structured::<Listed, _>("list", |r| {
                    format!("List items for {}", crate::pipeline::field_text(r, "title"))
                })
                .requires(["title"])
                .produces(["items"]),
            )
            .fan_out(PipelineStage::image("cover", "images.cover", |r| {
                format!("cover art for {}", crate::pipeline::field_text(r, "title"))
            }))
            .build()
            .unwrap()
    }

    fn input() -> Record {
        json!({"prompt": "a city"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_full_run_merges_outputs() {
        let llm = ScriptedLlmClient::new()
            .on("Stage: seed", ScriptedReply::Structured(json!({"title": "Metro", "extra": 1})))
            .on("Stage: list", ScriptedReply::Structured(json!({"items": ["a", "b"]})))
            .on("cover art", ScriptedReply::Image("https://img/cover.png".to_string()));
        let runner = PipelineRunner::new(Arc::new(llm));

        let result = runner.run(&pipeline(), input()).await.unwrap();
        assert_eq!(
            Value::Object(result.record().clone()),
            json!({"title": "Metro", "items": ["a", "b"], "images": {"cover": "https://img/cover.png"}})
        );
        assert_eq!(result.stages(), &["seed", "list", "cover"]);
    }

    #[tokio::test]
    async fn test_seed_missing_field_fails_fast() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .on("Stage: seed", ScriptedReply::Structured(json!({"name": "x"})))
                .otherwise(ScriptedReply::Structured(json!({"items": ["a"]}))),
        );
        let runner = PipelineRunner::new(llm.clone());

        let err = runner.run(&pipeline(), input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SeedFailed { .. }));
        assert_eq!(llm.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_list_is_a_valid_output() {
        let llm = ScriptedLlmClient::new()
            .on("Stage: seed", ScriptedReply::Structured(json!({"title": "Metro"})))
            .on("Stage: list", ScriptedReply::Structured(json!({"items": []})))
            .on("cover art", ScriptedReply::Image("https://img/cover.png".to_string()));
        let runner = PipelineRunner::new(Arc::new(llm));

        let result = runner.run(&pipeline(), input()).await.unwrap();
        assert_eq!(result.record()["items"], json!([]));
        assert_eq!(result.stages().len(), 3);
    }

    #[tokio::test]
    async fn test_null_output_field_fails_stage() {
        let llm = ScriptedLlmClient::new()
            .on("Stage: seed", ScriptedReply::Structured(json!({"title": "Metro"})))
            .on("Stage: list", ScriptedReply::Structured(json!({"items": null})));
        let runner = PipelineRunner::new(Arc::new(llm));

        let err = runner.run(&pipeline(), input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StageFailed { ref stage, .. } if stage == "list"));
    }

    #[tokio::test]
    async fn test_missing_input_never_calls_model() {
        let llm = Arc::new(ScriptedLlmClient::new());
        let runner = PipelineRunner::new(llm.clone());

        let err = runner.run(&pipeline(), Record::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { ref field, .. } if field == "prompt"));
        assert!(llm.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_image_url_fails_fan_out() {
        let llm = ScriptedLlmClient::new()
            .on("Stage: seed", ScriptedReply::Structured(json!({"title": "Metro"})))
            .on("Stage: list", ScriptedReply::Structured(json!({"items": ["a"]})))
            .on("cover art", ScriptedReply::Image("  ".to_string()));
        let runner = PipelineRunner::new(Arc::new(llm));

        let err = runner.run(&pipeline(), input()).await.unwrap_err();
        assert!(matches!(err, PipelineError::FanOutFailed { ref stage, .. } if stage == "cover"));
    }

    #[tokio::test]
    async fn test_chain_failure_aborts() {
        let llm = ScriptedLlmClient::new()
            .on("Stage: seed", ScriptedReply::Structured(json!({"title": "Metro"})))
            .on("Stage: list", ScriptedReply::Fail(ModelError::Quota("429".to_string())));
        let runner = PipelineRunner::new(Arc::new(llm));

        let err = runner.run(&pipeline(), input()).await.unwrap_err();
        assert_eq!(err.stage(), Some("list"));
        assert!(err.to_string().contains("quota"));
    }
}
