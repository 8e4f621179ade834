//! 流水线构建器
//!
//! 形状固定为：seed → 依赖链 → 并行 fan-out。build() 用字段依赖边校验 DAG：
//! 每条边 producer → consumer 都必须从更早的位置指向更晚的位置，fan-out 成员之间不允许有边。

use std::collections::{HashMap, HashSet};

use crate::core::PipelineError;
use crate::pipeline::stage::PipelineStage;

/// 已校验的流水线定义（不可变，可重复运行）
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    input_fields: Vec<String>,
    seed: PipelineStage,
    chain: Vec<PipelineStage>,
    fan_out: Vec<PipelineStage>,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_fields(&self) -> &[String] {
        &self.input_fields
    }

    pub fn seed(&self) -> &PipelineStage {
        &self.seed
    }

    pub fn chain(&self) -> &[PipelineStage] {
        &self.chain
    }

    pub fn fan_out(&self) -> &[PipelineStage] {
        &self.fan_out
    }

    /// 全部阶段数
    pub fn len(&self) -> usize {
        1 + self.chain.len() + self.fan_out.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// 流水线构建器
pub struct PipelineBuilder {
    name: String,
    input_fields: Vec<String>,
    seed: Option<PipelineStage>,
    chain: Vec<PipelineStage>,
    fan_out: Vec<PipelineStage>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input_fields: Vec::new(),
            seed: None,
            chain: Vec::new(),
            fan_out: Vec::new(),
        }
    }

    /// 声明 seed 可读取的输入字段
    pub fn input_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn seed(mut self, stage: PipelineStage) -> Self {
        self.seed = Some(stage);
        self
    }

    /// 追加依赖链阶段
    pub fn then(mut self, stage: PipelineStage) -> Self {
        self.chain.push(stage);
        self
    }

    /// 追加并行 fan-out 成员
    pub fn fan_out(mut self, stage: PipelineStage) -> Self {
        self.fan_out.push(stage);
        self
    }

    /// 构建并校验
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let seed = self.seed.ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!("pipeline '{}' has no seed stage", self.name))
        })?;

        let pipeline = Pipeline {
            name: self.name,
            input_fields: self.input_fields,
            seed,
            chain: self.chain,
            fan_out: self.fan_out,
        };
        validate(&pipeline)?;
        Ok(pipeline)
    }
}

/// 位置：seed = 0，链上第 i 个 = i + 1，fan-out 共用最后一个位置
fn positions(pipeline: &Pipeline) -> Vec<(&PipelineStage, usize)> {
    let fan_out_at = pipeline.chain.len() + 1;
    std::iter::once((&pipeline.seed, 0))
        .chain(pipeline.chain.iter().enumerate().map(|(i, s)| (s, i + 1)))
        .chain(pipeline.fan_out.iter().map(|s| (s, fan_out_at)))
        .collect()
}

/// producer 的产出字段是否覆盖 required（相同，或 required 是其子路径）
fn covers(produced: &str, required: &str) -> bool {
    required == produced
        || required
            .strip_prefix(produced)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// 字段依赖边：consumer 需要的每个字段指向所有能产出它的阶段
struct StageGraph<'a> {
    edges: HashMap<&'a str, Vec<(&'a str, &'a str)>>,
}

impl<'a> StageGraph<'a> {
    fn new(stages: &[(&'a PipelineStage, usize)]) -> Self {
        let mut edges: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        for (consumer, _) in stages {
            let entry = edges.entry(consumer.name()).or_default();
            for field in consumer.required_fields() {
                for (producer, _) in stages {
                    if producer.name() == consumer.name() {
                        continue;
                    }
                    if producer
                        .produced_fields()
                        .iter()
                        .any(|p| covers(p, field))
                    {
                        entry.push((producer.name(), field.as_str()));
                    }
                }
            }
        }
        Self { edges }
    }

    fn producers_of(&self, consumer: &str) -> &[(&'a str, &'a str)] {
        self.edges.get(consumer).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn validate(pipeline: &Pipeline) -> Result<(), PipelineError> {
    let invalid = |msg: String| {
        Err(PipelineError::InvalidConfiguration(format!(
            "pipeline '{}': {}",
            pipeline.name, msg
        )))
    };

    let stages = positions(pipeline);

    let mut names = HashSet::new();
    for (stage, _) in &stages {
        if stage.name().trim().is_empty() {
            return invalid("stage name must not be empty".to_string());
        }
        if !names.insert(stage.name()) {
            return invalid(format!("duplicate stage name '{}'", stage.name()));
        }
        if stage.produced_fields().is_empty() {
            return invalid(format!("stage '{}' declares no output fields", stage.name()));
        }
    }

    for field in pipeline.seed.required_fields() {
        if !pipeline.input_fields.iter().any(|f| f == field) {
            return invalid(format!(
                "seed stage '{}' requires '{}' which is not a declared input field",
                pipeline.seed.name(),
                field
            ));
        }
    }

    let position: HashMap<&str, usize> = stages.iter().map(|(s, p)| (s.name(), *p)).collect();
    let graph = StageGraph::new(&stages);

    for (stage, at) in stages.iter().skip(1) {
        let producers = graph.producers_of(stage.name());
        for field in stage.required_fields() {
            let earlier = producers
                .iter()
                .filter(|(_, f)| *f == field.as_str())
                .any(|(p, _)| position.get(p).is_some_and(|pp| pp < at));
            if !earlier {
                return invalid(format!(
                    "stage '{}' requires '{}' but no earlier stage produces it",
                    stage.name(),
                    field
                ));
            }
        }
        // 同一位置（fan-out 成员之间）不能存在依赖
        if let Some((sibling, field)) = producers
            .iter()
            .find(|(p, _)| position.get(p) == Some(at))
        {
            return invalid(format!(
                "fan-out stage '{}' depends on sibling '{}' via '{}'",
                stage.name(),
                sibling,
                field
            ));
        }
    }

    Ok(())
}
