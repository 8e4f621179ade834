//! Synthesis：把数据集（CSV / JSON 附件）整理成图文报告
//!
//! profile → narrative → {charts, tables} 并行；组装时按 文本 / 图表 / 表格 交错成有序内容块。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::pipeline::{
    field_text, prompt_input, Pipeline, PipelineBuilder, PipelineRunner, PipelineStage, PROMPT_FIELD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChartDatum {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub title: String,
    pub chart_type: ChartType,
    pub data: Vec<ChartDatum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// 报告中的一个内容块
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { content: String },
    Chart(Chart),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOutput {
    pub summary: String,
    pub key_findings: Vec<String>,
    pub content: Vec<ContentBlock>,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
struct Profile {
    summary: String,
    key_findings: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Narrative {
    /// 报告正文段落
    narrative: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Charts {
    charts: Vec<Chart>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Tables {
    tables: Vec<Table>,
}

/// 合并后的记录
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Assembled {
    summary: String,
    key_findings: Vec<String>,
    narrative: Vec<String>,
    charts: Vec<Chart>,
    tables: Vec<Table>,
}

impl Assembled {
    fn into_output(self) -> SynthesisOutput {
        let mut narrative = self.narrative.into_iter();
        let mut charts = self.charts.into_iter();
        let mut tables = self.tables.into_iter();
        let mut content = Vec::new();
        loop {
            let text = narrative.next().map(|content| ContentBlock::Text { content });
            let chart = charts.next().map(ContentBlock::Chart);
            let table = tables.next().map(ContentBlock::Table);
            if text.is_none() && chart.is_none() && table.is_none() {
                break;
            }
            content.extend(text.into_iter().chain(chart).chain(table));
        }
        SynthesisOutput {
            summary: self.summary,
            key_findings: self.key_findings,
            content,
        }
    }
}

pub fn synthesis_pipeline() -> Result<Pipeline, PipelineError> {
    PipelineBuilder::new("synthesis")
        .input_fields([PROMPT_FIELD])
        .seed(
            PipelineStage::structured::<Profile, _>("profile", |r| {
                format!(
                    r#"You are "Synthesis", a senior data analyst. Study the request and dataset below.

{}

Provide summary (one paragraph describing the dataset) and keyFindings (3-5 short findings)."#,
                    field_text(r, PROMPT_FIELD)
                )
            })
            .requires([PROMPT_FIELD])
            .produces(["summary", "keyFindings"]),
        )
        .then(
            PipelineStage::structured::<Narrative, _>("narrative", |r| {
                format!(
                    r#"You are "Synthesis", a senior data analyst.

Summary: {}
Key findings: {}

Write the report body as narrative: an array of 2-4 paragraphs that explain the findings."#,
                    field_text(r, "summary"),
                    field_text(r, "keyFindings")
                )
            })
            .requires(["summary", "keyFindings"])
            .produces(["narrative"]),
        )
        .fan_out(
            PipelineStage::structured::<Charts, _>("charts", |r| {
                format!(
                    r#"You are "Synthesis", a senior data analyst.

Summary: {}
Key findings: {}

Propose 1-3 charts that visualize the findings. For each: title, chartType ("bar" or "pie") and data (an array of {{"name", "value"}})."#,
                    field_text(r, "summary"),
                    field_text(r, "keyFindings")
                )
            })
            .requires(["summary", "keyFindings"])
            .produces(["charts"]),
        )
        .fan_out(
            PipelineStage::structured::<Tables, _>("tables", |r| {
                format!(
                    r#"You are "Synthesis", a senior data analyst.

Summary: {}
Key findings: {}

Produce 1-2 summary tables. For each: title, headers (column names) and rows (arrays of cell strings, same length as headers)."#,
                    field_text(r, "summary"),
                    field_text(r, "keyFindings")
                )
            })
            .requires(["summary", "keyFindings"])
            .produces(["tables"]),
        )
        .build()
}

pub async fn run_synthesis(runner: &PipelineRunner, prompt: &str) -> Result<SynthesisOutput, PipelineError> {
    let pipeline = synthesis_pipeline()?;
    let assembled: Assembled = runner
        .run(&pipeline, prompt_input(prompt))
        .await?
        .into_typed()?;
    Ok(assembled.into_output())
}
