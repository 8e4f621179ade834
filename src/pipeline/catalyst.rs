//! Catalyst：为一个主题生成学习路径

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::pipeline::{
    bullet_list, field_text, prompt_input, Pipeline, PipelineBuilder, PipelineRunner, PipelineStage,
    PROMPT_FIELD,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Module {
    pub title: String,
    pub summary: String,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// 必须与 options 中的某一项完全一致
    pub correct_answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseImages {
    pub cover: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalystOutput {
    pub title: String,
    pub description: String,
    pub prerequisites: Vec<String>,
    pub modules: Vec<Module>,
    pub quiz: Vec<QuizQuestion>,
    pub images: CourseImages,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Outline {
    title: String,
    description: String,
    prerequisites: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Modules {
    modules: Vec<Module>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Quiz {
    quiz: Vec<QuizQuestion>,
}

pub fn catalyst_pipeline() -> Result<Pipeline, PipelineError> {
    PipelineBuilder::new("catalyst")
        .input_fields([PROMPT_FIELD])
        .seed(
            PipelineStage::structured::<Outline, _>("outline", |r| {
                format!(
                    r#"You are "Catalyst", an expert curriculum designer. Design a learning path for:

{}

Provide title, a one-paragraph description, and prerequisites (a list of things the learner should already know)."#,
                    field_text(r, PROMPT_FIELD)
                )
            })
            .requires([PROMPT_FIELD])
            .produces(["title", "description", "prerequisites"]),
        )
        .then(
            PipelineStage::structured::<Modules, _>("modules", |r| {
                format!(
                    r#"You are "Catalyst", an expert curriculum designer.

Course: {}
Description: {}

Break the course into 3-6 ordered modules. For each: title, summary and topics (a list of key topics)."#,
                    field_text(r, "title"),
                    field_text(r, "description")
                )
            })
            .requires(["title", "description"])
            .produces(["modules"]),
        )
        .fan_out(
            PipelineStage::structured::<Quiz, _>("quiz", |r| {
                format!(
                    r#"You are "Catalyst", an expert curriculum designer.

Course: {}
Modules:
{}

Write a final quiz of 5 multiple-choice questions covering the modules. For each: question, options (4 choices) and correctAnswer (exactly one of the options)."#,
                    field_text(r, "title"),
                    bullet_list(r, "modules", "title", "summary")
                )
            })
            .requires(["title", "modules"])
            .produces(["quiz"]),
        )
        .fan_out(
            PipelineStage::image("cover_image", "images.cover", |r| {
                format!(
                    "A clean, modern course cover illustration for \"{}\". Minimalist, vibrant, no text.",
                    field_text(r, "title")
                )
            })
            .requires(["title"]),
        )
        .build()
}

pub async fn run_catalyst(runner: &PipelineRunner, prompt: &str) -> Result<CatalystOutput, PipelineError> {
    let pipeline = catalyst_pipeline()?;
    runner
        .run(&pipeline, prompt_input(prompt))
        .await?
        .into_typed()
}
