//! Crucible：让多个对立角色同时评审一份计划
//!
//! digest（摘要与隐含假设）→ 每个选中角色一个并行评审成员。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::pipeline::{
    field_text, lookup, prompt_input, Pipeline, PipelineBuilder, PipelineRunner, PipelineStage,
    PROMPT_FIELD,
};

/// 评审角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub static PERSONAS: [Persona; 6] = [
    Persona {
        id: "cfo",
        name: "The Skeptical CFO",
        description: "Focuses on budget holes, unsustainable costs, and lack of a clear revenue model.",
    },
    Persona {
        id: "competitor_ceo",
        name: "The Competitor's CEO",
        description: "Identifies market vulnerabilities, competitive threats, and areas a rival could easily exploit.",
    },
    Persona {
        id: "ethicist",
        name: "The Devil's Advocate Ethicist",
        description: "Questions the moral, societal, and long-term unintended consequences of the plan.",
    },
    Persona {
        id: "customer",
        name: "The Jaded Customer",
        description: "Points out user experience flaws, friction points, and why they wouldn't adopt or pay for it.",
    },
    Persona {
        id: "engineer",
        name: "The Pragmatic Engineer",
        description: "Critiques technical feasibility, scalability issues, and hidden implementation complexities.",
    },
    Persona {
        id: "legal",
        name: "The Cautious Legal Counsel",
        description: "Identifies potential regulatory hurdles, data privacy risks, and intellectual property issues.",
    },
];

impl Persona {
    pub fn find(id: &str) -> Option<&'static Persona> {
        PERSONAS.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Critique {
    pub persona_name: String,
    pub analysis: String,
    pub key_concerns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrucibleOutput {
    pub summary: String,
    pub assumptions: Vec<String>,
    /// 与选择顺序一致
    pub critiques: Vec<Critique>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Digest {
    summary: String,
    assumptions: Vec<String>,
}

fn critique_path(persona: &Persona) -> String {
    format!("critiques.{}", persona.id)
}

/// 选择 → 角色；重复选择只保留第一次出现的位置
fn resolve(selection: &[String]) -> Result<Vec<&'static Persona>, PipelineError> {
    if selection.is_empty() {
        return Err(PipelineError::InvalidConfiguration(
            "select at least one adversary persona".to_string(),
        ));
    }
    let mut personas: Vec<&'static Persona> = Vec::with_capacity(selection.len());
    for id in selection {
        let persona = Persona::find(id.trim()).ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!("unknown persona '{}'", id))
        })?;
        if !personas.iter().any(|p| p.id == persona.id) {
            personas.push(persona);
        }
    }
    Ok(personas)
}

pub fn crucible_pipeline(selection: &[String]) -> Result<Pipeline, PipelineError> {
    let personas = resolve(selection)?;

    let mut builder = PipelineBuilder::new("crucible")
        .input_fields([PROMPT_FIELD])
        .seed(
            PipelineStage::structured::<Digest, _>("digest", |r| {
                format!(
                    r#"You are "Crucible", a strategic review board. Read the plan below.

{}

Provide summary (a neutral one-paragraph restatement of the plan) and assumptions (the key assumptions it depends on)."#,
                    field_text(r, PROMPT_FIELD)
                )
            })
            .requires([PROMPT_FIELD])
            .produces(["summary", "assumptions"]),
        );

    for persona in personas {
        builder = builder.fan_out(
            PipelineStage::structured::<Critique, _>(format!("critique_{}", persona.id), move |r| {
                format!(
                    r#"You are {}. {}

Plan summary: {}
Stated assumptions: {}

Critique this plan ruthlessly from your perspective. Provide personaName ("{}"), analysis (2-3 paragraphs) and keyConcerns (3-5 short items)."#,
                    persona.name,
                    persona.description,
                    field_text(r, "summary"),
                    field_text(r, "assumptions"),
                    persona.name
                )
            })
            .requires(["summary", "assumptions"])
            .nested_at(critique_path(persona)),
        );
    }

    builder.build()
}

pub async fn run_crucible(
    runner: &PipelineRunner,
    plan: &str,
    selection: &[String],
) -> Result<CrucibleOutput, PipelineError> {
    let pipeline = crucible_pipeline(selection)?;
    let result = runner.run(&pipeline, prompt_input(plan)).await?;

    let mut critiques = Vec::new();
    for persona in resolve(selection)? {
        let value = lookup(result.record(), &critique_path(persona)).cloned();
        let critique: Critique = value
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| PipelineError::StageFailed {
                stage: "assembly".to_string(),
                reason: format!("missing critique for '{}'", persona.id),
            })?;
        critiques.push(critique);
    }

    #[derive(Deserialize)]
    struct Head {
        summary: String,
        assumptions: Vec<String>,
    }
    let head: Head = result.into_typed()?;

    Ok(CrucibleOutput {
        summary: head.summary,
        assumptions: head.assumptions,
        critiques,
    })
}
