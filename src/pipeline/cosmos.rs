//! Cosmos：由一句设定生成完整的世界观设定集
//!
//! lore → factions → characters → {主视觉, 世界地图} 并行出图

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::PipelineError;
use crate::pipeline::{
    bullet_list, field_text, prompt_input, Pipeline, PipelineBuilder, PipelineRunner, PipelineStage,
    PROMPT_FIELD,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HistorySection {
    /// 主题化标题，如 "The Ashen Ages"
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Faction {
    pub name: String,
    pub description: String,
    pub emblem_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub description: String,
    pub portrait_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldImages {
    pub main: String,
    pub map: String,
}

/// 完整设定集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosmosOutput {
    pub title: String,
    pub tagline: String,
    pub description: String,
    pub history: HistorySection,
    pub factions: Vec<Faction>,
    pub characters: Vec<Character>,
    pub images: WorldImages,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Lore {
    title: String,
    tagline: String,
    description: String,
    history: HistorySection,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Factions {
    factions: Vec<Faction>,
}

#[derive(Deserialize, JsonSchema)]
#[allow(dead_code)]
struct Characters {
    characters: Vec<Character>,
}

pub fn cosmos_pipeline() -> Result<Pipeline, PipelineError> {
    PipelineBuilder::new("cosmos")
        .input_fields([PROMPT_FIELD])
        .seed(
            PipelineStage::structured::<Lore, _>("lore", |r| {
                format!(
                    r#"You are "Cosmos", a master world-builder AI. Create a rich, consistent lorebook for a fictional universe.

Concept:
{}

Provide:
1. title: an evocative name for the universe.
2. tagline: a short, memorable tagline.
3. description: one paragraph covering the core concept, setting and major conflicts.
4. history: a summary of the world's history by ages or key events, with a thematic title (e.g. "The Ashen Ages")."#,
                    field_text(r, PROMPT_FIELD)
                )
            })
            .requires([PROMPT_FIELD])
            .produces(["title", "tagline", "description", "history"]),
        )
        .then(
            PipelineStage::structured::<Factions, _>("factions", |r| {
                format!(
                    r#"You are "Cosmos", a master world-builder AI.

Universe: {}
Description: {}

Generate exactly 3 distinct factions. For each: name, description (goals, methods, power) and emblemUrl.
Use 'https://picsum.photos/seed/emblem_<name>/200/200' for emblemUrl, where <name> is a single lowercase word from the faction's name."#,
                    field_text(r, "title"),
                    field_text(r, "description")
                )
            })
            .requires(["title", "description"])
            .produces(["factions"]),
        )
        .then(
            PipelineStage::structured::<Characters, _>("characters", |r| {
                format!(
                    r#"You are "Cosmos", a master world-builder AI.

Universe: {}
Description: {}
Factions:
{}

Generate 2-3 notable characters (leaders, rebels, explorers...). For each: name, description (short biography and role) and portraitUrl.
Use 'https://picsum.photos/seed/portrait_<name>/400/600' for portraitUrl, where <name> is a single lowercase word from the character's name."#,
                    field_text(r, "title"),
                    field_text(r, "description"),
                    bullet_list(r, "factions", "name", "description")
                )
            })
            .requires(["title", "description", "factions"])
            .produces(["characters"]),
        )
        .fan_out(
            PipelineStage::image("main_image", "images.main", |r| {
                format!(
                    "A breathtaking, cinematic, ultra-detailed fantasy digital painting of the world of \"{}\". Theme: {}. Do not include any text.",
                    field_text(r, "title"),
                    field_text(r, "tagline")
                )
            })
            .requires(["title", "tagline"]),
        )
        .fan_out(
            PipelineStage::image("map_image", "images.map", |r| {
                format!(
                    "A detailed, antique fantasy world map for a world called \"{}\", hand-drawn in the style of a fantasy novel, with old paper texture, calligraphic labels, continents, oceans, mountain ranges and forests.",
                    field_text(r, "title")
                )
            })
            .requires(["title"]),
        )
        .build()
}

pub async fn run_cosmos(runner: &PipelineRunner, prompt: &str) -> Result<CosmosOutput, PipelineError> {
    let pipeline = cosmos_pipeline()?;
    runner
        .run(&pipeline, prompt_input(prompt))
        .await?
        .into_typed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosmos_shape() {
        let pipeline = cosmos_pipeline().unwrap();
        assert_eq!(pipeline.seed().name(), "lore");
        let chain: Vec<&str> = pipeline.chain().iter().map(|s| s.name()).collect();
        assert_eq!(chain, ["factions", "characters"]);
        assert_eq!(pipeline.fan_out().len(), 2);
    }
}
