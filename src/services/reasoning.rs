// src/services/reasoning.rs
use std::sync::Arc;

use log::{debug, info};
use serde_json::Value;

use crate::errors::EcoScanError;
use crate::models::{
    DEFAULT_CO2_SAVED_KG, Difficulty, PreparedImage, ReasoningFinding, Suggestion, Verdict,
    VisionFinding,
};
use crate::services::llm_service::ModelBackend;
use crate::services::response_parser::{
    bool_field, extract_json_object, number_field, score_field, string_field, string_list_field,
};

const DEFAULT_CONFIDENCE: u8 = 50;
const DEFAULT_SUGGESTION_TITLE: &str = "Reuse idea";
const DEFAULT_CATEGORY: &str = "other";

const REASONING_PROMPT: &str = r#"You are a material sustainability analyst evaluating a discarded object for safe, practical reuse.

VISUAL INSPECTION REPORT (JSON, fields may be null):
{inspection}

Consider structural integrity, safety hazards (sharp edges, toxic residue, breakage risk),
whether contamination can be cleaned, remaining functionality, and whether someone would
realistically reuse it. Base your reasoning ONLY on the inspection report. Do not make
claims about chemical or food safety without clear evidence.

Return JSON with this structure:
{
  "object_type": "refined object name, or null",
  "material_composition": ["material", "..."],
  "condition_summary": "one sentence on overall condition",
  "safety_score": 0-100,
  "estimated_co2_saved_kg": number,
  "reuse_feasible": true/false,
  "confidence": 0-100,
  "verdict": "Reusable" OR "Conditionally Reusable" OR "Not Reusable",
  "reasoning": "why it is or isn't reusable",
  "key_factors": ["factor", "..."],
  "suggestions": [
    {
      "title": "specific upcycling idea",
      "category": "home_utility/outdoor/diy/storage/other",
      "difficulty": "Easy" OR "Medium" OR "Hard",
      "description": "why this works given the condition",
      "steps": ["step 1", "step 2"]
    }
  ]
}

Provide 2-5 suggestions when reuse is feasible. Mark damaged but cleanable items as
"Conditionally Reusable"; use "Not Reusable" only when truly unsafe or non-functional."#;

const STRICT_SUFFIX: &str = r#"

Your previous answer could not be parsed. Reply with ONE JSON object and nothing else:
no markdown, no code fences, no commentary. safety_score and confidence must be integers."#;

pub struct ReasoningEngine {
    backend: Arc<dyn ModelBackend>,
    include_image: bool,
}

impl ReasoningEngine {
    pub fn new(backend: Arc<dyn ModelBackend>, include_image: bool) -> Self {
        Self {
            backend,
            include_image,
        }
    }

    pub async fn analyze(
        &self,
        finding: &VisionFinding,
        image: &PreparedImage,
        strict: bool,
    ) -> Result<ReasoningFinding, EcoScanError> {
        let prompt = build_prompt(finding, strict)?;
        let payload = self.include_image.then(|| image.payload());
        let raw = self
            .backend
            .submit(&prompt, payload)
            .await
            .map_err(EcoScanError::from_reasoning_backend)?;
        debug!("Reasoning model returned {} chars", raw.len());

        let reasoning = parse_reasoning_response(&raw)?;
        info!(
            "Reasoning finding: verdict={:?}, safety={:?}, suggestions={}",
            reasoning.verdict,
            reasoning.safety_score,
            reasoning.suggestions.len()
        );
        Ok(reasoning)
    }
}

pub fn build_prompt(finding: &VisionFinding, strict: bool) -> Result<String, EcoScanError> {
    let inspection = serde_json::to_string_pretty(finding)
        .map_err(|e| EcoScanError::IncompleteAnalysis(format!("unserializable finding: {}", e)))?;
    let mut prompt = REASONING_PROMPT.replace("{inspection}", &inspection);
    if strict {
        prompt.push_str(STRICT_SUFFIX);
    }
    Ok(prompt)
}

pub fn parse_reasoning_response(raw: &str) -> Result<ReasoningFinding, EcoScanError> {
    let obj = extract_json_object(raw).map_err(EcoScanError::ReasoningParse)?;

    let confidence = score_field(&obj, &["confidence"]).unwrap_or(DEFAULT_CONFIDENCE);
    let reuse_feasible = bool_field(&obj, &["reuse_feasible", "reusable"]);
    let verdict = string_field(&obj, &["verdict"])
        .as_deref()
        .and_then(Verdict::parse_lenient)
        .or_else(|| reuse_feasible.map(|feasible| Verdict::from_feasibility(feasible, confidence)));

    let estimated_co2_saved_kg = number_field(&obj, &["estimated_co2_saved_kg", "co2_saved_kg"])
        .map(|kg| kg.max(0.0))
        .unwrap_or(DEFAULT_CO2_SAVED_KG);

    let suggestions = match obj.get("suggestions") {
        Some(Value::Array(items)) => items.iter().filter_map(parse_suggestion).collect(),
        _ => Vec::new(),
    };

    Ok(ReasoningFinding {
        safety_score: score_field(&obj, &["safety_score", "score"]),
        estimated_co2_saved_kg,
        suggestions,
        verdict,
        reuse_feasible,
        confidence,
        reasoning: string_field(&obj, &["reasoning", "explanation"]),
        key_factors: string_list_field(&obj, &["key_factors"]),
        object_type: string_field(&obj, &["object_type"]),
        material_composition: string_list_field(&obj, &["material_composition", "materials"]),
        condition_summary: string_field(&obj, &["condition_summary", "condition"]),
    })
}

fn parse_suggestion(value: &Value) -> Option<Suggestion> {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::String(title) if !title.trim().is_empty() => {
            return Some(Suggestion {
                title: title.trim().to_string(),
                category: DEFAULT_CATEGORY.to_string(),
                difficulty: Difficulty::default(),
                description: String::new(),
                steps: Vec::new(),
            });
        }
        _ => return None,
    };

    let title = string_field(obj, &["title", "use_case", "name"]);
    let description = string_field(obj, &["description", "explanation"]);
    if title.is_none() && description.is_none() {
        return None;
    }

    Some(Suggestion {
        title: title.unwrap_or_else(|| DEFAULT_SUGGESTION_TITLE.to_string()),
        category: string_field(obj, &["category"])
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        difficulty: string_field(obj, &["difficulty", "difficulty_level"])
            .as_deref()
            .and_then(Difficulty::parse_lenient)
            .unwrap_or_default(),
        description: description.unwrap_or_default(),
        steps: parse_steps(obj.get("steps")),
    })
}

fn parse_steps(value: Option<&Value>) -> Vec<String> {
    let lines: Vec<&str> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        Some(Value::String(text)) => text.lines().collect(),
        _ => return Vec::new(),
    };
    lines
        .into_iter()
        .map(strip_step_number)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// "3. Sand the edges" -> "Sand the edges"
fn strip_step_number(line: &str) -> &str {
    let trimmed = line.trim();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() != trimmed.len() {
        if let Some(stripped) = rest.strip_prefix(|c: char| c == '.' || c == ')') {
            return stripped.trim();
        }
    }
    trimmed
}
