// src/services/vision.rs
use std::sync::Arc;

use log::{debug, info};

use crate::errors::EcoScanError;
use crate::models::{PreparedImage, VisionFinding};
use crate::services::llm_service::ModelBackend;
use crate::services::response_parser::{
    extract_json_object, score_field, string_field, string_list_field, string_set_field,
};

const VISION_PROMPT: &str = r#"You are an expert material analyst examining a discarded object for reuse potential.

Look at the photo and describe only what you can SEE:
1. Object type: what is this item? (plastic bottle, metal can, cardboard box, fabric, glass jar, ...)
2. Materials: every material you can identify, most prominent first
3. Condition: surface quality, wear, scratches, dents, deformation, structural integrity
4. Damage: cracks, holes, tears, warping, broken parts
5. Contamination: dirt, stains, rust, mold, food residue
6. Safety: a preliminary 0-100 estimate of how safe the item is to handle and reuse

Return JSON with this structure:
{
  "object_type": "short name",
  "material_composition": ["material", "..."],
  "condition_summary": "one sentence",
  "damage_flags": ["crack", "..."],
  "contamination_flags": ["rust", "..."],
  "description": "one detailed paragraph",
  "safety_score": 0-100
}"#;

const STRICT_SUFFIX: &str = r#"

Your previous answer could not be parsed. Reply with ONE JSON object and nothing else:
no markdown, no code fences, no commentary. Use null or [] for anything you cannot see."#;

/// Ordered from most to least specific; first hit wins.
const OBJECT_KEYWORDS: &[(&str, &[&str])] = &[
    ("plastic bottle", &["plastic bottle", "pet bottle", "water bottle"]),
    ("plastic container", &["plastic container", "plastic box", "tupperware"]),
    ("plastic", &["plastic", "polymer"]),
    ("glass bottle", &["glass bottle", "wine bottle", "beer bottle"]),
    ("glass jar", &["glass jar", "mason jar"]),
    ("glass", &["glass"]),
    ("metal can", &["metal can", "aluminum can", "tin can", "soda can"]),
    ("metal container", &["metal container", "metal box"]),
    ("metal", &["metal", "aluminum", "steel", "iron"]),
    ("cardboard box", &["cardboard box", "carton box"]),
    ("cardboard", &["cardboard", "corrugated"]),
    ("paper", &["paper", "newspaper"]),
    ("fabric", &["fabric", "cloth", "textile", "clothing"]),
    ("wood", &["wood", "wooden"]),
    ("rubber", &["rubber", "tire"]),
    ("electronics", &["electronic", "device", "circuit"]),
];

pub struct VisionAnalyzer {
    backend: Arc<dyn ModelBackend>,
}

impl VisionAnalyzer {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// One submission to the vision model. `strict` selects the tightened retry prompt.
    pub async fn analyze(
        &self,
        image: &PreparedImage,
        strict: bool,
    ) -> Result<VisionFinding, EcoScanError> {
        let prompt = build_prompt(strict);
        let raw = self
            .backend
            .submit(&prompt, Some(image.payload()))
            .await
            .map_err(EcoScanError::from_vision_backend)?;
        debug!("Vision model returned {} chars", raw.len());

        let finding = parse_vision_response(&raw)?;
        info!(
            "Vision finding: object={:?}, materials={}, damage={}, contamination={}",
            finding.object_type,
            finding.material_composition.len(),
            finding.damage_flags.len(),
            finding.contamination_flags.len()
        );
        Ok(finding)
    }
}

pub fn build_prompt(strict: bool) -> String {
    if strict {
        format!("{}{}", VISION_PROMPT, STRICT_SUFFIX)
    } else {
        VISION_PROMPT.to_string()
    }
}

/// Coerce a raw vision reply into a [`VisionFinding`]. Missing fields stay empty.
pub fn parse_vision_response(raw: &str) -> Result<VisionFinding, EcoScanError> {
    let obj = extract_json_object(raw).map_err(EcoScanError::VisionParse)?;

    let description = string_field(&obj, &["description", "visual_description"]);
    let object_type = string_field(&obj, &["object_type", "object", "item"]).or_else(|| {
        description
            .as_deref()
            .and_then(classify_object_type)
            .map(str::to_string)
    });

    Ok(VisionFinding {
        object_type,
        material_composition: string_list_field(
            &obj,
            &["material_composition", "materials", "material"],
        ),
        condition_summary: string_field(&obj, &["condition_summary", "condition"]),
        damage_flags: string_set_field(&obj, &["damage_flags", "damage"]),
        contamination_flags: string_set_field(&obj, &["contamination_flags", "contamination"]),
        description,
        safety_score: score_field(&obj, &["safety_score"]),
    })
}

/// Keyword classification of a free-text description.
pub fn classify_object_type(description: &str) -> Option<&'static str> {
    let lower = description.to_lowercase();
    OBJECT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(label, _)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_response() {
        let raw = r#"{
            "object_type": "Glass jar",
            "material_composition": ["glass", "steel lid"],
            "condition_summary": "Intact with a rusty lid",
            "damage_flags": [],
            "contamination_flags": ["Rust"],
            "description": "A clear glass jar.",
            "safety_score": 82,
            "unexpected": {"ignored": true}
        }"#;
        let finding = parse_vision_response(raw).unwrap();
        assert_eq!(finding.object_type.as_deref(), Some("Glass jar"));
        assert_eq!(finding.material_composition, vec!["glass", "steel lid"]);
        assert!(finding.damage_flags.is_empty());
        assert!(finding.contamination_flags.contains("rust"));
        assert_eq!(finding.safety_score, Some(82));
    }

    #[test]
    fn missing_fields_stay_empty() {
        let finding = parse_vision_response("{}").unwrap();
        assert_eq!(finding, VisionFinding::default());
    }

    #[test]
    fn object_type_falls_back_to_description_keywords() {
        let raw = r#"{"description": "A dented aluminum can with a torn label."}"#;
        let finding = parse_vision_response(raw).unwrap();
        assert_eq!(finding.object_type.as_deref(), Some("metal can"));
    }

    #[test]
    fn malformed_reply_is_a_parse_error() {
        let err = parse_vision_response("The image shows a bottle.").unwrap_err();
        assert!(matches!(err, EcoScanError::VisionParse(_)));
    }

    #[test]
    fn classification_prefers_specific_labels() {
        assert_eq!(classify_object_type("an old PET bottle"), Some("plastic bottle"));
        assert_eq!(classify_object_type("some plastic scrap"), Some("plastic"));
        assert_eq!(classify_object_type("a wooden crate"), Some("wood"));
        assert_eq!(classify_object_type("a blurry shape"), None);
    }

    #[test]
    fn strict_prompt_extends_base_prompt() {
        let strict = build_prompt(true);
        assert!(strict.starts_with(VISION_PROMPT));
        assert!(strict.contains("ONE JSON object"));
        assert_eq!(build_prompt(false), VISION_PROMPT);
    }
}
