// src/services/merger.rs
use log::error;
use uuid::Uuid;

use crate::errors::EcoScanError;
use crate::models::{
    AnalysisDetails, AnalysisResult, DEFAULT_CO2_SAVED_KG, NO_SUGGESTIONS_NOTE, PricingEstimate,
    ReasoningFinding, ResultSummary, Verdict, VisionFinding,
};
use crate::services::scoring::{interpret_score, reuse_score, total_impact_kg};

pub const UNKNOWN_OBJECT: &str = "Unknown object";
pub const UNKNOWN_MATERIAL: &str = "Unknown";
pub const UNKNOWN_CONDITION: &str = "Condition could not be determined";
pub const DEFAULT_SAFETY_SCORE: u8 = 0;

/// Combine both findings into the final report.
///
/// Per field: reasoning value, then vision value, then a fixed default.
/// Safety score follows the same order; the vision model's preliminary
/// estimate is only used when the reasoning model gave nothing numeric.
pub fn merge(
    request_id: Uuid,
    image_b64: String,
    vision: Option<&VisionFinding>,
    reasoning: Option<&ReasoningFinding>,
    pricing: Option<PricingEstimate>,
) -> Result<AnalysisResult, EcoScanError> {
    let (vision, reasoning) = match (vision, reasoning) {
        (Some(v), Some(r)) => (v, r),
        (v, r) => {
            let msg = format!(
                "missing upstream finding (vision: {}, reasoning: {})",
                v.is_some(),
                r.is_some()
            );
            error!("[{}] {}", request_id, msg);
            return Err(EcoScanError::IncompleteAnalysis(msg));
        }
    };

    let object_type = reasoning
        .object_type
        .clone()
        .or_else(|| vision.object_type.clone())
        .unwrap_or_else(|| UNKNOWN_OBJECT.to_string());

    let material_composition = [
        &reasoning.material_composition,
        &vision.material_composition,
    ]
    .into_iter()
    .find(|list| !list.is_empty())
    .cloned()
    .unwrap_or_else(|| vec![UNKNOWN_MATERIAL.to_string()]);

    let condition_summary = reasoning
        .condition_summary
        .clone()
        .or_else(|| vision.condition_summary.clone())
        .unwrap_or_else(|| UNKNOWN_CONDITION.to_string());

    let safety_score = reasoning
        .safety_score
        .or(vision.safety_score)
        .unwrap_or(DEFAULT_SAFETY_SCORE)
        .min(100);

    let verdict = reasoning
        .verdict
        .unwrap_or_else(|| Verdict::from_safety_score(safety_score));

    let co2 = reasoning.estimated_co2_saved_kg;
    let estimated_co2_saved_kg = if co2.is_finite() && co2 >= 0.0 {
        co2
    } else {
        DEFAULT_CO2_SAVED_KG
    };

    let suggestions = reasoning.suggestions.clone();
    let suggestions_note = suggestions
        .is_empty()
        .then(|| NO_SUGGESTIONS_NOTE.to_string());

    let score = reuse_score(verdict, reasoning.confidence);

    let reuse_feasible = reasoning
        .reuse_feasible
        .unwrap_or(verdict != Verdict::NotReusable);

    let results = ResultSummary {
        object_type,
        verdict,
        reuse_feasible,
        condition_summary,
        visual_description: vision.description.clone(),
        reuse_score: score,
        score_interpretation: interpret_score(score).to_string(),
        pricing,
    };
    let analysis = AnalysisDetails {
        material_composition,
        safety_score,
        estimated_co2_saved_kg,
        total_co2_impact_kg: total_impact_kg(estimated_co2_saved_kg),
        suggestions,
        suggestions_note,
        damage_flags: vision.damage_flags.clone(),
        contamination_flags: vision.contamination_flags.clone(),
        key_factors: reasoning.key_factors.clone(),
        reasoning: reasoning.reasoning.clone(),
    };

    ensure_mandatory(request_id, &results, &analysis)?;
    Ok(AnalysisResult::success(request_id, image_b64, results, analysis))
}

fn ensure_mandatory(
    request_id: Uuid,
    results: &ResultSummary,
    analysis: &AnalysisDetails,
) -> Result<(), EcoScanError> {
    let missing = if results.object_type.trim().is_empty() {
        Some("object_type")
    } else if results.condition_summary.trim().is_empty() {
        Some("condition_summary")
    } else if analysis.material_composition.iter().all(|m| m.trim().is_empty()) {
        Some("material_composition")
    } else {
        None
    };

    match missing {
        Some(field) => {
            error!("[{}] merged result is missing {}", request_id, field);
            Err(EcoScanError::IncompleteAnalysis(format!(
                "merged result is missing {}",
                field
            )))
        }
        None => Ok(()),
    }
}
