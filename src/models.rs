// src/models.rs
use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EcoScanError, ErrorKind};

/// CO2 saving assumed when the reasoning model gives none.
pub const DEFAULT_CO2_SAVED_KG: f64 = 0.5;

/// Multiplier from the per-unit CO2 figure to the displayed total impact.
pub const IMPACT_MULTIPLIER: f64 = 2.5;

pub const NO_SUGGESTIONS_NOTE: &str = "No reuse suggestions were generated for this item.";

/// Where the inbound image comes from. Exactly one source per request.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes(Vec<u8>),
    /// Raw base64 or a `data:image/...;base64,` URL.
    Base64(String),
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub source: ImageSource,
    pub content_type: Option<String>,
}

impl AnalysisRequest {
    pub fn from_bytes(data: Vec<u8>, content_type: Option<String>) -> Self {
        Self {
            source: ImageSource::Bytes(data),
            content_type,
        }
    }

    pub fn from_base64(encoded: impl Into<String>) -> Self {
        Self {
            source: ImageSource::Base64(encoded.into()),
            content_type: None,
        }
    }
}

/// Canonical, size-bounded image ready for model submission.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub media_type: &'static str,
}

impl PreparedImage {
    pub fn payload(&self) -> ImagePayload<'_> {
        ImagePayload {
            base64: &self.base64,
            media_type: self.media_type,
        }
    }
}

/// Borrowed view of an image handed to a model backend.
#[derive(Debug, Clone, Copy)]
pub struct ImagePayload<'a> {
    pub base64: &'a str,
    pub media_type: &'a str,
}

impl ImagePayload<'_> {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.base64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionFinding {
    pub object_type: Option<String>,
    pub material_composition: Vec<String>,
    pub condition_summary: Option<String>,
    pub damage_flags: BTreeSet<String>,
    pub contamination_flags: BTreeSet<String>,
    pub description: Option<String>,
    /// Preliminary hazard-free score offered by the vision model, if any.
    pub safety_score: Option<u8>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" | "low" | "beginner" | "simple" => Some(Difficulty::Easy),
            "medium" | "moderate" | "intermediate" => Some(Difficulty::Medium),
            "hard" | "high" | "difficult" | "advanced" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub title: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "Reusable")]
    Reusable,
    #[serde(rename = "Conditionally Reusable")]
    ConditionallyReusable,
    #[serde(rename = "Not Reusable")]
    NotReusable,
}

impl Verdict {
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "reusable" => Some(Verdict::Reusable),
            "conditionallyreusable" | "conditional" => Some(Verdict::ConditionallyReusable),
            "notreusable" | "nonreusable" => Some(Verdict::NotReusable),
            _ => None,
        }
    }

    /// Fallback verdict when the model gave no usable one.
    pub fn from_feasibility(reuse_feasible: bool, confidence: u8) -> Self {
        match (reuse_feasible, confidence > 70) {
            (true, true) => Verdict::Reusable,
            (true, false) => Verdict::ConditionallyReusable,
            (false, _) => Verdict::NotReusable,
        }
    }

    pub fn from_safety_score(score: u8) -> Self {
        match score {
            70..=100 => Verdict::Reusable,
            40..=69 => Verdict::ConditionallyReusable,
            _ => Verdict::NotReusable,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Reusable => "Reusable",
            Verdict::ConditionallyReusable => "Conditionally Reusable",
            Verdict::NotReusable => "Not Reusable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningFinding {
    /// Clamped to 0..=100; `None` when the model gave nothing numeric.
    pub safety_score: Option<u8>,
    pub estimated_co2_saved_kg: f64,
    pub suggestions: Vec<Suggestion>,
    pub verdict: Option<Verdict>,
    pub reuse_feasible: Option<bool>,
    pub confidence: u8,
    pub reasoning: Option<String>,
    pub key_factors: Vec<String>,
    pub object_type: Option<String>,
    pub material_composition: Vec<String>,
    pub condition_summary: Option<String>,
}

impl Default for ReasoningFinding {
    fn default() -> Self {
        Self {
            safety_score: None,
            estimated_co2_saved_kg: DEFAULT_CO2_SAVED_KG,
            suggestions: Vec::new(),
            verdict: None,
            reuse_feasible: None,
            confidence: 50,
            reasoning: None,
            key_factors: Vec::new(),
            object_type: None,
            material_composition: Vec::new(),
            condition_summary: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricingConfidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingFactors {
    pub base_price: u32,
    pub condition_multiplier: f64,
    pub labor_multiplier: f64,
    pub sustainability_premium: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingEstimate {
    pub suggested_price_range: PriceRange,
    pub pricing_confidence: PricingConfidence,
    pub currency: String,
    pub reasoning: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factors: Option<PricingFactors>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub object_type: String,
    pub verdict: Verdict,
    /// Model's own feasibility call; derived from the verdict when it gave none.
    pub reuse_feasible: bool,
    pub condition_summary: String,
    pub visual_description: Option<String>,
    pub reuse_score: u8,
    pub score_interpretation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingEstimate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDetails {
    pub material_composition: Vec<String>,
    pub safety_score: u8,
    pub estimated_co2_saved_kg: f64,
    pub total_co2_impact_kg: f64,
    pub suggestions: Vec<Suggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions_note: Option<String>,
    pub damage_flags: BTreeSet<String>,
    pub contamination_flags: BTreeSet<String>,
    pub key_factors: Vec<String>,
    pub reasoning: Option<String>,
}

/// The only structure handed back to callers. Fields are read through accessors.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub(crate) status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error_kind: Option<ErrorKind>,
    pub(crate) request_id: Uuid,
    pub(crate) analyzed_at: DateTime<Utc>,
    pub(crate) image_b64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) results: Option<ResultSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) analysis: Option<AnalysisDetails>,
}

impl AnalysisResult {
    pub(crate) fn success(
        request_id: Uuid,
        image_b64: String,
        results: ResultSummary,
        analysis: AnalysisDetails,
    ) -> Self {
        Self {
            status: AnalysisStatus::Success,
            error: None,
            error_kind: None,
            request_id,
            analyzed_at: Utc::now(),
            image_b64,
            results: Some(results),
            analysis: Some(analysis),
        }
    }

    pub(crate) fn failure(request_id: Uuid, image_b64: String, err: &EcoScanError) -> Self {
        let mut message = err.to_string();
        if message.trim().is_empty() {
            message = "Analysis failed".to_string();
        }
        Self {
            status: AnalysisStatus::Error,
            error: Some(message),
            error_kind: Some(err.kind()),
            request_id,
            analyzed_at: Utc::now(),
            image_b64,
            results: None,
            analysis: None,
        }
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == AnalysisStatus::Success
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn analyzed_at(&self) -> DateTime<Utc> {
        self.analyzed_at
    }

    pub fn image_b64(&self) -> &str {
        &self.image_b64
    }

    pub fn results(&self) -> Option<&ResultSummary> {
        self.results.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisDetails> {
        self.analysis.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_common_spellings() {
        assert_eq!(Difficulty::parse_lenient(" EASY "), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse_lenient("low"), Some(Difficulty::Easy));
        assert_eq!(Difficulty::parse_lenient("Moderate"), Some(Difficulty::Medium));
        assert_eq!(Difficulty::parse_lenient("advanced"), Some(Difficulty::Hard));
        assert_eq!(Difficulty::parse_lenient("impossible"), None);
        assert_eq!(Difficulty::default(), Difficulty::Medium);
    }

    #[test]
    fn verdict_parses_loose_text() {
        assert_eq!(Verdict::parse_lenient("Reusable"), Some(Verdict::Reusable));
        assert_eq!(
            Verdict::parse_lenient("conditionally-reusable"),
            Some(Verdict::ConditionallyReusable)
        );
        assert_eq!(Verdict::parse_lenient("NOT REUSABLE"), Some(Verdict::NotReusable));
        assert_eq!(Verdict::parse_lenient("maybe"), None);
    }

    #[test]
    fn verdict_fallbacks() {
        assert_eq!(Verdict::from_feasibility(true, 90), Verdict::Reusable);
        assert_eq!(Verdict::from_feasibility(true, 70), Verdict::ConditionallyReusable);
        assert_eq!(Verdict::from_feasibility(false, 99), Verdict::NotReusable);
        assert_eq!(Verdict::from_safety_score(70), Verdict::Reusable);
        assert_eq!(Verdict::from_safety_score(40), Verdict::ConditionallyReusable);
        assert_eq!(Verdict::from_safety_score(0), Verdict::NotReusable);
    }

    #[test]
    fn verdict_serializes_display_label() {
        let json = serde_json::to_string(&Verdict::ConditionallyReusable).unwrap();
        assert_eq!(json, "\"Conditionally Reusable\"");
        assert_eq!(Verdict::NotReusable.to_string(), "Not Reusable");
    }

    #[test]
    fn failure_result_carries_kind_and_message() {
        let err = EcoScanError::InvalidImage("zero bytes".into());
        let result = AnalysisResult::failure(Uuid::new_v4(), String::new(), &err);
        assert_eq!(result.status(), AnalysisStatus::Error);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidImage));
        assert!(result.error().unwrap().contains("zero bytes"));
        assert!(result.results().is_none());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "invalid_image");
        assert!(json.get("results").is_none());
    }

    #[test]
    fn data_url_uses_media_type() {
        let payload = ImagePayload {
            base64: "AAAA",
            media_type: "image/jpeg",
        };
        assert_eq!(payload.data_url(), "data:image/jpeg;base64,AAAA");
    }
}
