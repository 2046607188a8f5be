// src/services/pricing.rs
//! Rule-based market price estimate for the upcycled product.
//!
//! Pure and deterministic: the same findings always produce the same estimate.

use crate::errors::EcoScanError;
use crate::models::{
    Difficulty, PriceRange, PricingConfidence, PricingEstimate, PricingFactors, ReasoningFinding,
    VisionFinding,
};

pub const CURRENCY: &str = "INR";

const SUSTAINABILITY_PREMIUM: f64 = 1.10;
const RANGE_SPREAD: f64 = 0.10;
const DEFAULT_BASE_PRICE: u32 = 75;
const DEGRADED_RANGE: PriceRange = PriceRange { min: 25, max: 250 };
const LONG_PROCEDURE_STEPS: usize = 8;

/// Matched against the target product name in order; first hit wins.
const BASE_PRICES: &[(&str, u32)] = &[
    ("storage", 80),
    ("planter", 100),
    ("organizer", 60),
    ("holder", 50),
    ("container", 70),
    ("shelf", 150),
    ("box", 90),
    ("pot", 80),
    ("vase", 120),
    ("decoration", 70),
    ("tool", 60),
    ("basket", 75),
    ("tray", 85),
    ("chair", 300),
    ("table", 400),
    ("bench", 250),
];

pub fn estimate(
    vision: &VisionFinding,
    reasoning: &ReasoningFinding,
) -> Result<PricingEstimate, EcoScanError> {
    let object_type = reasoning
        .object_type
        .as_deref()
        .or(vision.object_type.as_deref());
    let has_materials =
        !reasoning.material_composition.is_empty() || !vision.material_composition.is_empty();

    let object_type = match object_type {
        Some(object_type) if has_materials => object_type,
        _ => return Ok(degraded_estimate()),
    };

    let top = reasoning.suggestions.first();
    let target = top.map(|s| s.title.as_str()).unwrap_or(object_type);
    let difficulty = top.map(|s| s.difficulty).unwrap_or_default();
    let step_count = top.map(|s| s.steps.len()).unwrap_or(0);
    let flag_count = vision.damage_flags.len() + vision.contamination_flags.len();

    let base_price = base_price_for(target);
    let condition_multiplier = match flag_count {
        0 => 1.05,
        1..=2 => 1.0,
        _ => 0.9,
    };
    let mut labor_multiplier = match difficulty {
        Difficulty::Easy => 1.05,
        Difficulty::Medium => 1.10,
        Difficulty::Hard => 1.15,
    };
    if step_count > LONG_PROCEDURE_STEPS {
        labor_multiplier += 0.05;
    }

    let price =
        base_price as f64 * condition_multiplier * labor_multiplier * SUSTAINABILITY_PREMIUM;
    let range = PriceRange {
        min: round_to_five(price * (1.0 - RANGE_SPREAD))?,
        max: round_to_five(price * (1.0 + RANGE_SPREAD))?,
    };
    if range.min == 0 || range.min > range.max {
        return Err(EcoScanError::Pricing(format!(
            "computed an unusable range {}-{}",
            range.min, range.max
        )));
    }

    let pricing_confidence = if difficulty == Difficulty::Hard || flag_count >= 3 {
        PricingConfidence::Low
    } else if flag_count == 0 && difficulty == Difficulty::Easy {
        PricingConfidence::High
    } else {
        PricingConfidence::Medium
    };

    let mut reasoning_lines = vec![format!(
        "Market rate for {} in the second-hand/upcycled market",
        target.to_lowercase()
    )];
    reasoning_lines.push(match flag_count {
        0 => "No visible damage or contamination".to_string(),
        n => format!("{} condition issue(s) lower the value", n),
    });
    reasoning_lines.push(match difficulty {
        Difficulty::Hard => "Significant craftsmanship required".to_string(),
        Difficulty::Medium => "Moderate effort required".to_string(),
        Difficulty::Easy => "Simple transformation process".to_string(),
    });
    reasoning_lines.push("Eco-friendly upcycled product value".to_string());

    Ok(PricingEstimate {
        suggested_price_range: range,
        pricing_confidence,
        currency: CURRENCY.to_string(),
        reasoning: reasoning_lines,
        factors: Some(PricingFactors {
            base_price,
            condition_multiplier,
            labor_multiplier,
            sustainability_premium: SUSTAINABILITY_PREMIUM,
        }),
    })
}

fn degraded_estimate() -> PricingEstimate {
    PricingEstimate {
        suggested_price_range: DEGRADED_RANGE,
        pricing_confidence: PricingConfidence::Low,
        currency: CURRENCY.to_string(),
        reasoning: vec![
            "Object or material could not be identified; showing a wide default band".to_string(),
        ],
        factors: None,
    }
}

fn base_price_for(target: &str) -> u32 {
    let target = target.to_lowercase();
    BASE_PRICES
        .iter()
        .find(|(keyword, _)| target.contains(keyword))
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_BASE_PRICE)
}

fn round_to_five(value: f64) -> Result<u32, EcoScanError> {
    if !value.is_finite() || value < 0.0 {
        return Err(EcoScanError::Pricing(format!("invalid price {}", value)));
    }
    Ok(((value.trunc() / 5.0).round() * 5.0) as u32)
}
