// src/services/scoring.rs
use crate::models::{IMPACT_MULTIPLIER, Verdict};

/// Reuse viability 0..=100 from the verdict and the model's confidence.
pub fn reuse_score(verdict: Verdict, confidence: u8) -> u8 {
    match verdict {
        Verdict::NotReusable => confidence.min(30),
        Verdict::ConditionallyReusable => confidence.clamp(40, 75),
        Verdict::Reusable => confidence.clamp(60, 100),
    }
}

pub fn interpret_score(score: u8) -> &'static str {
    match score {
        80..=u8::MAX => "Excellent reuse potential - minimal preparation needed",
        65..=79 => "Good reuse potential - suitable for most applications",
        50..=64 => "Moderate reuse potential - may need cleaning or minor repairs",
        35..=49 => "Limited reuse potential - significant limitations apply",
        _ => "Low reuse potential - not recommended for most uses",
    }
}

pub fn total_impact_kg(co2_saved_kg: f64) -> f64 {
    co2_saved_kg * IMPACT_MULTIPLIER
}
