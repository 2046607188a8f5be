// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EcoScanError {
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Vision service error: {0}")]
    VisionService(String),

    #[error("Vision response could not be parsed: {0}")]
    VisionParse(String),

    #[error("Reasoning service error: {0}")]
    ReasoningService(String),

    #[error("Reasoning response could not be parsed: {0}")]
    ReasoningParse(String),

    #[error("Incomplete analysis: {0}")]
    IncompleteAnalysis(String),

    #[error("Pricing error: {0}")]
    Pricing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Stable, serializable discriminant of [`EcoScanError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidImage,
    VisionServiceError,
    VisionParseError,
    ReasoningServiceError,
    ReasoningParseError,
    IncompleteAnalysis,
    PricingError,
    ConfigError,
    ValidationError,
}

impl EcoScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EcoScanError::InvalidImage(_) => ErrorKind::InvalidImage,
            EcoScanError::VisionService(_) => ErrorKind::VisionServiceError,
            EcoScanError::VisionParse(_) => ErrorKind::VisionParseError,
            EcoScanError::ReasoningService(_) => ErrorKind::ReasoningServiceError,
            EcoScanError::ReasoningParse(_) => ErrorKind::ReasoningParseError,
            EcoScanError::IncompleteAnalysis(_) => ErrorKind::IncompleteAnalysis,
            EcoScanError::Pricing(_) => ErrorKind::PricingError,
            EcoScanError::Config(_) => ErrorKind::ConfigError,
            EcoScanError::Validation(_) => ErrorKind::ValidationError,
        }
    }

    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            EcoScanError::VisionParse(_) | EcoScanError::ReasoningParse(_)
        )
    }
}

/// Transport-level failures reported by a model backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{backend} timed out")]
    Timeout { backend: String },

    #[error("{backend} request failed: {message}")]
    Transport { backend: String, message: String },

    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String,
    },

    #[error("{backend} returned an unexpected envelope: {message}")]
    Envelope { backend: String, message: String },
}

impl BackendError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, BackendError::Timeout { .. })
    }

    /// The service answered, but with nothing usable in it.
    pub fn is_unusable_reply(&self) -> bool {
        matches!(self, BackendError::Envelope { .. })
    }
}

impl EcoScanError {
    /// Classify a vision backend failure: unusable replies are parse errors
    /// (retryable), everything else is a service error.
    pub fn from_vision_backend(err: BackendError) -> Self {
        if err.is_unusable_reply() {
            EcoScanError::VisionParse(err.to_string())
        } else {
            EcoScanError::VisionService(err.to_string())
        }
    }

    pub fn from_reasoning_backend(err: BackendError) -> Self {
        if err.is_unusable_reply() {
            EcoScanError::ReasoningParse(err.to_string())
        } else {
            EcoScanError::ReasoningService(err.to_string())
        }
    }
}

impl ResponseError for EcoScanError {
    fn error_response(&self) -> HttpResponse {
        match self {
            EcoScanError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "status": "error",
                "error": self.to_string()
            })),
            EcoScanError::InvalidImage(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "status": "error",
                "error": self.to_string()
            })),
            _ => HttpResponse::InternalServerError().json(serde_json::json!({
                "status": "error",
                "error": self.to_string()
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            EcoScanError::InvalidImage("empty".into()).kind(),
            ErrorKind::InvalidImage
        );
        assert_eq!(
            EcoScanError::ReasoningParse("bad".into()).kind(),
            ErrorKind::ReasoningParseError
        );
    }

    #[test]
    fn only_parse_errors_are_retryable() {
        assert!(EcoScanError::VisionParse("x".into()).is_parse_error());
        assert!(EcoScanError::ReasoningParse("x".into()).is_parse_error());
        assert!(!EcoScanError::VisionService("x".into()).is_parse_error());
        assert!(!EcoScanError::InvalidImage("x".into()).is_parse_error());
    }

    #[test]
    fn empty_envelope_is_a_parse_error_but_transport_is_not() {
        let envelope = BackendError::Envelope {
            backend: "gemini".into(),
            message: "no text content in response".into(),
        };
        assert!(matches!(
            EcoScanError::from_vision_backend(envelope),
            EcoScanError::VisionParse(_)
        ));

        let timeout = BackendError::Timeout {
            backend: "ollama".into(),
        };
        assert!(matches!(
            EcoScanError::from_reasoning_backend(timeout),
            EcoScanError::ReasoningService(_)
        ));

        let status = BackendError::Status {
            backend: "ollama".into(),
            status: 502,
            body: String::new(),
        };
        assert!(matches!(
            EcoScanError::from_reasoning_backend(status),
            EcoScanError::ReasoningService(_)
        ));
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::VisionServiceError).unwrap();
        assert_eq!(json, "\"vision_service_error\"");
    }

    #[test]
    fn validation_maps_to_bad_request() {
        let resp = EcoScanError::Validation("No image provided".into()).error_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = EcoScanError::Config("missing key".into()).error_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
