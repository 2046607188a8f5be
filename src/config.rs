// src/config.rs
use std::collections::HashMap;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::EcoScanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    Ollama,
    OpenAi,
    Anthropic,
}

impl Provider {
    pub fn parse(raw: &str) -> Result<Self, EcoScanError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "ollama" | "local" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            other => Err(EcoScanError::Config(format!(
                "Unsupported provider '{}'. Supported: gemini, ollama, openai, anthropic",
                other
            ))),
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::Ollama => "http://localhost:11434",
            Provider::OpenAi => "https://api.openai.com",
            Provider::Anthropic => "https://api.anthropic.com",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub provider: Provider,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl BackendConfig {
    pub fn new(provider: Provider, model: impl Into<String>) -> Self {
        Self {
            provider,
            endpoint: provider.default_endpoint().to_string(),
            model: model.into(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub vision: BackendConfig,
    pub reasoning: BackendConfig,
    pub request_timeout_secs: u64,
    /// Extra attempts allowed after a parse failure. Transport failures are never retried.
    pub parse_retries: u32,
    pub max_image_bytes: usize,
    pub max_image_width: u32,
    pub min_image_dimension: u32,
    pub jpeg_quality: u8,
    pub reasoning_uses_image: bool,
    pub pricing_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vision: BackendConfig::new(Provider::Gemini, "gemini-2.0-flash"),
            reasoning: BackendConfig::new(Provider::Ollama, "mistral"),
            request_timeout_secs: 60,
            parse_retries: 1,
            max_image_bytes: 20 * 1024 * 1024,
            max_image_width: 1280,
            min_image_dimension: 100,
            jpeg_quality: 85,
            reasoning_uses_image: false,
            pricing_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the JSON file named by `ECOSCAN_CONFIG`, then environment variables.
    pub fn from_env() -> Result<Self, EcoScanError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        let base = match vars.get("ECOSCAN_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_overrides(|key| vars.get(key).cloned())
    }

    pub fn from_file(path: &str) -> Result<Self, EcoScanError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EcoScanError::Config(format!("Failed to read {}: {}", path, e)))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| EcoScanError::Config(format!("Failed to parse {}: {}", path, e)))?;
        info!("Loaded pipeline config from {}", path);
        Ok(config)
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, EcoScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        apply_backend_overrides(&mut self.vision, "VISION", &lookup)?;
        apply_backend_overrides(&mut self.reasoning, "REASONING", &lookup)?;
        if self.vision.provider == Provider::Gemini && self.vision.api_key.is_none() {
            self.vision.api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());
        }

        if let Some(v) = parse_var(&lookup, "ECOSCAN_TIMEOUT_SECS")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_PARSE_RETRIES")? {
            self.parse_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_MAX_IMAGE_BYTES")? {
            self.max_image_bytes = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_MAX_IMAGE_WIDTH")? {
            self.max_image_width = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_MIN_IMAGE_DIMENSION")? {
            self.min_image_dimension = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_JPEG_QUALITY")? {
            self.jpeg_quality = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_REASONING_USES_IMAGE")? {
            self.reasoning_uses_image = v;
        }
        if let Some(v) = parse_var(&lookup, "ECOSCAN_PRICING_ENABLED")? {
            self.pricing_enabled = v;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), EcoScanError> {
        for (stage, backend) in [("vision", &self.vision), ("reasoning", &self.reasoning)] {
            if backend.model.trim().is_empty() {
                return Err(EcoScanError::Config(format!("{} model is empty", stage)));
            }
            if backend.provider.requires_api_key() && backend.api_key.is_none() {
                return Err(EcoScanError::Config(format!(
                    "{} provider {:?} requires an API key",
                    stage, backend.provider
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(EcoScanError::Config("request timeout must be positive".into()));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(EcoScanError::Config(format!(
                "jpeg quality {} outside 1..=100",
                self.jpeg_quality
            )));
        }
        if self.max_image_width == 0 || self.max_image_bytes == 0 {
            return Err(EcoScanError::Config("image limits must be positive".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn apply_backend_overrides<F>(
    backend: &mut BackendConfig,
    stage: &str,
    lookup: &F,
) -> Result<(), EcoScanError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(&format!("ECOSCAN_{}_PROVIDER", stage)) {
        let provider = Provider::parse(&raw)?;
        if provider != backend.provider {
            backend.provider = provider;
            backend.endpoint = provider.default_endpoint().to_string();
        }
    }
    if let Some(model) = lookup(&format!("ECOSCAN_{}_MODEL", stage)) {
        backend.model = model;
    }
    if let Some(endpoint) = lookup(&format!("ECOSCAN_{}_ENDPOINT", stage)) {
        backend.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if let Some(key) = lookup(&format!("ECOSCAN_{}_API_KEY", stage)) {
        if !key.trim().is_empty() {
            backend.api_key = Some(key);
        }
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, EcoScanError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EcoScanError::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_use_cloud_vision_and_local_reasoning() {
        let config = PipelineConfig::default();
        assert_eq!(config.vision.provider, Provider::Gemini);
        assert_eq!(config.reasoning.provider, Provider::Ollama);
        assert_eq!(config.reasoning.endpoint, "http://localhost:11434");
        assert_eq!(config.parse_retries, 1);
        assert_eq!(config.max_image_width, 1280);
    }

    #[test]
    fn env_overrides_are_layered() {
        let config = PipelineConfig::default()
            .with_overrides(lookup_from(&[
                ("ECOSCAN_VISION_PROVIDER", "openai"),
                ("ECOSCAN_VISION_MODEL", "gpt-4o"),
                ("ECOSCAN_VISION_API_KEY", "sk-test"),
                ("ECOSCAN_REASONING_ENDPOINT", "http://ollama:11434/"),
                ("ECOSCAN_TIMEOUT_SECS", "15"),
                ("ECOSCAN_PRICING_ENABLED", "false"),
            ]))
            .unwrap();

        assert_eq!(config.vision.provider, Provider::OpenAi);
        assert_eq!(config.vision.endpoint, "https://api.openai.com");
        assert_eq!(config.vision.model, "gpt-4o");
        assert_eq!(config.vision.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.reasoning.endpoint, "http://ollama:11434");
        assert_eq!(config.request_timeout_secs, 15);
        assert!(!config.pricing_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn gemini_key_falls_back_to_legacy_variable() {
        let config = PipelineConfig::default()
            .with_overrides(lookup_from(&[("GEMINI_API_KEY", "g-key")]))
            .unwrap();
        assert_eq!(config.vision.api_key.as_deref(), Some("g-key"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn gemini_key_is_not_borrowed_by_other_providers() {
        let config = PipelineConfig::default()
            .with_overrides(lookup_from(&[
                ("ECOSCAN_VISION_PROVIDER", "anthropic"),
                ("ECOSCAN_VISION_MODEL", "claude-3-5-sonnet-latest"),
                ("GEMINI_API_KEY", "g-key"),
            ]))
            .unwrap();
        assert_eq!(config.vision.provider, Provider::Anthropic);
        assert!(config.vision.api_key.is_none());
        assert!(matches!(config.validate(), Err(EcoScanError::Config(_))));
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = PipelineConfig::default()
            .with_overrides(lookup_from(&[("ECOSCAN_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, EcoScanError::Config(_)));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Provider::parse("watson").is_err());
        assert_eq!(Provider::parse("Claude").unwrap(), Provider::Anthropic);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        // Gemini without a key.
        assert!(PipelineConfig::default().validate().is_err());

        let mut config = PipelineConfig::default();
        config.vision.api_key = Some("key".into());
        assert!(config.validate().is_ok());

        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.jpeg_quality = 85;
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_config_keeps_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"parse_retries": 2, "jpeg_quality": 70}"#).unwrap();
        assert_eq!(config.parse_retries, 2);
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.max_image_width, 1280);
    }
}
