// src/services/llm_service.rs
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use crate::config::{BackendConfig, Provider};
use crate::errors::{BackendError, EcoScanError};
use crate::models::ImagePayload;

const MAX_OUTPUT_TOKENS: u32 = 4096;
const MAX_ERROR_BODY_CHARS: usize = 1024;

/// A model service that takes a prompt (and optionally an image) and answers with raw text.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(
        &self,
        prompt: &str,
        image: Option<ImagePayload<'_>>,
    ) -> Result<String, BackendError>;
}

/// One pooled client shared by every backend and every request.
pub fn build_http_client(timeout: Duration) -> Result<Client, EcoScanError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| EcoScanError::Config(format!("Failed to build HTTP client: {}", e)))
}

pub fn build_backend(config: &BackendConfig, client: Client) -> Arc<dyn ModelBackend> {
    let endpoint = config.endpoint.trim_end_matches('/').to_string();
    let model = config.model.clone();
    let api_key = config.api_key.clone();
    match config.provider {
        Provider::Gemini => Arc::new(GeminiBackend {
            client,
            endpoint,
            model,
            api_key,
        }),
        Provider::Ollama => Arc::new(OllamaBackend {
            client,
            endpoint,
            model,
        }),
        Provider::OpenAi => Arc::new(OpenAiBackend {
            client,
            endpoint,
            model,
            api_key,
        }),
        Provider::Anthropic => Arc::new(AnthropicBackend {
            client,
            endpoint,
            model,
            api_key,
        }),
    }
}

/// Google Gemini `generateContent` (cloud).
pub struct GeminiBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn submit(
        &self,
        prompt: &str,
        image: Option<ImagePayload<'_>>,
    ) -> Result<String, BackendError> {
        let api_key = require_key(self.name(), &self.api_key)?;

        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.media_type,
                    "data": image.base64
                }
            }));
        }

        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", api_key)
            .json(&json!({
                "contents": [{ "role": "user", "parts": parts }],
                "generationConfig": {
                    "maxOutputTokens": MAX_OUTPUT_TOKENS,
                    "responseMimeType": "application/json"
                }
            }));

        let result = send_json(self.name(), request).await?;
        let text: String = result["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();
        non_empty(self.name(), text)
    }
}

/// Ollama `/api/generate` (local service).
pub struct OllamaBackend {
    client: Client,
    endpoint: String,
    model: String,
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn submit(
        &self,
        prompt: &str,
        image: Option<ImagePayload<'_>>,
    ) -> Result<String, BackendError> {
        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json"
        });
        if let Some(image) = image {
            body["images"] = json!([image.base64]);
        }

        let request = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&body);

        let result = send_json(self.name(), request).await?;
        let text = result["response"].as_str().unwrap_or_default().to_string();
        non_empty(self.name(), text)
    }
}

/// OpenAI chat completions.
pub struct OpenAiBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn submit(
        &self,
        prompt: &str,
        image: Option<ImagePayload<'_>>,
    ) -> Result<String, BackendError> {
        let api_key = require_key(self.name(), &self.api_key)?;

        let mut content = vec![json!({ "type": "text", "text": prompt })];
        if let Some(image) = image {
            content.push(json!({
                "type": "image_url",
                "image_url": { "url": image.data_url() }
            }));
        }

        let request = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": content }],
                "max_tokens": MAX_OUTPUT_TOKENS,
                "response_format": { "type": "json_object" }
            }));

        let result = send_json(self.name(), request).await?;
        let text = result["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        non_empty(self.name(), text)
    }
}

/// Anthropic messages API.
pub struct AnthropicBackend {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn submit(
        &self,
        prompt: &str,
        image: Option<ImagePayload<'_>>,
    ) -> Result<String, BackendError> {
        let api_key = require_key(self.name(), &self.api_key)?;

        let mut content = Vec::new();
        if let Some(image) = image {
            content.push(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": image.media_type,
                    "data": image.base64
                }
            }));
        }
        content.push(json!({ "type": "text", "text": prompt }));

        let request = self
            .client
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&json!({
                "model": self.model,
                "max_tokens": MAX_OUTPUT_TOKENS,
                "messages": [{ "role": "user", "content": content }]
            }));

        let result = send_json(self.name(), request).await?;
        let text = result["content"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        non_empty(self.name(), text)
    }
}

fn require_key<'a>(backend: &str, key: &'a Option<String>) -> Result<&'a str, BackendError> {
    key.as_deref().ok_or_else(|| BackendError::Transport {
        backend: backend.to_string(),
        message: "API key not configured".to_string(),
    })
}

async fn send_json(backend: &str, request: RequestBuilder) -> Result<Value, BackendError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(backend, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(BackendError::Status {
            backend: backend.to_string(),
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
        });
    }

    let value: Value = response
        .json()
        .await
        .map_err(|e| transport_error(backend, e))?;
    debug!("{} answered with HTTP {}", backend, status);
    Ok(value)
}

fn transport_error(backend: &str, err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout {
            backend: backend.to_string(),
        }
    } else if err.is_decode() {
        BackendError::Envelope {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    } else {
        BackendError::Transport {
            backend: backend.to_string(),
            message: err.to_string(),
        }
    }
}

fn non_empty(backend: &str, text: String) -> Result<String, BackendError> {
    if text.trim().is_empty() {
        return Err(BackendError::Envelope {
            backend: backend.to_string(),
            message: "no text content in response".to_string(),
        });
    }
    Ok(text)
}
