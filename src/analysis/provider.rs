use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::AppConfig;

const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_ERROR_BODY_CHARS: usize = 2048;

/// Gemini inline payload; field names follow the REST wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContentPart {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateContentRequest {
    pub model: String,
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("invalid provider endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("http client init failed: {0}")]
    ClientInit(String),
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("provider JSON decode failed: {0}")]
    Decode(String),
    #[error("provider returned no text (reason: {})", .reason.as_deref().unwrap_or("unknown"))]
    EmptyResponse { reason: Option<String> },
}

/// Blocking seam over the multimodal provider. Callers run it on the
/// blocking pool.
pub trait GenerateContentOps: Send + Sync + 'static {
    fn generate(&self, request: &GenerateContentRequest) -> Result<String, ProviderError>;
}

pub type SharedGenerateContentOps = Arc<dyn GenerateContentOps>;

#[derive(Debug, Clone, Serialize)]
struct WireRequest<'a> {
    contents: [WireContent<'a>; 1],
}

#[derive(Debug, Clone, Serialize)]
struct WireContent<'a> {
    role: &'static str,
    parts: &'a [ContentPart],
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    prompt_feedback: Option<WirePromptFeedback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireCandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireCandidateContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: Url,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>, base_url: Url, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            base_url,
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.api_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn endpoint_for(&self, model: &str) -> Result<Url, ProviderError> {
        let model = model.trim();
        if model.is_empty() || model.contains('/') {
            return Err(ProviderError::InvalidEndpoint(format!(
                "invalid model name '{model}'"
            )));
        }
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(path.as_str());
        }
        base.join(format!("v1beta/models/{model}:generateContent").as_str())
            .map_err(|e| ProviderError::InvalidEndpoint(e.to_string()))
    }
}

impl GenerateContentOps for GeminiClient {
    fn generate(&self, request: &GenerateContentRequest) -> Result<String, ProviderError> {
        let endpoint = self.endpoint_for(request.model.as_str())?;
        let body = WireRequest {
            contents: [WireContent {
                role: "user",
                parts: request.parts.as_slice(),
            }],
        };

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::ClientInit(e.to_string()))?;
        let resp = client
            .post(endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let raw = resp
            .text()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        debug!(
            model = request.model.as_str(),
            response_bytes = raw.len(),
            "provider responded"
        );
        extract_response_text(raw.as_str())
    }
}

fn extract_response_text(raw: &str) -> Result<String, ProviderError> {
    let payload: WireResponse =
        serde_json::from_str(raw).map_err(|e| ProviderError::Decode(e.to_string()))?;

    let first = payload.candidates.first();
    let text = first
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter(|p| p.thought != Some(true))
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = payload
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .or_else(|| first.and_then(|c| c.finish_reason.clone()));
        return Err(ProviderError::EmptyResponse { reason });
    }
    Ok(text)
}
