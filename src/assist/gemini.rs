//! Gemini `generateContent` REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{GenerationRequest, TextGenerator, TurnRole};
use crate::error::LlmError;

const PROVIDER: &str = "gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct GeminiGenerator {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: SecretString, model: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point at a different endpoint root (`{base}/{model}:generateContent`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, LlmError> {
        let body = GenerateContentRequest::from(request);
        let url = format!("{}/{}:generateContent", self.base_url, self.model);

        // Key goes in a header so it never shows up in URL logs.
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("request failed: {err}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers().get("retry-after"));
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read Gemini error body".to_string());
            return Err(map_http_error(status, &body_text, retry_after));
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|err| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: err.to_string(),
            })?;
        let text = extract_text(parsed)?;
        debug!(model = %self.model, chars = text.len(), "Gemini response received");
        Ok(text)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
}

impl From<&GenerationRequest> for GenerateContentRequest {
    fn from(request: &GenerationRequest) -> Self {
        let contents = request
            .turns
            .iter()
            .map(|turn| Content {
                role: match turn.role {
                    TurnRole::User => "user",
                    TurnRole::Model => "model",
                },
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        let system_instruction = request.system.as_ref().map(|text| SystemInstruction {
            parts: vec![Part { text: text.clone() }],
        });
        Self {
            contents,
            system_instruction,
        }
    }
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

fn extract_text(response: GenerateContentResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

fn map_http_error(status: StatusCode, body: &str, retry_after: Option<Duration>) -> LlmError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after,
        };
    }

    let message = serde_json::from_str::<ErrorWrapper>(body)
        .ok()
        .map(|wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status.filter(|s| !s.is_empty()) {
                Some(status_text) => format!("{status_text}: {msg}"),
                None => msg,
            }
        })
        .unwrap_or_else(|| body.to_string());

    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason: format!("HTTP {}: {message}", status.as_u16()),
    }
}

fn parse_retry_after(header: Option<&HeaderValue>) -> Option<Duration> {
    let value = header?.to_str().ok()?;
    value.parse::<u64>().ok().map(Duration::from_secs)
}
