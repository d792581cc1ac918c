//! Google Gemini API client.
//!
//! Calls the Gemini `v1beta/models/{model}:generateContent` endpoint
//! (non-streaming) and classifies failures into the [`AiError`]
//! taxonomy so callers can tell credential problems from outages.

use serde_json::{json, Value};

use crate::agent::provider::{CompletionClient, CompletionRequest};
use crate::agent::AiError;
use crate::sessions::MessageRole;

use async_trait::async_trait;

/// Request timeout. Also the upper bound on chat-turn latency when the
/// service hangs: a timeout is classified as `NetworkUnavailable` and
/// routed through the fallback path.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connect timeout for the underlying HTTP client.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Google Gemini completion client.
#[derive(Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, AiError> {
        if api_key.trim().is_empty() {
            return Err(AiError::InvalidApiKey(
                "API key must not be empty".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AiError::Unknown {
                status: 0,
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com".to_string(),
        })
    }

    pub fn with_base_url(mut self, url: String) -> Result<Self, AiError> {
        let parsed = url::Url::parse(&url)
            .map_err(|e| AiError::InvalidBaseUrl(format!("invalid URL \"{url}\": {e}")))?;
        if parsed.scheme() != "https" {
            return Err(AiError::InvalidBaseUrl(format!(
                "base URL must use https scheme, got \"{}\"",
                parsed.scheme()
            )));
        }
        // Strip trailing slash for consistent path joining
        self.base_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Build the JSON body for the Gemini generateContent API.
    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut contents: Vec<Value> = Vec::new();

        for msg in &request.history {
            let role = match msg.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "model",
            };
            contents.push(json!({
                "role": role,
                "parts": [{ "text": msg.content }],
            }));
        }

        // Final user turn: the prompt, plus any attached images as
        // inline data parts. Image-only turns have no textual anchor,
        // so the prompt is widened to make the model ground itself in
        // what it can actually see.
        let prompt_text = if request.images.is_empty() {
            request.prompt.clone()
        } else {
            format!(
                "{}\n\nThe user attached {} image(s). Describe what you see in them \
before asking your question.",
                request.prompt,
                request.images.len()
            )
        };
        let mut parts: Vec<Value> = vec![json!({ "text": prompt_text })];
        for image in &request.images {
            parts.push(json!({
                "inline_data": {
                    "mime_type": image.mime_type,
                    "data": image.data,
                }
            }));
        }
        contents.push(json!({ "role": "user", "parts": parts }));

        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 2048,
            },
            "safetySettings": [
                { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
                { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
                { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
                { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_MEDIUM_AND_ABOVE" },
            ],
        })
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AiError> {
        let body = self.build_body(&request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            return Err(classify_status_error(status.as_u16(), &text));
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| AiError::Unknown {
            status: status.as_u16(),
            message: format!("unparseable response: {e}"),
        })?;
        extract_text(&parsed).ok_or_else(|| AiError::Unknown {
            status: status.as_u16(),
            message: "response contained no text candidates".to_string(),
        })
    }
}

/// Map reqwest transport errors onto the adapter taxonomy. Timeouts
/// and connect failures both count as the service being unreachable.
fn classify_transport_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() || e.is_connect() {
        AiError::NetworkUnavailable(e.to_string())
    } else {
        AiError::Unknown {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}

/// Classify a non-2xx Gemini response by status code and body.
fn classify_status_error(status: u16, body: &str) -> AiError {
    let message = extract_error_message(body).unwrap_or_else(|| body.to_string());
    match status {
        400 if message.contains("API key") || message.contains("API_KEY") => {
            AiError::InvalidCredentials(message)
        }
        401 => AiError::InvalidCredentials(message),
        403 => AiError::PermissionDenied(message),
        429 => AiError::QuotaExceeded(message),
        _ => AiError::Unknown { status, message },
    }
}

/// Pull `error.message` out of a Gemini error body, if present.
fn extract_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;
    parsed
        .get("error")?
        .get("message")?
        .as_str()
        .map(|s| s.to_string())
}

/// Join the text parts of the first candidate.
fn extract_text(parsed: &Value) -> Option<String> {
    let parts = parsed
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join("");
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
