//! Gemini `generateContent` backend over blocking HTTP.
//!
//! JSON requests ask the model for `application/json` output constrained by a
//! response schema; the answer text is then parsed into a structured value.

use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::io::completion::{
    Completion, CompletionClient, CompletionRequest, ResponseFormat, parse_json_answer,
};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MAX_ERROR_BODY_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Blocking Gemini client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    settings: GeminiSettings,
    http: Client,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!("gemini api key is empty");
        }
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("build http client")?;
        Ok(Self { settings, http })
    }

    fn endpoint(&self) -> String {
        let model = self
            .settings
            .model
            .strip_prefix("models/")
            .unwrap_or(&self.settings.model);
        format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            model
        )
    }
}

impl CompletionClient for GeminiClient {
    #[instrument(skip_all, fields(model = %self.settings.model, json = matches!(request.format, ResponseFormat::Json { .. })))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        let body = build_request(request)?;
        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.settings.api_key)
            .json(&body)
            .send()
            .context("send gemini request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(%status, "gemini request failed");
            bail!("gemini api error ({status}): {}", truncate_chars(&text, MAX_ERROR_BODY_CHARS));
        }

        let parsed: GenerateContentResponse = response.json().context("parse gemini response")?;
        let text = extract_text(&parsed)?;
        debug!(bytes = text.len(), "gemini answered");
        match request.format {
            ResponseFormat::Text => Ok(Completion::Text(text)),
            ResponseFormat::Json { .. } => Ok(Completion::Structured(parse_json_answer(&text)?)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

fn build_request(request: &CompletionRequest) -> Result<GenerateContentRequest> {
    let system_instruction = request.system_prompt().map(|text| Content {
        role: None,
        parts: vec![Part { text: Some(text) }],
    });
    let (response_mime_type, response_schema) = match request.format {
        ResponseFormat::Text => (None, None),
        ResponseFormat::Json { schema } => (
            Some("application/json".to_string()),
            Some(response_schema(schema)?),
        ),
    };
    Ok(GenerateContentRequest {
        system_instruction,
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: Some(request.user_prompt()),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: request.temperature,
            response_mime_type,
            response_schema,
        },
    })
}

/// Reduce a JSON Schema document to the OpenAPI subset Gemini accepts.
fn response_schema(schema_raw: &str) -> Result<Value> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse response schema")?;
    Ok(openapi_subset(&schema))
}

fn openapi_subset(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return schema.clone();
    };
    let mut out = serde_json::Map::new();
    for key in ["type", "description", "enum", "required", "nullable", "format"] {
        if let Some(value) = obj.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }
    if let Some(items) = obj.get("items") {
        out.insert("items".to_string(), openapi_subset(items));
    }
    if let Some(Value::Object(props)) = obj.get("properties") {
        let mapped: serde_json::Map<String, Value> = props
            .iter()
            .map(|(name, prop)| (name.clone(), openapi_subset(prop)))
            .collect();
        out.insert("properties".to_string(), Value::Object(mapped));
        let ordering: Vec<Value> = props.keys().map(|k| json!(k)).collect();
        out.insert("propertyOrdering".to_string(), Value::Array(ordering));
    }
    Value::Object(out)
}

fn extract_text(response: &GenerateContentResponse) -> Result<String> {
    let candidate = response.candidates.first().ok_or_else(|| match &response.prompt_feedback {
        Some(feedback) => anyhow!("gemini returned no candidates (prompt feedback: {feedback})"),
        None => anyhow!("gemini returned no candidates"),
    })?;
    let text: String = candidate
        .content
        .as_ref()
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        bail!(
            "gemini returned empty content (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(text)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
