//! Completion client abstraction.
//!
//! The [`CompletionClient`] trait decouples the loop stages from the hosted
//! model backend. A call returns either plain text or a structured JSON value,
//! never both; the typed helpers below turn a mismatch, an empty answer, or a
//! schema violation into an error instead of substituting content. Tests use
//! scripted clients that replay predetermined responses.

use anyhow::{Context, Result, anyhow, bail};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::io::schema::validate_schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Expected shape of the completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    /// JSON conforming to the given JSON Schema document.
    Json { schema: &'static str },
}

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Ordered messages: a system instruction followed by the task message.
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub format: ResponseFormat,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>, temperature: f64) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            temperature,
            format: ResponseFormat::Text,
        }
    }

    pub fn json(
        system: impl Into<String>,
        user: impl Into<String>,
        temperature: f64,
        schema: &'static str,
    ) -> Self {
        Self {
            messages: vec![Message::system(system), Message::user(user)],
            temperature,
            format: ResponseFormat::Json { schema },
        }
    }

    /// Concatenated system instructions.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Concatenated user messages.
    pub fn user_prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// What a backend returned.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    Structured(Value),
}

/// Abstraction over hosted model backends.
pub trait CompletionClient {
    /// Send the request and block until the model answers.
    fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

impl<C: CompletionClient + ?Sized> CompletionClient for &C {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (**self).complete(request)
    }
}

impl<C: CompletionClient + ?Sized> CompletionClient for Box<C> {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion> {
        (**self).complete(request)
    }
}

/// Request free text and return it trimmed. Empty answers are errors.
#[instrument(skip_all, fields(temperature = request.temperature))]
pub fn complete_text<C: CompletionClient + ?Sized>(
    client: &C,
    request: &CompletionRequest,
) -> Result<String> {
    if request.format != ResponseFormat::Text {
        bail!("complete_text called with a structured request");
    }
    match client.complete(request)? {
        Completion::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(anyhow!("model returned empty content"));
            }
            debug!(bytes = trimmed.len(), "text completion received");
            Ok(trimmed.to_string())
        }
        Completion::Structured(_) => Err(anyhow!("expected text, model returned structured output")),
    }
}

/// Request JSON output, check it against the request schema and deserialize it.
#[instrument(skip_all, fields(temperature = request.temperature))]
pub fn complete_structured<C: CompletionClient + ?Sized, T: DeserializeOwned>(
    client: &C,
    request: &CompletionRequest,
) -> Result<T> {
    let ResponseFormat::Json { schema } = request.format else {
        bail!("complete_structured called with a text request");
    };
    let value = match client.complete(request)? {
        Completion::Structured(value) => value,
        Completion::Text(_) => bail!("expected structured output, model returned text"),
    };
    validate_schema(&value, schema).context("check structured output")?;
    let parsed = serde_json::from_value(value).context("parse structured output")?;
    Ok(parsed)
}

/// Parse a backend's raw JSON answer, tolerating a surrounding markdown fence.
pub fn parse_json_answer(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("model returned empty content");
    }
    let body = strip_code_fence(trimmed);
    serde_json::from_str(body).with_context(|| format!("parse model json ({} bytes)", body.len()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
