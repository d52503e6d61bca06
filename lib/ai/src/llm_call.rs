//! LLM Call primitive.
//!
//! A single-shot inference with optional structured output and attached
//! documents. Every generation flow is exactly one of these.

use crate::backend::{LlmBackend, LlmRequest, LlmResponse, MediaPart, TokenUsage};
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use ulid::Ulid;

/// Unique identifier for an LLM invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LlmInvocationId(Ulid);

impl LlmInvocationId {
    /// Creates a new invocation ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LlmInvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LlmInvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "llm_{}", self.0)
    }
}

/// The result of an LLM Call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    /// Unique identifier for this invocation.
    pub id: LlmInvocationId,
    /// The raw text output.
    pub content: String,
    /// Structured output (if schema was provided).
    pub structured_output: Option<JsonValue>,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

impl LlmCallResult {
    /// Creates a result from an LLM response.
    #[must_use]
    pub fn from_response(id: LlmInvocationId, response: LlmResponse, latency_ms: u64) -> Self {
        Self {
            id,
            content: response.content,
            structured_output: response.structured_output,
            usage: response.usage,
            model: response.model,
            timestamp: Utc::now(),
            latency_ms,
        }
    }
}

/// An LLM Call executor.
///
/// This is a builder for a single backend invocation.
#[derive(Debug, Clone)]
pub struct LlmCall {
    request: LlmRequest,
}

impl LlmCall {
    /// Creates a new LLM Call with the given prompt.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            request: LlmRequest::new(prompt),
        }
    }

    /// Adds a system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.request = self.request.with_system(system);
        self
    }

    /// Adds an output schema for structured output.
    #[must_use]
    pub fn with_output_schema(mut self, schema: JsonValue) -> Self {
        self.request = self.request.with_output_schema(schema);
        self
    }

    /// Attaches a document.
    #[must_use]
    pub fn with_media(mut self, media: MediaPart) -> Self {
        self.request = self.request.with_media(media);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.request = self.request.with_temperature(temperature);
        self
    }

    /// Returns the request this call will send.
    #[must_use]
    pub fn request(&self) -> &LlmRequest {
        &self.request
    }

    /// Sends the request to the backend once.
    ///
    /// # Errors
    ///
    /// Returns the backend's error unchanged.
    pub async fn execute(&self, backend: &dyn LlmBackend) -> Result<LlmCallResult, LlmError> {
        let id = LlmInvocationId::new();
        let started = Instant::now();

        let outcome = backend.generate(&self.request).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(response) => {
                tracing::info!(
                    invocation_id = %id,
                    model = %response.model,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    latency_ms,
                    "LLM call completed"
                );
                Ok(LlmCallResult::from_response(id, response, latency_ms))
            }
            Err(e) => {
                tracing::warn!(
                    invocation_id = %id,
                    provider = %backend.provider(),
                    error = %e,
                    latency_ms,
                    "LLM call failed"
                );
                Err(e)
            }
        }
    }
}
