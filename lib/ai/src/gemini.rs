//! Gemini backend.
//!
//! Talks to the Generative Language API's `generateContent` endpoint. When a
//! request carries an output schema, the model is asked for JSON constrained
//! to that schema and the reply is parsed into `structured_output`.

use crate::backend::{LlmBackend, LlmBackendConfig, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
use crate::error::LlmError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Schema keywords the API rejects.
const UNSUPPORTED_SCHEMA_KEYS: [&str; 3] = ["$schema", "additionalProperties", "title"];

/// Backend for Google's Gemini models.
pub struct GeminiBackend {
    client: Client,
    config: LlmBackendConfig,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GeminiBackend {
    /// Creates a backend from its configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the API key or model is empty, or if the HTTP
    /// client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, LlmError> {
        if config.api_key.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "API key is empty".to_string(),
            });
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::InvalidConfig {
                reason: "model is empty".to_string(),
            });
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                reason: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1beta/{}",
            self.config.base_url.trim_end_matches('/'),
            path
        )
    }

    fn map_http_error(&self, error: &reqwest::Error) -> LlmError {
        if error.is_timeout() {
            LlmError::Timeout
        } else if error.is_connect() {
            LlmError::ProviderUnavailable {
                provider: LlmProvider::Gemini.to_string(),
                reason: error.to_string(),
            }
        } else {
            LlmError::RequestFailed {
                reason: error.to_string(),
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
        let response = request
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| self.map_http_error(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        tracing::warn!(status = %status, body = %body, "Gemini request rejected");
        Err(status_error(status, retry_after_secs, &body))
    }
}

fn status_error(status: StatusCode, retry_after_secs: Option<u64>, body: &str) -> LlmError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited { retry_after_secs },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::InvalidConfig {
            reason: format!("authentication failed: {body}"),
        },
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => {
            LlmError::ProviderUnavailable {
                provider: LlmProvider::Gemini.to_string(),
                reason: format!("status {status}"),
            }
        }
        StatusCode::GATEWAY_TIMEOUT => LlmError::Timeout,
        _ => LlmError::RequestFailed {
            reason: format!("status {status}: {body}"),
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
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
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_schema: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn build_request(request: &LlmRequest) -> GenerateContentRequest {
    let mut parts = vec![Part {
        text: Some(request.prompt.clone()),
        inline_data: None,
    }];
    parts.extend(request.media.iter().map(|media| Part {
        text: None,
        inline_data: Some(InlineData {
            mime_type: media.mime_type.clone(),
            data: STANDARD.encode(&media.data),
        }),
    }));

    let system_instruction = request.system.as_ref().map(|system| Content {
        role: None,
        parts: vec![Part {
            text: Some(system.clone()),
            inline_data: None,
        }],
    });

    let generation_config = GenerationConfig {
        response_mime_type: request.output_schema.as_ref().map(|_| "application/json"),
        response_schema: request.output_schema.as_ref().map(to_gemini_schema),
        temperature: request.temperature,
        max_output_tokens: request.max_tokens,
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts,
        }],
        system_instruction,
        generation_config,
    }
}

/// Rewrites a JSON Schema into the OpenAPI subset the API accepts: type names
/// are upper-cased and unsupported keywords are dropped.
fn to_gemini_schema(schema: &JsonValue) -> JsonValue {
    match schema {
        JsonValue::Object(object) => {
            let mut converted = Map::with_capacity(object.len());
            for (key, value) in object {
                if UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()) {
                    continue;
                }
                let value = match (key.as_str(), value) {
                    ("type", JsonValue::String(name)) => JsonValue::String(name.to_uppercase()),
                    // Property names are user data, only their schemas are rewritten.
                    ("properties", JsonValue::Object(properties)) => JsonValue::Object(
                        properties
                            .iter()
                            .map(|(name, property)| (name.clone(), to_gemini_schema(property)))
                            .collect(),
                    ),
                    _ => to_gemini_schema(value),
                };
                converted.insert(key.clone(), value);
            }
            JsonValue::Object(converted)
        }
        JsonValue::Array(items) => JsonValue::Array(items.iter().map(to_gemini_schema).collect()),
        other => other.clone(),
    }
}

fn parse_response(
    response: GenerateContentResponse,
    request: &LlmRequest,
    fallback_model: &str,
) -> Result<LlmResponse, LlmError> {
    if let Some(reason) = response
        .prompt_feedback
        .and_then(|feedback| feedback.block_reason)
    {
        return Err(LlmError::RequestFailed {
            reason: format!("prompt blocked: {reason}"),
        });
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseParseFailed {
            reason: "no candidates in response".to_string(),
        })?;

    let content: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(LlmError::ResponseParseFailed {
            reason: format!(
                "empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ),
        });
    }

    // A reply that is not JSON is left for the caller to reject against its schema.
    let structured_output = request
        .output_schema
        .as_ref()
        .and_then(|_| serde_json::from_str(&content).ok());

    let usage = response.usage_metadata.unwrap_or_default();

    Ok(LlmResponse {
        content,
        structured_output,
        usage: TokenUsage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        },
        model: response
            .model_version
            .unwrap_or_else(|| fallback_model.to_string()),
    })
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let url = self.endpoint(&format!("models/{}:generateContent", self.config.model));
        let body = build_request(request);

        tracing::debug!(
            model = %self.config.model,
            media_parts = request.media.len(),
            structured = request.output_schema.is_some(),
            "sending Gemini request"
        );

        let response = self.send(self.client.post(&url).json(&body)).await?;
        let parsed: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        parse_response(parsed, request, &self.config.model)
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        #[derive(Deserialize)]
        struct ModelsResponse {
            #[serde(default)]
            models: Vec<ModelInfo>,
        }
        #[derive(Deserialize)]
        struct ModelInfo {
            name: String,
        }

        let response = self.send(self.client.get(self.endpoint("models"))).await?;
        let models: ModelsResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::ResponseParseFailed {
                    reason: format!("failed to parse models response: {e}"),
                })?;

        Ok(models
            .models
            .into_iter()
            .map(|m| {
                m.name
                    .strip_prefix("models/")
                    .map_or_else(|| m.name.clone(), str::to_string)
            })
            .collect())
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Gemini
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MediaPart;
    use serde_json::json;

    fn quiz_schema() -> JsonValue {
        json!({
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "type": {"type": "string"},
                "questions": {
                    "type": "array",
                    "items": {"type": "object", "properties": {"answer": {"type": "string"}}}
                }
            },
            "required": ["questions"]
        })
    }

    #[test]
    fn new_rejects_empty_key() {
        let config = LlmBackendConfig::gemini("  ", "gemini-1.5-flash-latest");
        assert!(matches!(
            GeminiBackend::new(config),
            Err(LlmError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn schema_types_are_uppercased() {
        let converted = to_gemini_schema(&quiz_schema());
        assert_eq!(converted["type"], "OBJECT");
        assert!(converted.get("additionalProperties").is_none());
        assert_eq!(converted["properties"]["questions"]["type"], "ARRAY");
        assert_eq!(
            converted["properties"]["questions"]["items"]["properties"]["answer"]["type"],
            "STRING"
        );
        // A property that happens to be called "type" keeps its name.
        assert_eq!(converted["properties"]["type"]["type"], "STRING");
        assert_eq!(converted["required"], json!(["questions"]));
    }

    #[test]
    fn request_body_carries_document_and_schema() {
        let request = LlmRequest::new("Génère un quiz")
            .with_system("Tu es un assistant pédagogique.")
            .with_media(MediaPart::new("application/pdf", b"%PDF".to_vec()))
            .with_output_schema(quiz_schema());

        let body = serde_json::to_value(build_request(&request)).expect("serialize");

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "Génère un quiz");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "application/pdf");
        assert_eq!(parts[1]["inlineData"]["data"], STANDARD.encode(b"%PDF"));
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Tu es un assistant pédagogique."
        );
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn plain_request_has_no_json_mode() {
        let body = serde_json::to_value(build_request(&LlmRequest::new("Bonjour"))).expect("serialize");
        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    fn response(json: JsonValue) -> GenerateContentResponse {
        serde_json::from_value(json).expect("valid response shape")
    }

    #[test]
    fn parses_structured_output() {
        let request = LlmRequest::new("q").with_output_schema(quiz_schema());
        let parsed = parse_response(
            response(json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [{"text": "{\"questions\": []}"}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4},
                "modelVersion": "gemini-1.5-flash-002"
            })),
            &request,
            "gemini-1.5-flash-latest",
        )
        .expect("parses");

        assert_eq!(parsed.structured_output, Some(json!({"questions": []})));
        assert_eq!(parsed.usage.total(), 16);
        assert_eq!(parsed.model, "gemini-1.5-flash-002");
    }

    #[test]
    fn non_json_reply_has_no_structured_output() {
        let request = LlmRequest::new("q").with_output_schema(quiz_schema());
        let parsed = parse_response(
            response(json!({"candidates": [{"content": {"parts": [{"text": "désolé"}]}}]})),
            &request,
            "gemini-1.5-flash-latest",
        )
        .expect("parses");

        assert_eq!(parsed.content, "désolé");
        assert!(parsed.structured_output.is_none());
        assert_eq!(parsed.model, "gemini-1.5-flash-latest");
    }

    #[test]
    fn blocked_or_empty_responses_fail() {
        let request = LlmRequest::new("q");
        assert!(matches!(
            parse_response(
                response(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
                &request,
                "m"
            ),
            Err(LlmError::RequestFailed { .. })
        ));
        assert!(matches!(
            parse_response(response(json!({"candidates": []})), &request, "m"),
            Err(LlmError::ResponseParseFailed { .. })
        ));
        assert!(matches!(
            parse_response(
                response(json!({"candidates": [{"finishReason": "MAX_TOKENS"}]})),
                &request,
                "m"
            ),
            Err(LlmError::ResponseParseFailed { .. })
        ));
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, Some(7), ""),
            LlmError::RateLimited {
                retry_after_secs: Some(7)
            }
        );
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, None, "bad key"),
            LlmError::InvalidConfig { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, None, ""),
            LlmError::ProviderUnavailable { .. }
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, None, "schema"),
            LlmError::RequestFailed { .. }
        ));
    }
}
