//! Educational video script contracts.

use crate::error::{InvalidInput, SchemaViolation};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Longest video that may be scripted, in minutes.
pub const MAX_VIDEO_MINUTES: u32 = 30;

/// A request for a video script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoScriptRequest {
    /// What the video explains.
    pub topic: String,
    /// Intended audience, e.g. a grade level.
    #[serde(default)]
    pub audience: Option<String>,
    /// Target running time in minutes.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl VideoScriptRequest {
    /// Checks the request against its contract.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.topic.trim().is_empty() {
            return Err(InvalidInput::EmptyField { field: "topic" });
        }
        if let Some(minutes) = self.duration_minutes
            && !(1..=MAX_VIDEO_MINUTES).contains(&minutes)
        {
            return Err(InvalidInput::OutOfRange {
                field: "durationMinutes",
                value: i64::from(minutes),
                min: 1,
                max: i64::from(MAX_VIDEO_MINUTES),
            });
        }
        Ok(())
    }
}

/// One scene of a video script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Spoken narration.
    pub narration: String,
    /// What is shown on screen.
    pub visuals: String,
}

/// A generated video script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoScript {
    /// Video title.
    pub title: String,
    /// Scenes in running order.
    pub scenes: Vec<Scene>,
}

impl VideoScript {
    /// Validates a generated script.
    ///
    /// # Errors
    ///
    /// Returns the first missing or blank field.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if self.title.trim().is_empty() {
            return Err(SchemaViolation::MissingContent { field: "title" });
        }
        if self.scenes.is_empty() {
            return Err(SchemaViolation::MissingContent { field: "scenes" });
        }
        if self.scenes.iter().any(|s| s.narration.trim().is_empty()) {
            return Err(SchemaViolation::MissingContent {
                field: "scenes.narration",
            });
        }
        Ok(())
    }

    /// JSON Schema the generation capability must produce.
    #[must_use]
    pub fn output_schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "The video title." },
                "scenes": {
                    "type": "array",
                    "description": "Scenes in running order.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "narration": { "type": "string", "description": "What the narrator says." },
                            "visuals": { "type": "string", "description": "What is shown on screen." }
                        },
                        "required": ["narration", "visuals"]
                    }
                }
            },
            "required": ["title", "scenes"]
        })
    }
}
