//! Lesson plan contracts.

use crate::error::{InvalidInput, SchemaViolation};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Longest lesson that may be planned, in minutes.
pub const MAX_LESSON_MINUTES: u32 = 240;

/// A request for a lesson plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRequest {
    /// What the lesson teaches.
    pub topic: String,
    /// Class or grade the lesson targets.
    pub grade_level: String,
    /// School subject, if the topic alone is ambiguous.
    #[serde(default)]
    pub subject: Option<String>,
    /// Planned duration in minutes.
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl LessonRequest {
    /// Checks the request against its contract.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), InvalidInput> {
        if self.topic.trim().is_empty() {
            return Err(InvalidInput::EmptyField { field: "topic" });
        }
        if self.grade_level.trim().is_empty() {
            return Err(InvalidInput::EmptyField {
                field: "gradeLevel",
            });
        }
        if let Some(minutes) = self.duration_minutes
            && !(1..=MAX_LESSON_MINUTES).contains(&minutes)
        {
            return Err(InvalidInput::OutOfRange {
                field: "durationMinutes",
                value: i64::from(minutes),
                min: 1,
                max: i64::from(MAX_LESSON_MINUTES),
            });
        }
        Ok(())
    }
}

/// One section of a lesson plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonSection {
    /// Section heading.
    pub heading: String,
    /// Section body.
    pub body: String,
}

/// A generated lesson plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonContent {
    /// Lesson title.
    pub title: String,
    /// Learning objectives.
    pub objectives: Vec<String>,
    /// Lesson body, in teaching order.
    pub sections: Vec<LessonSection>,
}

impl LessonContent {
    /// Validates a generated lesson plan.
    ///
    /// # Errors
    ///
    /// Returns the first missing or blank field.
    pub fn validate(&self) -> Result<(), SchemaViolation> {
        if self.title.trim().is_empty() {
            return Err(SchemaViolation::MissingContent { field: "title" });
        }
        if self.objectives.iter().all(|o| o.trim().is_empty()) {
            return Err(SchemaViolation::MissingContent {
                field: "objectives",
            });
        }
        if self.sections.is_empty() {
            return Err(SchemaViolation::MissingContent { field: "sections" });
        }
        if self
            .sections
            .iter()
            .any(|s| s.heading.trim().is_empty() || s.body.trim().is_empty())
        {
            return Err(SchemaViolation::MissingContent {
                field: "sections.heading/body",
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
                "title": { "type": "string", "description": "The lesson title." },
                "objectives": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Learning objectives for the lesson."
                },
                "sections": {
                    "type": "array",
                    "description": "Lesson sections in teaching order.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "heading": { "type": "string" },
                            "body": { "type": "string" }
                        },
                        "required": ["heading", "body"]
                    }
                }
            },
            "required": ["title", "objectives", "sections"]
        })
    }
}
