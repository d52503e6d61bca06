//! Quiz schema contracts.
//!
//! Defines the accepted shapes for a quiz generation request and for the quiz
//! that comes back, and rejects anything that violates their invariants
//! before it reaches generation or a caller.

use crate::error::{InvalidInput, SchemaViolation};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use std::fmt;
use std::str::FromStr;

/// Options every true/false question must offer, in order.
pub const TRUE_FALSE_OPTIONS: [&str; 2] = ["Vrai", "Faux"];

/// Number of questions requested when the client does not say.
pub const DEFAULT_QUESTION_COUNT: u32 = 5;

/// Number of options a multiple choice question carries.
pub const MULTIPLE_CHOICE_OPTIONS: usize = 4;

/// The kind of questions a quiz is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    /// Four options, one of them correct.
    MultipleChoice,
    /// `Vrai` / `Faux`.
    TrueFalse,
    /// Free text answer, options may be empty.
    ShortAnswer,
}

impl QuestionType {
    /// Returns the canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::TrueFalse => "true_false",
            Self::ShortAnswer => "short_answer",
        }
    }

    /// Returns the human label used in generation prompts.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple choice",
            Self::TrueFalse => "true/false",
            Self::ShortAnswer => "short answer",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = InvalidInput;

    /// Accepts both the canonical names and the labels the web form sends.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multiple_choice" | "multiple choice" => Ok(Self::MultipleChoice),
            "true_false" | "true/false" => Ok(Self::TrueFalse),
            "short_answer" | "short answer" => Ok(Self::ShortAnswer),
            _ => Err(InvalidInput::UnknownQuestionType {
                value: s.to_string(),
            }),
        }
    }
}

/// Configured bounds for quiz requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuizLimits {
    /// Smallest number of questions that may be requested.
    #[serde(default = "default_min_questions")]
    pub min_questions: u32,
    /// Largest number of questions that may be requested.
    #[serde(default = "default_max_questions")]
    pub max_questions: u32,
    /// Minimum lesson text length, in characters.
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
    /// Maximum uploaded document size, in bytes.
    #[serde(default = "default_max_document_bytes")]
    pub max_document_bytes: usize,
    /// MIME types accepted for uploaded documents.
    #[serde(default = "default_accepted_mime_types")]
    pub accepted_mime_types: Vec<String>,
}

fn default_min_questions() -> u32 {
    1
}

fn default_max_questions() -> u32 {
    10
}

fn default_min_text_chars() -> usize {
    50
}

fn default_max_document_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_accepted_mime_types() -> Vec<String> {
    vec!["application/pdf".to_string()]
}

impl Default for QuizLimits {
    fn default() -> Self {
        Self {
            min_questions: default_min_questions(),
            max_questions: default_max_questions(),
            min_text_chars: default_min_text_chars(),
            max_document_bytes: default_max_document_bytes(),
            accepted_mime_types: default_accepted_mime_types(),
        }
    }
}

/// An uploaded lesson document.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentInput {
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    /// Declared MIME type.
    pub mime_type: String,
}

impl fmt::Debug for DocumentInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentInput")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl DocumentInput {
    /// Creates a document from raw bytes and a MIME type.
    #[must_use]
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Parses a `data:<mime>;base64,<payload>` URI as produced by browsers.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDataUri` if the URI has the wrong layout, is not
    /// base64 encoded, or carries an invalid payload.
    pub fn from_data_uri(uri: &str) -> Result<Self, InvalidInput> {
        let malformed = |reason: &str| InvalidInput::MalformedDataUri {
            reason: reason.to_string(),
        };

        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| malformed("missing 'data:' scheme"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| malformed("missing ',' separator"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| malformed("payload is not base64 encoded"))?;
        // Parameters such as `;name=lesson.pdf` may precede the encoding marker.
        let mime_type = mime_type.split(';').next().unwrap_or_default().trim();
        if mime_type.is_empty() {
            return Err(malformed("missing MIME type"));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| InvalidInput::MalformedDataUri {
                reason: e.to_string(),
            })?;

        Ok(Self::new(bytes, mime_type.to_lowercase()))
    }
}

/// A quiz request as collected from the client form.
///
/// Field names follow the web form. Use [`QuizRequest::into_generation_request`]
/// to turn it into a validated [`GenerationRequest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    /// Raw lesson text.
    #[serde(default)]
    pub lesson_text: Option<String>,
    /// Uploaded document, as a data URI.
    #[serde(default)]
    pub document_data_uri: Option<String>,
    /// Requested question type.
    pub question_type: String,
    /// Requested number of questions.
    #[serde(default)]
    pub number_of_questions: Option<i64>,
}

impl QuizRequest {
    /// Parses and validates the form into a generation request.
    ///
    /// # Errors
    ///
    /// Returns the first contract violation found. Source presence is checked
    /// before anything else so a request with neither or both sources always
    /// yields a single source error.
    pub fn into_generation_request(
        self,
        limits: &QuizLimits,
    ) -> Result<GenerationRequest, InvalidInput> {
        let text = self.lesson_text.filter(|t| !t.trim().is_empty());
        let uri = self.document_data_uri.filter(|u| !u.trim().is_empty());

        let (text, document) = match (text, uri) {
            (None, None) => return Err(InvalidInput::MissingSource),
            (Some(_), Some(_)) => return Err(InvalidInput::ConflictingSources),
            (Some(text), None) => (Some(text), None),
            (None, Some(uri)) => (None, Some(DocumentInput::from_data_uri(&uri)?)),
        };

        let question_type = self.question_type.parse()?;

        let requested = self
            .number_of_questions
            .unwrap_or(i64::from(DEFAULT_QUESTION_COUNT));
        let count = u32::try_from(requested).map_err(|_| InvalidInput::OutOfRange {
            field: "numberOfQuestions",
            value: requested,
            min: i64::from(limits.min_questions),
            max: i64::from(limits.max_questions),
        })?;

        let request = GenerationRequest {
            text,
            document,
            question_type,
            count,
        };
        request.validate(limits)?;
        Ok(request)
    }
}

/// A quiz generation request that has passed wire parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Lesson text, passed verbatim to generation.
    pub text: Option<String>,
    /// Lesson document, passed as a media part.
    pub document: Option<DocumentInput>,
    /// Kind of questions to generate.
    pub question_type: QuestionType,
    /// Number of questions to generate.
    pub count: u32,
}

impl GenerationRequest {
    /// Creates a request from lesson text.
    #[must_use]
    pub fn from_text(text: impl Into<String>, question_type: QuestionType, count: u32) -> Self {
        Self {
            text: Some(text.into()),
            document: None,
            question_type,
            count,
        }
    }

    /// Creates a request from an uploaded document.
    #[must_use]
    pub fn from_document(document: DocumentInput, question_type: QuestionType, count: u32) -> Self {
        Self {
            text: None,
            document: Some(document),
            question_type,
            count,
        }
    }

    /// Checks the request against its contract and the configured limits.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self, limits: &QuizLimits) -> Result<(), InvalidInput> {
        let text = self.text.as_deref().filter(|t| !t.trim().is_empty());
        let document = self.document.as_ref();

        match (text, document) {
            (None, None) => return Err(InvalidInput::MissingSource),
            (Some(_), Some(_)) => return Err(InvalidInput::ConflictingSources),
            _ => {}
        }

        if self.count < limits.min_questions || self.count > limits.max_questions {
            return Err(InvalidInput::OutOfRange {
                field: "numberOfQuestions",
                value: i64::from(self.count),
                min: i64::from(limits.min_questions),
                max: i64::from(limits.max_questions),
            });
        }

        if let Some(text) = text {
            let actual = text.trim().chars().count();
            if actual < limits.min_text_chars {
                return Err(InvalidInput::TextTooShort {
                    min: limits.min_text_chars,
                    actual,
                });
            }
        }

        if let Some(document) = document {
            if document.bytes.is_empty() {
                return Err(InvalidInput::EmptyField { field: "document" });
            }
            if document.bytes.len() > limits.max_document_bytes {
                return Err(InvalidInput::DocumentTooLarge {
                    max: limits.max_document_bytes,
                    actual: document.bytes.len(),
                });
            }
            if !limits
                .accepted_mime_types
                .iter()
                .any(|accepted| accepted.eq_ignore_ascii_case(&document.mime_type))
            {
                return Err(InvalidInput::UnsupportedDocumentType {
                    mime_type: document.mime_type.clone(),
                });
            }
        }

        Ok(())
    }
}

/// A single quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// The question text.
    #[serde(rename = "question")]
    pub prompt: String,
    /// Possible answers, in display order.
    pub options: Vec<String>,
    /// The correct answer.
    #[serde(rename = "answer")]
    pub correct_answer: String,
}

impl Question {
    /// Creates a question.
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct_answer: correct_answer.into(),
        }
    }

    /// Returns the position of the first option matching the correct answer.
    #[must_use]
    pub fn correct_option_index(&self) -> Option<usize> {
        let answer = normalize(&self.correct_answer);
        self.options.iter().position(|o| normalize(o) == answer)
    }

    fn validate_shape(&self, index: usize) -> Result<(), SchemaViolation> {
        if self.prompt.trim().is_empty() {
            return Err(SchemaViolation::EmptyPrompt { index });
        }
        if self.correct_answer.trim().is_empty() {
            return Err(SchemaViolation::EmptyAnswer { index });
        }
        if !self.options.is_empty() {
            let answer = normalize(&self.correct_answer);
            match self
                .options
                .iter()
                .filter(|o| normalize(o) == answer)
                .count()
            {
                0 => return Err(SchemaViolation::AnswerNotInOptions { index }),
                1 => {}
                _ => return Err(SchemaViolation::AmbiguousAnswer { index }),
            }
        }
        Ok(())
    }

    fn validate_for(&self, question_type: QuestionType, index: usize) -> Result<(), SchemaViolation> {
        match question_type {
            QuestionType::MultipleChoice if self.options.len() != MULTIPLE_CHOICE_OPTIONS => {
                return Err(SchemaViolation::OptionCount {
                    index,
                    expected: MULTIPLE_CHOICE_OPTIONS,
                    actual: self.options.len(),
                });
            }
            QuestionType::TrueFalse => {
                let matches = self.options.len() == TRUE_FALSE_OPTIONS.len()
                    && self
                        .options
                        .iter()
                        .zip(TRUE_FALSE_OPTIONS)
                        .all(|(option, expected)| normalize(option) == normalize(expected));
                if !matches {
                    return Err(SchemaViolation::TrueFalseOptions { index });
                }
            }
            _ => {}
        }
        self.validate_shape(index)
    }
}

/// A generated quiz.
///
/// Carries no server-side identity: its whole state travels in its share token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    /// Questions in presentation order.
    pub questions: Vec<Question>,
}

impl QuizResult {
    /// Creates a quiz from its questions.
    #[must_use]
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Validates a freshly generated quiz against the requested question type.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, by question order.
    pub fn validate_for(&self, question_type: QuestionType) -> Result<(), SchemaViolation> {
        if self.questions.is_empty() {
            return Err(SchemaViolation::NoQuestions);
        }
        self.questions
            .iter()
            .enumerate()
            .try_for_each(|(index, q)| q.validate_for(question_type, index))
    }

    /// Validates a quiz whose question type is unknown, such as one decoded
    /// from a share link.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, by question order.
    pub fn validate_structure(&self) -> Result<(), SchemaViolation> {
        if self.questions.is_empty() {
            return Err(SchemaViolation::NoQuestions);
        }
        self.questions
            .iter()
            .enumerate()
            .try_for_each(|(index, q)| q.validate_shape(index))
    }

    /// JSON Schema the generation capability must produce.
    #[must_use]
    pub fn output_schema() -> JsonValue {
        json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "description": "An array of quiz questions.",
                    "items": {
                        "type": "object",
                        "properties": {
                            "question": { "type": "string", "description": "The question text." },
                            "options": {
                                "type": "array",
                                "items": { "type": "string" },
                                "description": "An array of possible answers."
                            },
                            "answer": { "type": "string", "description": "The correct answer." }
                        },
                        "required": ["question", "options", "answer"]
                    }
                }
            },
            "required": ["questions"]
        })
    }
}

/// Case- and whitespace-insensitive form used to compare answers with options.
pub(crate) fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
