//! Error types for the content crate.
//!
//! Validators return these directly; callers wrap them in a rootcause
//! `Report` with their own context as the error travels up:
//! - `InvalidInput`: a request that must never reach the ledger or the model
//! - `SchemaViolation`: a generated or decoded artifact with the wrong shape
//! - `DecodeError`: a share token that cannot be turned back into a quiz

use std::fmt;

/// A generation request that fails its schema contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidInput {
    /// Neither lesson text nor a document was supplied.
    MissingSource,
    /// Both lesson text and a document were supplied.
    ConflictingSources,
    /// The question type is not one of the supported kinds.
    UnknownQuestionType { value: String },
    /// A numeric field is outside its accepted bounds.
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
    /// A required text field is blank.
    EmptyField { field: &'static str },
    /// The lesson text is shorter than the configured minimum.
    TextTooShort { min: usize, actual: usize },
    /// The document exceeds the configured size limit.
    DocumentTooLarge { max: usize, actual: usize },
    /// The document's MIME type is not accepted.
    UnsupportedDocumentType { mime_type: String },
    /// The document data URI could not be parsed.
    MalformedDataUri { reason: String },
}

impl fmt::Display for InvalidInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSource => {
                write!(f, "either lesson text or a document must be provided")
            }
            Self::ConflictingSources => {
                write!(f, "lesson text and a document cannot both be provided")
            }
            Self::UnknownQuestionType { value } => {
                write!(f, "unknown question type '{value}'")
            }
            Self::OutOfRange {
                field,
                value,
                min,
                max,
            } => {
                write!(f, "{field} must be between {min} and {max}, got {value}")
            }
            Self::EmptyField { field } => write!(f, "{field} must not be empty"),
            Self::TextTooShort { min, actual } => {
                write!(
                    f,
                    "lesson text must contain at least {min} characters, got {actual}"
                )
            }
            Self::DocumentTooLarge { max, actual } => {
                write!(f, "document is {actual} bytes, maximum is {max}")
            }
            Self::UnsupportedDocumentType { mime_type } => {
                write!(f, "unsupported document type '{mime_type}'")
            }
            Self::MalformedDataUri { reason } => {
                write!(f, "malformed document data URI: {reason}")
            }
        }
    }
}

impl std::error::Error for InvalidInput {}

/// A structural violation found in a quiz, lesson or video script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// The quiz has no questions.
    NoQuestions,
    /// A question has a blank prompt.
    EmptyPrompt { index: usize },
    /// A question has a blank correct answer.
    EmptyAnswer { index: usize },
    /// A question has the wrong number of options for its type.
    OptionCount {
        index: usize,
        expected: usize,
        actual: usize,
    },
    /// A true/false question does not offer exactly `Vrai` and `Faux`.
    TrueFalseOptions { index: usize },
    /// The correct answer matches none of the options.
    AnswerNotInOptions { index: usize },
    /// The correct answer matches more than one option.
    AmbiguousAnswer { index: usize },
    /// A required field of a lesson or script is missing or blank.
    MissingContent { field: &'static str },
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoQuestions => write!(f, "quiz has no questions"),
            Self::EmptyPrompt { index } => write!(f, "question {index} has an empty prompt"),
            Self::EmptyAnswer { index } => write!(f, "question {index} has an empty answer"),
            Self::OptionCount {
                index,
                expected,
                actual,
            } => {
                write!(
                    f,
                    "question {index} has {actual} options, expected {expected}"
                )
            }
            Self::TrueFalseOptions { index } => {
                write!(f, "question {index} must offer exactly 'Vrai' and 'Faux'")
            }
            Self::AnswerNotInOptions { index } => {
                write!(f, "question {index} answer matches none of its options")
            }
            Self::AmbiguousAnswer { index } => {
                write!(f, "question {index} answer matches several options")
            }
            Self::MissingContent { field } => write!(f, "missing content: {field}"),
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// A share token that cannot be reconstructed into a quiz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The token is empty.
    Empty,
    /// The token is not valid base64.
    Encoding { reason: String },
    /// The decoded bytes are not a quiz document.
    Format { reason: String },
    /// The quiz document violates the quiz schema.
    Invalid(SchemaViolation),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "share token is empty"),
            Self::Encoding { reason } => write!(f, "share token is not valid base64: {reason}"),
            Self::Format { reason } => write!(f, "share token does not hold a quiz: {reason}"),
            Self::Invalid(violation) => write!(f, "shared quiz is invalid: {violation}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_display_names_bounds() {
        let err = InvalidInput::OutOfRange {
            field: "numberOfQuestions",
            value: 11,
            min: 1,
            max: 10,
        };
        let text = err.to_string();
        assert!(text.contains("numberOfQuestions"));
        assert!(text.contains("11"));
        assert!(text.contains("10"));
    }

    #[test]
    fn decode_error_wraps_violation() {
        let err = DecodeError::Invalid(SchemaViolation::EmptyAnswer { index: 2 });
        assert!(err.to_string().contains("question 2"));
    }
}
