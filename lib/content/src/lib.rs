//! Content contracts for the kelasi generation pipeline.
//!
//! This crate owns the shapes that flow through generation:
//!
//! - **Schema contracts**: quiz, lesson and video-script requests and results,
//!   with hand-rolled validators that return typed failures
//! - **Share codec**: a self-contained, URL-safe encoding of a quiz that can be
//!   reconstructed from a link without server storage
//! - **Export**: a deterministic CSV rendering of a quiz

pub mod error;
pub mod export;
pub mod lesson;
pub mod schema;
pub mod share;
pub mod video;

pub use error::{DecodeError, InvalidInput, SchemaViolation};
pub use export::{EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME, to_csv};
pub use lesson::{LessonContent, LessonRequest, LessonSection};
pub use schema::{
    DocumentInput, GenerationRequest, QuestionType, Question, QuizLimits, QuizRequest,
    QuizResult, TRUE_FALSE_OPTIONS,
};
pub use share::{ShareToken, decode, encode, share_url};
pub use video::{Scene, VideoScript, VideoScriptRequest};
