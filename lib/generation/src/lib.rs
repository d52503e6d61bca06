//! Generation for the kelasi platform.
//!
//! This crate provides:
//!
//! - **Flows**: one [`GenerationFlow`] per content kind (quiz, lesson plan,
//!   video script) that turns a request into a single model call and checks
//!   what comes back
//! - **Invoker**: runs a flow against an [`LlmBackend`](kelasi_ai::LlmBackend)
//!   exactly once
//! - **Pipeline**: validation, the credit gate, then invocation under a timeout

pub mod error;
pub mod flow;
pub mod invoker;
pub mod pipeline;

pub use error::PipelineError;
pub use flow::{GenerationFlow, LessonFlow, QuizFlow, VideoScriptFlow};
pub use invoker::Invoker;
pub use pipeline::{GenerationContext, Pipeline, RefundPolicy, Settings};
