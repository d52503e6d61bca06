//! Generation primitives for the kelasi platform.
//!
//! The generation capability is treated as a black box: given a prompt, an
//! optional document and a target schema, it returns an object conforming
//! to that schema or an error. This crate provides:
//!
//! - **Backend**: the [`LlmBackend`] trait and its request/response types
//! - **LLM Call**: a single-shot invocation with optional structured output
//! - **Prompt templates**: prompts with required variables and optional sections
//! - **Gemini**: an HTTP backend for Google's Generative Language API

pub mod backend;
pub mod error;
pub mod gemini;
pub mod llm_call;
pub mod prompt;

pub use backend::{
    LlmBackend, LlmBackendConfig, LlmProvider, LlmRequest, LlmResponse, MediaPart, TokenUsage,
};
pub use error::{LlmError, PromptError};
pub use gemini::GeminiBackend;
pub use llm_call::{LlmCall, LlmCallResult, LlmInvocationId};
pub use prompt::{PromptTemplate, VariableDefinition};
