//! Core types and utilities for the kelasi content generation platform.
//!
//! This crate provides the identifiers and error handling foundation shared
//! by the content, credits, generation and server crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, PaymentReference, ShareId, UserId};
