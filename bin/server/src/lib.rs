//! kelasi HTTP server.
//!
//! Exposes quiz, lesson and video-script generation behind the credit gate,
//! share-link decoding and CSV export, credit queries, and the MaxiCash
//! payment redirect.

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod payment;
