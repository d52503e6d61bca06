//! Shareable quiz links.
//!
//! A quiz is serialized to JSON and then base64url-encoded so it can ride in
//! a single `data` query parameter. Nothing is stored server-side: a link is
//! valid exactly when its token decodes to a structurally valid quiz.

use crate::error::DecodeError;
use crate::schema::QuizResult;
use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use kelasi_core::ShareId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine used to produce tokens: URL-safe alphabet, no padding.
const TOKEN_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Engine for links minted before tokens switched to the URL-safe alphabet.
const LEGACY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// An opaque, URL-safe encoding of a complete quiz.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShareToken(String);

impl ShareToken {
    /// Returns the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the token, returning its text.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ShareToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encodes a quiz into a share token.
///
/// The encoding is deterministic: field order is fixed by the quiz types, so
/// equal quizzes always produce equal tokens.
#[must_use]
pub fn encode(quiz: &QuizResult) -> ShareToken {
    // Serializing owned strings and vectors cannot fail.
    let json = serde_json::to_vec(quiz).expect("quiz serializes to JSON");
    ShareToken(TOKEN_ENGINE.encode(json))
}

/// Reconstructs a quiz from a share token.
///
/// Unknown fields are ignored; missing fields fail. Tokens minted with the
/// standard base64 alphabet are still accepted, including those whose `+`
/// characters were turned into spaces by form decoding.
///
/// # Errors
///
/// Returns a `DecodeError` if the token is not base64, does not hold a quiz,
/// or holds a quiz that violates the quiz schema. No partial quiz is ever
/// returned.
pub fn decode(token: &str) -> Result<QuizResult, DecodeError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = if token.contains(['+', '/', ' ']) {
        LEGACY_ENGINE.decode(token.replace(' ', "+"))
    } else {
        TOKEN_ENGINE.decode(token)
    }
    .map_err(|e| DecodeError::Encoding {
        reason: e.to_string(),
    })?;

    let quiz: QuizResult = serde_json::from_slice(&bytes).map_err(|e| DecodeError::Format {
        reason: e.to_string(),
    })?;

    quiz.validate_structure().map_err(DecodeError::Invalid)?;
    Ok(quiz)
}

/// Builds the public link for a shared quiz.
///
/// The id segment is never interpreted; only `data` carries state.
#[must_use]
pub fn share_url(origin: &str, id: &ShareId, token: &ShareToken) -> String {
    format!("{}/quiz/{}?data={}", origin.trim_end_matches('/'), id, token)
}
