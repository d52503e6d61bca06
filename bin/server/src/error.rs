//! HTTP error mapping for API handlers.
//!
//! Each domain error keeps its full report for the logs; the client only
//! sees a status code and a French `{"error": ...}` message.

use crate::payment::PaymentError;
use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use kelasi_content::{DecodeError, InvalidInput};
use kelasi_credits::LedgerError;
use kelasi_generation::PipelineError;
use rootcause::prelude::Report;
use serde_json::json;

/// Errors returned by API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// A generation attempt failed at some stage.
    Pipeline(Report<PipelineError>),
    /// A share link could not be reconstructed.
    Share(DecodeError),
    /// The credit ledger refused or failed a direct query.
    Ledger(Report<LedgerError>),
    /// The payment redirect could not be prepared.
    Payment(PaymentError),
    /// The request body could not be read into the expected shape.
    Body(String),
}

impl From<Report<PipelineError>> for ApiError {
    fn from(report: Report<PipelineError>) -> Self {
        Self::Pipeline(report)
    }
}

impl From<InvalidInput> for ApiError {
    fn from(err: InvalidInput) -> Self {
        Self::Pipeline(PipelineError::InvalidInput(err).into())
    }
}

impl From<DecodeError> for ApiError {
    fn from(err: DecodeError) -> Self {
        Self::Share(err)
    }
}

impl From<Report<LedgerError>> for ApiError {
    fn from(report: Report<LedgerError>) -> Self {
        Self::Ledger(report)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        Self::Payment(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        Self::Body(rejection.body_text())
    }
}

impl ApiError {
    /// Status code and client-facing message.
    #[must_use]
    pub fn status_and_message(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Pipeline(report) => {
                let error = report.current_context();
                let status = match error {
                    PipelineError::InvalidInput(_) | PipelineError::MissingInput => {
                        StatusCode::BAD_REQUEST
                    }
                    PipelineError::Unauthenticated => StatusCode::UNAUTHORIZED,
                    PipelineError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
                    PipelineError::LedgerUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineError::GenerationFailed { .. }
                    | PipelineError::MalformedOutput { .. } => StatusCode::BAD_GATEWAY,
                };
                (status, error.user_message())
            }
            Self::Share(_) => (
                StatusCode::BAD_REQUEST,
                "Ce lien de quiz est invalide ou corrompu.",
            ),
            Self::Ledger(report) => match report.current_context() {
                LedgerError::AccountNotFound { .. } => (
                    StatusCode::NOT_FOUND,
                    "Aucun compte de crédits n'est associé à cet utilisateur.",
                ),
                LedgerError::InvalidAmount { .. } => {
                    (StatusCode::BAD_REQUEST, "Le montant de crédits est invalide.")
                }
                LedgerError::Storage { .. } => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Le service de crédits est indisponible. Veuillez réessayer plus tard.",
                ),
            },
            Self::Payment(err) => {
                let status = match err {
                    PaymentError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, err.user_message())
            }
            Self::Body(_) => (
                StatusCode::BAD_REQUEST,
                "La demande est invalide. Vérifiez les champs du formulaire.",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        match &self {
            Self::Pipeline(report) => log(status, report),
            Self::Share(err) => tracing::info!(error = %err, "rejected share link"),
            Self::Ledger(report) => log(status, report),
            Self::Payment(err) => log(status, err),
            Self::Body(reason) => log(status, reason),
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn log(status: StatusCode, error: &dyn std::fmt::Display) {
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %error, "request failed");
    } else {
        tracing::info!(status = status.as_u16(), error = %error, "request rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelasi_core::UserId;

    fn status_of(err: ApiError) -> StatusCode {
        err.status_and_message().0
    }

    #[test]
    fn pipeline_errors_map_to_statuses() {
        let cases = [
            (
                PipelineError::InvalidInput(InvalidInput::MissingSource),
                StatusCode::BAD_REQUEST,
            ),
            (PipelineError::MissingInput, StatusCode::BAD_REQUEST),
            (PipelineError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (
                PipelineError::InsufficientCredits {
                    balance: 0,
                    cost: 1,
                },
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                PipelineError::LedgerUnavailable {
                    reason: "down".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                PipelineError::GenerationFailed {
                    reason: "timeout".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                PipelineError::MalformedOutput {
                    reason: "not JSON".to_string(),
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(status_of(ApiError::from(Report::new(error))), expected);
        }
    }

    #[test]
    fn share_and_ledger_errors_map_to_statuses() {
        let (status, message) = ApiError::from(DecodeError::Empty).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Ce lien de quiz est invalide ou corrompu.");

        let not_found = LedgerError::AccountNotFound {
            user_id: UserId::new(),
        };
        assert_eq!(
            status_of(ApiError::from(Report::new(not_found))),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn unreadable_body_is_bad_request() {
        let (status, message) =
            ApiError::Body("missing field `topic`".to_string()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            message,
            "La demande est invalide. Vérifiez les champs du formulaire."
        );
    }

    #[test]
    fn missing_payment_config_is_internal() {
        let (status, message) = ApiError::from(PaymentError::NotConfigured).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            message,
            "Une erreur interne est survenue lors de la préparation du paiement."
        );
    }
}
