//! Error types for generation.

use kelasi_content::InvalidInput;
use std::fmt;

/// Why a generation attempt did not produce content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The request broke its contract. Nothing was charged.
    InvalidInput(InvalidInput),
    /// No identity, or an identity without a credit account.
    Unauthenticated,
    /// The balance does not cover the cost. Nothing was charged.
    InsufficientCredits { balance: i64, cost: i64 },
    /// Neither lesson text nor a document reached the invoker.
    MissingInput,
    /// The credit store could not be reached. The attempt fails closed.
    LedgerUnavailable { reason: String },
    /// The model call failed or timed out.
    GenerationFailed { reason: String },
    /// The model answered with something that is not the requested shape.
    MalformedOutput { reason: String },
}

impl PipelineError {
    /// Message safe to show to a teacher.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(InvalidInput::TextTooShort { .. }) => {
                "Le texte de la leçon est trop court."
            }
            Self::InvalidInput(InvalidInput::DocumentTooLarge { .. }) => {
                "Le document est trop volumineux (5 Mo maximum)."
            }
            Self::InvalidInput(InvalidInput::UnsupportedDocumentType { .. }) => {
                "Seuls les documents PDF sont acceptés."
            }
            Self::InvalidInput(InvalidInput::MissingSource) | Self::MissingInput => {
                "Veuillez fournir un texte de leçon ou un document."
            }
            Self::InvalidInput(InvalidInput::ConflictingSources) => {
                "Veuillez fournir soit un texte, soit un document, mais pas les deux."
            }
            Self::InvalidInput(_) => "La demande est invalide. Vérifiez les champs du formulaire.",
            Self::Unauthenticated => "Authentification requise pour générer du contenu.",
            Self::InsufficientCredits { .. } => {
                "Crédits insuffisants. Veuillez recharger votre compte."
            }
            Self::LedgerUnavailable { .. } => {
                "Le service de crédits est indisponible. Veuillez réessayer plus tard."
            }
            Self::GenerationFailed { .. } => "La génération a échoué. Veuillez réessayer.",
            Self::MalformedOutput { .. } => {
                "Le contenu généré est invalide. Veuillez réessayer."
            }
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(e) => write!(f, "invalid input: {e}"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::InsufficientCredits { balance, cost } => {
                write!(f, "insufficient credits: balance {balance}, cost {cost}")
            }
            Self::MissingInput => write!(f, "neither lesson text nor document provided"),
            Self::LedgerUnavailable { reason } => write!(f, "credit ledger unavailable: {reason}"),
            Self::GenerationFailed { reason } => write!(f, "generation failed: {reason}"),
            Self::MalformedOutput { reason } => write!(f, "malformed generation output: {reason}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<InvalidInput> for PipelineError {
    fn from(e: InvalidInput) -> Self {
        Self::InvalidInput(e)
    }
}
