//! Application state and routing.

use crate::api;
use crate::auth::SessionStore;
use crate::config::ServerConfig;
use crate::payment::PaymentConfig;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use kelasi_ai::LlmBackend;
use kelasi_credits::CreditLedger;
use kelasi_generation::{GenerationContext, LessonFlow, Pipeline, QuizFlow, VideoScriptFlow};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Headroom for JSON framing around a base64 document.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared application state.
pub struct AppState {
    /// Session lookups.
    pub sessions: Arc<dyn SessionStore>,
    /// Ledger, backend and settings shared by the pipelines.
    pub generation: GenerationContext,
    pub quiz: Pipeline<QuizFlow>,
    pub lesson: Pipeline<LessonFlow>,
    pub video: Pipeline<VideoScriptFlow>,
    /// Origin share links are built on.
    pub public_origin: String,
    /// Credits granted to newly opened accounts.
    pub signup_balance: i64,
    /// Payment gateway settings, if payments are enabled.
    pub payment: Option<PaymentConfig>,
}

impl AppState {
    /// Wires the pipelines for a configuration.
    #[must_use]
    pub fn new(
        config: &ServerConfig,
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn CreditLedger>,
        backend: Arc<dyn LlmBackend>,
    ) -> Self {
        let language = config.generation.language.as_str();
        let settings = config.credits.settings(config.generation.timeout());
        let generation = GenerationContext::new(ledger, backend, settings);

        Self {
            sessions,
            quiz: Pipeline::new(
                generation.clone(),
                QuizFlow::new(config.quiz.clone(), language),
            ),
            lesson: Pipeline::new(generation.clone(), LessonFlow::new(language)),
            video: Pipeline::new(generation.clone(), VideoScriptFlow::new(language)),
            generation,
            public_origin: config.public_origin.clone(),
            signup_balance: config.credits.signup_balance,
            payment: config.payment.clone(),
        }
    }
}

/// Builds the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    // Documents arrive base64-encoded, a third larger than their raw size.
    let max_document_bytes = state.quiz.flow().limits().max_document_bytes;
    let body_limit = max_document_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;

    Router::new()
        .route("/healthz", get(api::health))
        .route("/api/quiz", post(api::generate_quiz))
        .route("/api/quiz/{id}", get(api::shared_quiz))
        .route("/api/quiz/{id}/export", get(api::export_quiz))
        .route("/api/lesson", post(api::generate_lesson))
        .route("/api/video-script", post(api::generate_video_script))
        .route("/api/credits", get(api::credits))
        .route("/api/account", post(api::open_account))
        .route("/api/models", get(api::list_models))
        .route("/api/payment/redirect", post(api::payment_redirect))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
