//! JSON API handlers.

use crate::app::AppState;
use crate::auth::{OptionalAuth, RequireAuth};
use crate::error::ApiError;
use crate::payment::{self, CheckoutForm};
use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, JsonRejection},
    },
    http::header,
    response::{Html, IntoResponse},
};
use kelasi_content::{
    EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME, LessonContent, LessonRequest, QuizRequest, QuizResult,
    ShareToken, VideoScript, VideoScriptRequest, decode, encode, share_url, to_csv,
};
use kelasi_core::{PaymentReference, ShareId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A generated quiz and the link to share it.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResponse {
    pub quiz: QuizResult,
    pub share_token: ShareToken,
    pub share_url: String,
}

/// Query carried by share links.
#[derive(Debug, Deserialize)]
pub struct ShareQuery {
    #[serde(default)]
    pub data: Option<String>,
}

impl ShareQuery {
    fn quiz(&self) -> Result<QuizResult, ApiError> {
        Ok(decode(self.data.as_deref().unwrap_or_default())?)
    }
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub credits: i64,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<String>,
}

/// `POST /api/quiz`
pub async fn generate_quiz(
    State(state): State<Arc<AppState>>,
    OptionalAuth(identity): OptionalAuth,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> Result<Json<QuizResponse>, ApiError> {
    let Json(request) = payload?;
    let request = request.into_generation_request(state.quiz.flow().limits())?;
    let quiz = state.quiz.run(identity, request).await?;

    let share_token = encode(&quiz);
    let share_url = share_url(&state.public_origin, &ShareId::new(), &share_token);
    Ok(Json(QuizResponse {
        quiz,
        share_token,
        share_url,
    }))
}

/// `POST /api/lesson`
pub async fn generate_lesson(
    State(state): State<Arc<AppState>>,
    OptionalAuth(identity): OptionalAuth,
    payload: Result<Json<LessonRequest>, JsonRejection>,
) -> Result<Json<LessonContent>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.lesson.run(identity, request).await?))
}

/// `POST /api/video-script`
pub async fn generate_video_script(
    State(state): State<Arc<AppState>>,
    OptionalAuth(identity): OptionalAuth,
    payload: Result<Json<VideoScriptRequest>, JsonRejection>,
) -> Result<Json<VideoScript>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.video.run(identity, request).await?))
}

/// `GET /api/quiz/{id}?data=...`
///
/// The id segment is not interpreted.
pub async fn shared_quiz(Query(query): Query<ShareQuery>) -> Result<Json<QuizResult>, ApiError> {
    Ok(Json(query.quiz()?))
}

/// `GET /api/quiz/{id}/export?data=...`
pub async fn export_quiz(Query(query): Query<ShareQuery>) -> Result<impl IntoResponse, ApiError> {
    let quiz = query.quiz()?;
    Ok((
        [
            (header::CONTENT_TYPE, EXPORT_CONTENT_TYPE.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ),
        ],
        to_csv(&quiz),
    ))
}

/// `GET /api/credits`
pub async fn credits(
    State(state): State<Arc<AppState>>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = state.generation.ledger.balance(user_id).await?;
    Ok(Json(CreditsResponse { credits }))
}

/// `POST /api/account`
///
/// Opens the caller's credit account with the signup balance. Calling it
/// again leaves the balance untouched.
pub async fn open_account(
    State(state): State<Arc<AppState>>,
    RequireAuth(user_id): RequireAuth,
) -> Result<Json<CreditsResponse>, ApiError> {
    let credits = state
        .generation
        .ledger
        .open_account(user_id, state.signup_balance)
        .await?;
    tracing::info!(user_id = %user_id, credits, "credit account opened");
    Ok(Json(CreditsResponse { credits }))
}

/// `GET /api/models`
pub async fn list_models(
    State(state): State<Arc<AppState>>,
    RequireAuth(_): RequireAuth,
) -> Result<Json<ModelsResponse>, ApiError> {
    let models = state.generation.list_models().await?;
    Ok(Json(ModelsResponse { models }))
}

/// `POST /api/payment/redirect`
pub async fn payment_redirect(
    State(state): State<Arc<AppState>>,
    form: Result<Form<CheckoutForm>, FormRejection>,
) -> Result<Html<String>, ApiError> {
    let Form(form) = form?;
    let reference = PaymentReference::new();
    let page = payment::redirect_page(state.payment.as_ref(), &form, &reference)?;
    tracing::info!(reference = %reference, amount = %form.amount, "payment redirect prepared");
    Ok(Html(page))
}

/// `GET /healthz`
pub async fn health() -> &'static str {
    "ok"
}
