use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::{
    dtos::{AskRequest, AskResponse, ErrorResponse},
    middleware::AuthUser,
    services::{generator::GenerationError, prompt::build_prompt},
    startup::AppState,
};

/// Caller-visible failures of `POST /ask`.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("Question required")]
    QuestionRequired,

    #[error("No token provided")]
    MissingToken,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Failed to generate response")]
    Generation(#[from] GenerationError),
}

impl AskError {
    pub fn status(&self) -> StatusCode {
        match self {
            AskError::QuestionRequired => StatusCode::BAD_REQUEST,
            AskError::MissingToken | AskError::Unauthorized => StatusCode::UNAUTHORIZED,
            AskError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AskError {
    fn into_response(self) -> Response {
        if let AskError::Generation(cause) = &self {
            tracing::error!(error = %cause, "AI generation error");
        }

        // Display is the fixed caller message; provider detail stays in the cause.
        (
            self.status(),
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

pub async fn ask(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AskError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Unreadable ask body");
        AskError::QuestionRequired
    })?;
    let question = request.question().ok_or(AskError::QuestionRequired)?;

    tracing::info!(
        uid = %identity.uid,
        question_len = question.len(),
        "Answering question"
    );

    let prompt = build_prompt(question);
    let response = state.generator.generate(&prompt).await?;

    Ok(Json(AskResponse { response }))
}
