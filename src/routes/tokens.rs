use axum::{Json, Router, extract::State, routing::post};
use chrono::Utc;

use crate::{
    dto::tokens::ValidateTokenRequest,
    error::AppResult,
    response::{ApiResponse, Meta},
    services::access_token::ValidatedToken,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/validate", post(validate_token))
}

#[utoipa::path(
    post,
    path = "/api/tokens/validate",
    request_body = ValidateTokenRequest,
    responses(
        (status = 200, description = "Token is valid", body = ApiResponse<ValidatedToken>),
        (status = 401, description = "TOKEN_EXPIRED, TOKEN_MALFORMED, TOKEN_TYPE_MISMATCH or TOKEN_TAG_MISMATCH")
    ),
    security(()),
    tag = "Tokens"
)]
pub async fn validate_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateTokenRequest>,
) -> AppResult<Json<ApiResponse<ValidatedToken>>> {
    let validated = state
        .tokens
        .validate_input(&payload.token, payload.expected_type, Utc::now())?;
    Ok(Json(ApiResponse::success(
        "Token is valid",
        validated,
        Some(Meta::empty()),
    )))
}
