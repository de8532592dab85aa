use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::auth::{LoginRequest, LoginResponse, RegisterRequest, SessionView},
    error::AppResult,
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    services::auth_service::{login_user, register_user},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Crew account created", body = ApiResponse<User>),
        (status = 400, description = "Email taken or password too short")
    ),
    security(()),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let resp = register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Bearer token with role and expiry", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid credentials")
    ),
    security(()),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let resp = login_user(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Caller identity", body = ApiResponse<SessionView>),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    tag = "Auth"
)]
pub async fn me(user: AuthUser) -> Json<ApiResponse<SessionView>> {
    Json(ApiResponse::success(
        "OK",
        SessionView {
            user_id: user.user_id,
            role: user.role,
        },
        Some(Meta::empty()),
    ))
}
