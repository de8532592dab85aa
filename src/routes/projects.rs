use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::projects::{
        CreateProjectRequest, OrderWindowView, ProjectAccessGranted, RedeemProjectTokenRequest,
        UpdateProjectRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::Project,
    response::ApiResponse,
    services::{access_token::IssuedToken, project_service},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_project))
        .route("/access", post(redeem_access))
        .route("/{id}", patch(update_project))
        .route("/{id}/order-window", get(order_window))
        .route("/{id}/access-token", post(issue_access_token))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ApiResponse<Project>),
        (status = 403, description = "Admin only")
    ),
    tag = "Projects"
)]
pub async fn create_project(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProjectRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Project>>)> {
    let resp = project_service::create_project(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = ApiResponse<Project>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found")
    ),
    tag = "Projects"
)]
pub async fn update_project(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> AppResult<Json<ApiResponse<Project>>> {
    let resp = project_service::update_project(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/order-window",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Window status", body = ApiResponse<OrderWindowView>),
        (status = 404, description = "Not found")
    ),
    tag = "Projects"
)]
pub async fn order_window(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWindowView>>> {
    let resp = project_service::order_window(&state, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/access-token",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Redeemable project token", body = ApiResponse<IssuedToken>),
        (status = 403, description = "Admin or project manager only")
    ),
    tag = "Projects"
)]
pub async fn issue_access_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<IssuedToken>>> {
    let resp = project_service::issue_project_token(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/projects/access",
    request_body = RedeemProjectTokenRequest,
    responses(
        (status = 200, description = "Membership granted", body = ApiResponse<ProjectAccessGranted>),
        (status = 401, description = "Token expired, malformed or tampered")
    ),
    tag = "Projects"
)]
pub async fn redeem_access(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<RedeemProjectTokenRequest>,
) -> AppResult<Json<ApiResponse<ProjectAccessGranted>>> {
    let resp = project_service::redeem_project_token(&state, &user, payload).await?;
    Ok(Json(resp))
}
