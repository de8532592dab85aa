use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    audit,
    dto::projects::{
        CreateProjectRequest, OrderWindowView, ProjectAccessGranted, RedeemProjectTokenRequest,
        UpdateProjectRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{Project, ProjectMembership, Role},
    permissions::Action,
    response::{ApiResponse, Meta},
    services::{
        access_token::{IssuedToken, TokenSubject, TokenType},
        order_window::{check_window, window_bounds},
    },
    state::AppState,
};

const DEFAULT_ORDER_WINDOW_MINUTES: i32 = 60;

fn validate_window_minutes(minutes: i32) -> AppResult<i32> {
    if minutes <= 0 {
        return Err(AppError::BadRequest(
            "orderWindowMinutes must be positive".into(),
        ));
    }
    Ok(minutes)
}

fn validate_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Project name is required".into()));
    }
    Ok(name.to_string())
}

pub async fn create_project(
    state: &AppState,
    user: &AuthUser,
    payload: CreateProjectRequest,
) -> AppResult<ApiResponse<Project>> {
    user.ensure(Action::ManageProjects)?;

    let project = Project {
        id: Uuid::new_v4(),
        name: validate_name(&payload.name)?,
        location: payload.location,
        start_date: payload.start_date,
        order_window_minutes: validate_window_minutes(
            payload
                .order_window_minutes
                .unwrap_or(DEFAULT_ORDER_WINDOW_MINUTES),
        )?,
        is_active: true,
        created_at: Utc::now(),
    };
    let project = state.store.insert_project(project).await?;

    tracing::info!(project_id = %project.id, "project created");
    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "project_create",
        Some("projects"),
        Some(serde_json::json!({ "project_id": project.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Project created",
        project,
        Some(Meta::empty()),
    ))
}

pub async fn update_project(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    payload: UpdateProjectRequest,
) -> AppResult<ApiResponse<Project>> {
    user.ensure(Action::ManageProjects)?;

    let mut project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if let Some(name) = payload.name {
        project.name = validate_name(&name)?;
    }
    if let Some(location) = payload.location {
        project.location = Some(location);
    }
    if let Some(start_date) = payload.start_date {
        project.start_date = start_date;
    }
    if let Some(minutes) = payload.order_window_minutes {
        project.order_window_minutes = validate_window_minutes(minutes)?;
    }
    if let Some(is_active) = payload.is_active {
        project.is_active = is_active;
    }

    let project = state.store.update_project(project).await?;

    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "project_update",
        Some("projects"),
        Some(serde_json::json!({ "project_id": project.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Project updated",
        project,
        Some(Meta::empty()),
    ))
}

pub async fn order_window(
    state: &AppState,
    project_id: Uuid,
) -> AppResult<ApiResponse<OrderWindowView>> {
    order_window_at(state, project_id, Utc::now()).await
}

pub async fn order_window_at(
    state: &AppState,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<OrderWindowView>> {
    let project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let view = OrderWindowView::new(project.id, window_bounds(&project), check_window(&project, now));
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

pub async fn issue_project_token(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
) -> AppResult<ApiResponse<IssuedToken>> {
    issue_project_token_at(state, user, project_id, Utc::now()).await
}

pub async fn issue_project_token_at(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<IssuedToken>> {
    user.ensure(Action::IssueProjectToken)?;

    let project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !project.is_active {
        return Err(AppError::ProjectInactive);
    }

    let issued = state.tokens.issue(
        TokenSubject::Project {
            project_id: project.id,
        },
        state.config.project_token_ttl(),
        now,
    )?;

    tracing::info!(project_id = %project.id, expires_at = %issued.expires_at, "project token issued");
    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "project_token_issue",
        Some("projects"),
        Some(serde_json::json!({ "project_id": project.id })),
    )
    .await;

    Ok(ApiResponse::success(
        "Project access token issued",
        issued,
        Some(Meta::empty()),
    ))
}

pub async fn redeem_project_token(
    state: &AppState,
    user: &AuthUser,
    payload: RedeemProjectTokenRequest,
) -> AppResult<ApiResponse<ProjectAccessGranted>> {
    redeem_project_token_at(state, user, payload, Utc::now()).await
}

/// Validates a scanned project token and makes the caller a member of that project.
pub async fn redeem_project_token_at(
    state: &AppState,
    user: &AuthUser,
    payload: RedeemProjectTokenRequest,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<ProjectAccessGranted>> {
    let validated =
        state
            .tokens
            .validate_input(&payload.token, Some(TokenType::ProjectAccess), now)?;
    let project_id = validated.project_id().ok_or(AppError::TokenMalformed)?;

    let project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !project.is_active {
        return Err(AppError::ProjectInactive);
    }

    let membership_role = match user.role {
        Role::Admin | Role::Producer => Role::Regular,
        other => other,
    };
    let (membership, newly_joined) = state
        .store
        .upsert_membership(ProjectMembership {
            project_id,
            user_id: user.user_id,
            role: membership_role,
            is_active: true,
            joined_at: now,
        })
        .await?;

    if newly_joined {
        tracing::info!(project_id = %project_id, user_id = %user.user_id, "member joined project");
        audit::record(
            state.store.as_ref(),
            Some(user.user_id),
            "project_join",
            Some("project_members"),
            Some(serde_json::json!({ "project_id": project_id })),
        )
        .await;
    }

    let order_window =
        OrderWindowView::new(project.id, window_bounds(&project), check_window(&project, now));

    Ok(ApiResponse::success(
        "Project access granted",
        ProjectAccessGranted {
            project,
            membership,
            newly_joined,
            order_window,
            token_expires_at: validated.expires_at,
        },
        Some(Meta::empty()),
    ))
}
