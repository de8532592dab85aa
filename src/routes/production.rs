use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::aggregation::{OrderStats, ReminderReport, RestaurantAggregation, UsersWithoutOrders},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::{AggregationQuery, StatsQuery},
    services::aggregation,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects/{id}/aggregation", get(aggregate))
        .route("/projects/{id}/stats", get(stats))
        .route("/projects/{id}/without-orders", get(without_orders))
        .route("/projects/{id}/reminders", post(send_reminders))
}

#[utoipa::path(
    get,
    path = "/api/production/projects/{id}/aggregation",
    params(("id" = Uuid, Path, description = "Project id"), AggregationQuery),
    responses(
        (status = 200, description = "Per-restaurant rollup", body = ApiResponse<RestaurantAggregation>),
        (status = 403, description = "Staff only")
    ),
    tag = "Production"
)]
pub async fn aggregate(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<AggregationQuery>,
) -> AppResult<Json<ApiResponse<RestaurantAggregation>>> {
    let resp = aggregation::aggregate_by_restaurant(&state, &user, id, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/production/projects/{id}/stats",
    params(("id" = Uuid, Path, description = "Project id"), StatsQuery),
    responses(
        (status = 200, description = "Order totals over a range of days", body = ApiResponse<OrderStats>),
        (status = 400, description = "Invalid date range")
    ),
    tag = "Production"
)]
pub async fn stats(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<ApiResponse<OrderStats>>> {
    let resp = aggregation::order_stats(&state, &user, id, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/production/projects/{id}/without-orders",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Members without an order today", body = ApiResponse<UsersWithoutOrders>)
    ),
    tag = "Production"
)]
pub async fn without_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<UsersWithoutOrders>>> {
    let resp = aggregation::users_without_order_today(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/production/projects/{id}/reminders",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Reminder outcome", body = ApiResponse<ReminderReport>)
    ),
    tag = "Production"
)]
pub async fn send_reminders(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReminderReport>>> {
    let resp = aggregation::send_reminders(&state, &user, id).await?;
    Ok(Json(resp))
}
