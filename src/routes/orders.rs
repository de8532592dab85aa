use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::orders::{
        CancelOrderRequest, CreateOrderRequest, CreatedOrder, OrderList, TrackOrderRequest,
        TrackedOrder, UpdateOrderStatusRequest,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    models::{Order, OrderWithItems},
    response::ApiResponse,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(create_order))
        .route("/track", post(track_order))
        .route("/{id}", get(get_order).delete(cancel_order))
        .route("/{id}/status", patch(update_order_status))
}

#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CreatedOrder>),
        (status = 400, description = "Invalid items, missing project or exception details"),
        (status = 403, description = "Order window not open, not a member or project inactive"),
        (status = 409, description = "Regular order already placed today")
    ),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<CreatedOrder>>)> {
    let resp = order_service::create_order(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<i64>, Query, description = "Page number"),
        ("per_page" = Option<i64>, Query, description = "Page size"),
        ("status" = Option<String>, Query, description = "Filter by status"),
        ("sort_order" = Option<String>, Query, description = "asc or desc")
    ),
    responses(
        (status = 200, description = "Own orders", body = ApiResponse<OrderList>)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<ApiResponse<OrderList>>> {
    let resp = order_service::list_orders(&state, &user, query).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderWithItems>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<OrderWithItems>>> {
    let resp = order_service::get_order(&state, &user, id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    delete,
    path = "/api/orders/{id}",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body(content = CancelOrderRequest, description = "Optional cancellation reason"),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<Order>),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already delivered or no longer cancellable")
    ),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<CancelOrderRequest>>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let resp = order_service::cancel_order(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order id")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<Order>),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Role may not update status"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Transition not allowed")
    ),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> AppResult<Json<ApiResponse<Order>>> {
    let resp = order_service::update_order_status(&state, &user, id, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/orders/track",
    request_body = TrackOrderRequest,
    responses(
        (status = 200, description = "Tracked order", body = ApiResponse<TrackedOrder>),
        (status = 401, description = "Token expired, malformed or tampered")
    ),
    security(()),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Json(payload): Json<TrackOrderRequest>,
) -> AppResult<Json<ApiResponse<TrackedOrder>>> {
    let resp = order_service::track_order(&state, payload).await?;
    Ok(Json(resp))
}
