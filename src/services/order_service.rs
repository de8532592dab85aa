use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    audit,
    dto::orders::{
        CancelOrderRequest, CreateOrderRequest, CreatedOrder, OrderItemRequest, OrderList,
        TrackOrderRequest, TrackedOrder, UpdateOrderStatusRequest,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::{
        ExceptionStatus, ExceptionType, Order, OrderException, OrderItem, OrderStatus, OrderType,
        OrderWithItems, Project,
    },
    notify,
    permissions::Action,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::{
        access_token::{TokenSubject, TokenType},
        exception_cost::{CostSplit, apportion},
        order_window::{check_duplicate, check_window, local_day, start_of_local_day},
    },
    state::AppState,
    store::{InsertOutcome, OrderListFilter, StatusTransition},
};

pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<CreatedOrder>> {
    create_order_at(state, user, payload, Utc::now()).await
}

pub async fn create_order_at(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<CreatedOrder>> {
    if payload.user_id.is_some_and(|id| id != user.user_id) {
        return Err(AppError::Forbidden);
    }

    let order_id = Uuid::new_v4();
    let (items, total_amount) = price_items(order_id, &payload.items)?;

    let project = match payload.project_id {
        Some(project_id) => Some(load_orderable_project(state, user, project_id).await?),
        None => None,
    };

    let offset = state.config.order_day_offset();
    let order_type = payload.order_type.unwrap_or(OrderType::Regular);

    let (status, split, exception) = match order_type {
        OrderType::Regular => {
            let project = project.as_ref().ok_or_else(|| {
                AppError::BadRequest("projectId is required for regular orders".into())
            })?;
            check_window(project, now).admit()?;
            check_duplicate(
                state.store.as_ref(),
                user.user_id,
                project.id,
                start_of_local_day(now, offset),
            )
            .await?;
            (
                OrderStatus::Pending,
                CostSplit {
                    user_pay_amount: 0,
                    exception_amount: 0,
                },
                None,
            )
        }
        OrderType::Exception => {
            let exception_type = payload
                .exception_type
                .as_deref()
                .ok_or_else(|| AppError::InvalidExceptionType("missing".into()))
                .and_then(ExceptionType::parse)?;
            let reason = payload
                .exception_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| AppError::BadRequest("exceptionReason is required".into()))?;
            let split = apportion(total_amount, exception_type, state.config.regular_meal_budget);
            let quota_used = !user.role.has_unlimited_exceptions();
            let exception = OrderException {
                id: Uuid::new_v4(),
                order_id,
                user_id: user.user_id,
                exception_type,
                requested_amount: split.exception_amount,
                status: ExceptionStatus::Pending,
                reason: reason.to_string(),
                quota_used,
                reviewed_by: None,
                reviewed_at: None,
                created_at: now,
            };
            (OrderStatus::PendingApproval, split, Some(exception))
        }
    };

    let order = Order {
        id: order_id,
        user_id: user.user_id,
        project_id: payload.project_id,
        restaurant_id: payload.restaurant_id,
        order_type,
        status,
        total_amount,
        user_pay_amount: split.user_pay_amount,
        exception_amount: split.exception_amount,
        delivery_address: payload.delivery_address,
        delivery_lat: payload.delivery_lat,
        delivery_lng: payload.delivery_lng,
        order_day: local_day(now, offset),
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
        delivered_at: None,
    };

    let quota_window = state.config.exception_quota_window();
    let saved = match state
        .store
        .insert_order(
            OrderWithItems {
                order,
                items,
                exception,
            },
            Some(now - quota_window),
        )
        .await?
    {
        InsertOutcome::Inserted(saved) => saved,
        InsertOutcome::Duplicate { existing_order_id } => {
            tracing::info!(user_id = %user.user_id, ?existing_order_id, "duplicate regular order rejected");
            return Err(AppError::DuplicateOrder { existing_order_id });
        }
        InsertOutcome::QuotaExhausted { last_used_at } => {
            tracing::info!(user_id = %user.user_id, %last_used_at, "exception quota exhausted");
            return Err(AppError::ExceptionQuotaExhausted {
                next_available_at: last_used_at + quota_window,
            });
        }
    };

    let tracking = match order_type {
        OrderType::Regular => Some(state.tokens.issue(
            TokenSubject::Order {
                order_id: saved.order.id,
                user_id: saved.order.user_id,
            },
            state.config.tracking_token_ttl(),
            now,
        )?),
        OrderType::Exception => None,
    };

    tracing::info!(
        order_id = %saved.order.id,
        order_type = order_type.as_str(),
        total_amount = saved.order.total_amount,
        "order created"
    );

    notify::dispatch(
        state.notifier.clone(),
        saved.order.user_id,
        "Your order has been received".to_string(),
        serde_json::json!({
            "orderId": saved.order.id,
            "status": saved.order.status,
            "totalAmount": saved.order.total_amount,
        }),
    );

    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": saved.order.id,
            "order_type": order_type.as_str(),
            "total_amount": saved.order.total_amount,
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order created",
        CreatedOrder {
            order: saved,
            tracking,
        },
        Some(Meta::empty()),
    ))
}

/// Prices every line server-side. Rejects empty orders and non-positive quantities.
fn price_items(order_id: Uuid, lines: &[OrderItemRequest]) -> AppResult<(Vec<OrderItem>, i64)> {
    if lines.is_empty() {
        return Err(AppError::BadRequest(
            "Order must contain at least one item".into(),
        ));
    }

    let overflow = || AppError::BadRequest("Order total is too large".into());
    let mut total: i64 = 0;
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity <= 0 {
            return Err(AppError::BadRequest(format!(
                "Invalid quantity for menu item {}",
                line.menu_item_id
            )));
        }
        if line.price < 0 {
            return Err(AppError::BadRequest(format!(
                "Invalid price for menu item {}",
                line.menu_item_id
            )));
        }
        let line_total = line
            .price
            .checked_mul(i64::from(line.quantity))
            .ok_or_else(overflow)?;
        total = total.checked_add(line_total).ok_or_else(overflow)?;
        items.push(OrderItem {
            id: Uuid::new_v4(),
            order_id,
            menu_item_id: line.menu_item_id,
            quantity: line.quantity,
            unit_price: line.price,
            special_instructions: line.special_instructions.clone(),
        });
    }
    Ok((items, total))
}

async fn load_orderable_project(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
) -> AppResult<Project> {
    let project = state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !project.is_active {
        return Err(AppError::ProjectInactive);
    }
    if !user.can(Action::BypassMembership) {
        let membership = state.store.find_membership(project_id, user.user_id).await?;
        if !membership.is_some_and(|m| m.is_active) {
            return Err(AppError::Forbidden);
        }
    }
    Ok(project)
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(OrderStatus::from_stored)
        .transpose()?;
    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let (orders, total) = state
        .store
        .list_user_orders(
            user.user_id,
            OrderListFilter {
                status,
                newest_first: matches!(sort_order, SortOrder::Desc),
                limit: limit as u64,
                offset: offset as u64,
            },
        )
        .await?;

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Ok",
        OrderList { items: orders },
        Some(meta),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = state
        .store
        .find_order(order_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.order.user_id != user.user_id && !user.can(Action::ViewAnyOrder) {
        return Err(AppError::Forbidden);
    }
    Ok(ApiResponse::success("OK", order, Some(Meta::empty())))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<Order>> {
    update_order_status_at(state, user, order_id, payload, Utc::now()).await
}

pub async fn update_order_status_at(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: UpdateOrderStatusRequest,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<Order>> {
    user.ensure(Action::UpdateOrderStatus)?;
    let next = OrderStatus::parse_requested(&payload.status)?;

    let current = state
        .store
        .find_order(order_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let previous = current.order.status;
    let updated = apply_transition(state, user, &current.order, next, None, now).await?;

    tracing::info!(order_id = %order_id, from = %previous, to = %next, "order status updated");

    notify::dispatch(
        state.notifier.clone(),
        updated.user_id,
        format!("Your order is now {}", updated.status),
        serde_json::json!({ "orderId": updated.id, "status": updated.status }),
    );

    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "order_status_update",
        Some("orders"),
        Some(serde_json::json!({
            "order_id": order_id,
            "from": previous.as_str(),
            "to": next.as_str(),
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order status updated",
        updated,
        Some(Meta::empty()),
    ))
}

pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: CancelOrderRequest,
) -> AppResult<ApiResponse<Order>> {
    cancel_order_at(state, user, order_id, payload, Utc::now()).await
}

pub async fn cancel_order_at(
    state: &AppState,
    user: &AuthUser,
    order_id: Uuid,
    payload: CancelOrderRequest,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<Order>> {
    let current = state
        .store
        .find_order(order_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if current.order.user_id != user.user_id && !user.can(Action::CancelAnyOrder) {
        return Err(AppError::Forbidden);
    }
    if current.order.status == OrderStatus::Delivered {
        return Err(AppError::AlreadyDelivered);
    }

    let reason = payload
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let cancelled = apply_transition(
        state,
        user,
        &current.order,
        OrderStatus::Cancelled,
        reason.clone(),
        now,
    )
    .await
    .map_err(|err| match err {
        AppError::InvalidTransition {
            from: OrderStatus::Delivered,
            ..
        } => AppError::AlreadyDelivered,
        other => other,
    })?;

    tracing::info!(order_id = %order_id, cancelled_by = %user.user_id, "order cancelled");

    if cancelled.user_id != user.user_id {
        notify::dispatch(
            state.notifier.clone(),
            cancelled.user_id,
            "Your order has been cancelled".to_string(),
            serde_json::json!({ "orderId": cancelled.id, "reason": reason }),
        );
    }

    audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order_id, "reason": reason })),
    )
    .await;

    Ok(ApiResponse::success(
        "Order cancelled",
        cancelled,
        Some(Meta::empty()),
    ))
}

/// Compare-and-set on the status the caller observed. A lost race reports the fresh status.
async fn apply_transition(
    state: &AppState,
    actor: &AuthUser,
    order: &Order,
    next: OrderStatus,
    cancellation_reason: Option<String>,
    now: DateTime<Utc>,
) -> AppResult<Order> {
    if !order.status.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: next,
        });
    }

    let exception_status = (order.status == OrderStatus::PendingApproval).then(|| {
        if next == OrderStatus::Cancelled {
            ExceptionStatus::Rejected
        } else {
            ExceptionStatus::Approved
        }
    });

    let transition = StatusTransition {
        order_id: order.id,
        from: order.status,
        to: next,
        actor: actor.user_id,
        at: now,
        cancellation_reason,
        exception_status,
    };

    match state.store.transition_order(transition).await? {
        Some(updated) => Ok(updated),
        None => {
            let fresh = state
                .store
                .find_order(order.id)
                .await?
                .ok_or(AppError::NotFound)?;
            tracing::debug!(order_id = %order.id, status = %fresh.order.status, "status changed concurrently");
            Err(AppError::InvalidTransition {
                from: fresh.order.status,
                to: next,
            })
        }
    }
}

pub async fn track_order(
    state: &AppState,
    payload: TrackOrderRequest,
) -> AppResult<ApiResponse<TrackedOrder>> {
    track_order_at(state, payload, Utc::now()).await
}

pub async fn track_order_at(
    state: &AppState,
    payload: TrackOrderRequest,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<TrackedOrder>> {
    let validated = state
        .tokens
        .validate_input(&payload.token, Some(TokenType::OrderTracking), now)?;
    let (order_id, user_id) = validated.order_owner().ok_or(AppError::TokenMalformed)?;

    let order = state
        .store
        .find_order(order_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if order.order.user_id != user_id {
        return Err(AppError::Forbidden);
    }

    Ok(ApiResponse::success(
        "OK",
        TrackedOrder {
            order,
            token_expires_at: validated.expires_at,
        },
        Some(Meta::empty()),
    ))
}
