//! Per-restaurant rollups for dispatch and the "who has not ordered yet" query.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    dto::aggregation::{
        ItemRollup, OrderStats, ReminderReport, RestaurantAggregation, RestaurantGroup,
        StatusBreakdown, UsersWithoutOrders,
    },
    error::{AppError, AppResult},
    jobs::reminders,
    middleware::auth::AuthUser,
    models::{OrderStatus, OrderWithItems, Project},
    permissions::Action,
    response::{ApiResponse, Meta},
    routes::params::{AggregationQuery, StatsQuery},
    services::order_window::{local_day, start_of_local_day},
    state::AppState,
    store::{DateRange, Repository},
};

const MAX_STATS_DAYS: i64 = 366;

/// UTC range covering one local calendar day.
pub fn day_range(date: NaiveDate, offset: FixedOffset) -> AppResult<DateRange> {
    let from = offset
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .ok_or_else(|| AppError::BadRequest(format!("Invalid date {date}")))?
        .with_timezone(&Utc);
    Ok(DateRange {
        from,
        to: from + Duration::days(1),
    })
}

#[derive(Default)]
struct GroupAcc {
    orders_count: i64,
    total_amount: i64,
    items: BTreeMap<Uuid, ItemRollup>,
}

/// Order count, amount and per-status split shared by the daily report and the stats.
#[derive(Default)]
struct Totals {
    orders: i64,
    amount: i64,
    by_status: BTreeMap<OrderStatus, StatusBreakdown>,
}

impl Totals {
    fn add(&mut self, status: OrderStatus, amount: i64) -> AppResult<()> {
        self.orders += 1;
        self.amount = checked_sum(self.amount, amount)?;
        let breakdown = self.by_status.entry(status).or_insert_with(|| StatusBreakdown {
            status,
            orders_count: 0,
            total_amount: 0,
        });
        breakdown.orders_count += 1;
        breakdown.total_amount = checked_sum(breakdown.total_amount, amount)?;
        Ok(())
    }

    fn average(&self) -> f64 {
        if self.orders > 0 {
            self.amount as f64 / self.orders as f64
        } else {
            0.0
        }
    }
}

fn checked_sum(acc: i64, amount: i64) -> AppResult<i64> {
    acc.checked_add(amount).ok_or(AppError::AmountOverflow)
}

/// Rolls orders up by restaurant and menu item. Output ordering is by id.
pub fn build_report(
    project_id: Uuid,
    date: NaiveDate,
    orders: &[OrderWithItems],
) -> AppResult<RestaurantAggregation> {
    let mut groups: BTreeMap<Uuid, GroupAcc> = BTreeMap::new();
    let mut totals = Totals::default();

    for entry in orders {
        let order = &entry.order;
        totals.add(order.status, order.total_amount)?;

        let group = groups.entry(order.restaurant_id).or_default();
        group.orders_count += 1;
        group.total_amount = checked_sum(group.total_amount, order.total_amount)?;

        let mut seen = HashSet::new();
        for item in &entry.items {
            let rollup = group
                .items
                .entry(item.menu_item_id)
                .or_insert_with(|| ItemRollup {
                    menu_item_id: item.menu_item_id,
                    quantity: 0,
                    total_amount: 0,
                    orders_count: 0,
                });
            rollup.quantity = checked_sum(rollup.quantity, i64::from(item.quantity))?;
            let line_total = item.line_total().ok_or(AppError::AmountOverflow)?;
            rollup.total_amount = checked_sum(rollup.total_amount, line_total)?;
            if seen.insert(item.menu_item_id) {
                rollup.orders_count += 1;
            }
        }
    }

    Ok(RestaurantAggregation {
        project_id,
        date,
        total_orders: totals.orders,
        total_amount: totals.amount,
        average_order_value: totals.average(),
        restaurants: groups
            .into_iter()
            .map(|(restaurant_id, acc)| RestaurantGroup {
                restaurant_id,
                orders_count: acc.orders_count,
                total_amount: acc.total_amount,
                items: acc.items.into_values().collect(),
            })
            .collect(),
        by_status: totals.by_status.into_values().collect(),
    })
}

/// Revenue summary over non-cancelled orders.
pub fn build_stats(
    project_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
    orders: &[OrderWithItems],
) -> AppResult<OrderStats> {
    let mut totals = Totals::default();
    for entry in orders {
        totals.add(entry.order.status, entry.order.total_amount)?;
    }
    Ok(OrderStats {
        project_id,
        from,
        to,
        total_orders: totals.orders,
        total_revenue: totals.amount,
        average_order_value: totals.average(),
        by_status: totals.by_status.into_values().collect(),
    })
}

pub async fn aggregate_by_restaurant(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    query: AggregationQuery,
) -> AppResult<ApiResponse<RestaurantAggregation>> {
    aggregate_by_restaurant_at(state, user, project_id, query, Utc::now()).await
}

pub async fn aggregate_by_restaurant_at(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    query: AggregationQuery,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<RestaurantAggregation>> {
    user.ensure(Action::ViewAggregation)?;
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(OrderStatus::from_stored)
        .transpose()?;
    find_project(state, project_id).await?;

    let offset = state.config.order_day_offset();
    let date = query.date.unwrap_or_else(|| local_day(now, offset));
    let range = day_range(date, offset)?;

    let orders = state.store.orders_snapshot(project_id, range, status).await?;
    let report = build_report(project_id, date, &orders)?;

    tracing::debug!(
        project_id = %project_id,
        %date,
        total_orders = report.total_orders,
        "aggregation built"
    );

    Ok(ApiResponse::success("OK", report, Some(Meta::empty())))
}

pub async fn order_stats(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    query: StatsQuery,
) -> AppResult<ApiResponse<OrderStats>> {
    order_stats_at(state, user, project_id, query, Utc::now()).await
}

/// Totals over the local days `from..=to`; both ends default to today.
pub async fn order_stats_at(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    query: StatsQuery,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<OrderStats>> {
    user.ensure(Action::ViewAggregation)?;
    let offset = state.config.order_day_offset();
    let today = local_day(now, offset);
    let from = query.from.unwrap_or(today);
    let to = query.to.unwrap_or(from.max(today));
    if to < from {
        return Err(AppError::BadRequest("`to` must not be before `from`".into()));
    }
    if (to - from).num_days() >= MAX_STATS_DAYS {
        return Err(AppError::BadRequest(format!(
            "Date range is limited to {MAX_STATS_DAYS} days"
        )));
    }
    find_project(state, project_id).await?;

    let range = DateRange {
        from: day_range(from, offset)?.from,
        to: day_range(to, offset)?.to,
    };
    let orders = state.store.orders_snapshot(project_id, range, None).await?;
    let stats = build_stats(project_id, from, to, &orders)?;

    tracing::debug!(
        project_id = %project_id,
        %from,
        %to,
        total_orders = stats.total_orders,
        "order stats built"
    );

    Ok(ApiResponse::success("OK", stats, Some(Meta::empty())))
}

/// Active members without a non-cancelled order since `since`, sorted.
pub async fn users_without_order(
    store: &dyn Repository,
    project_id: Uuid,
    since: DateTime<Utc>,
) -> AppResult<Vec<Uuid>> {
    let roster = store.roster_snapshot(project_id, since).await?;
    let pending: BTreeSet<Uuid> = roster
        .active_members
        .into_iter()
        .filter(|user_id| !roster.users_with_orders.contains(user_id))
        .collect();
    Ok(pending.into_iter().collect())
}

pub async fn users_without_order_today(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
) -> AppResult<ApiResponse<UsersWithoutOrders>> {
    users_without_order_today_at(state, user, project_id, Utc::now()).await
}

pub async fn users_without_order_today_at(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<UsersWithoutOrders>> {
    user.ensure(Action::ViewAggregation)?;
    find_project(state, project_id).await?;

    let offset = state.config.order_day_offset();
    let user_ids =
        users_without_order(state.store.as_ref(), project_id, start_of_local_day(now, offset))
            .await?;

    Ok(ApiResponse::success(
        "OK",
        UsersWithoutOrders {
            project_id,
            date: local_day(now, offset),
            user_ids,
        },
        Some(Meta::empty()),
    ))
}

pub async fn send_reminders(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
) -> AppResult<ApiResponse<ReminderReport>> {
    send_reminders_at(state, user, project_id, Utc::now()).await
}

pub async fn send_reminders_at(
    state: &AppState,
    user: &AuthUser,
    project_id: Uuid,
    now: DateTime<Utc>,
) -> AppResult<ApiResponse<ReminderReport>> {
    user.ensure(Action::SendReminders)?;
    let project = find_project(state, project_id).await?;
    if !project.is_active {
        return Err(AppError::ProjectInactive);
    }

    let report = reminders::remind_project(state, &project, now).await?;

    crate::audit::record(
        state.store.as_ref(),
        Some(user.user_id),
        "reminders_send",
        Some("projects"),
        Some(serde_json::json!({
            "project_id": project_id,
            "notified": report.notified.len(),
        })),
    )
    .await;

    Ok(ApiResponse::success(
        "Reminders sent",
        report,
        Some(Meta::empty()),
    ))
}

async fn find_project(state: &AppState, project_id: Uuid) -> AppResult<Project> {
    state
        .store
        .find_project(project_id)
        .await?
        .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, OrderItem, OrderType};

    fn order(restaurant_id: Uuid, status: OrderStatus, lines: &[(Uuid, i32, i64)]) -> OrderWithItems {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let items: Vec<OrderItem> = lines
            .iter()
            .map(|&(menu_item_id, quantity, unit_price)| OrderItem {
                id: Uuid::new_v4(),
                order_id: id,
                menu_item_id,
                quantity,
                unit_price,
                special_instructions: None,
            })
            .collect();
        OrderWithItems {
            order: Order {
                id,
                user_id: Uuid::new_v4(),
                project_id: None,
                restaurant_id,
                order_type: OrderType::Regular,
                status,
                total_amount: items.iter().filter_map(OrderItem::line_total).sum(),
                user_pay_amount: 0,
                exception_amount: 0,
                delivery_address: None,
                delivery_lat: None,
                delivery_lng: None,
                order_day: now.date_naive(),
                cancellation_reason: None,
                created_at: now,
                updated_at: now,
                delivered_at: None,
            },
            items,
            exception: None,
        }
    }

    #[test]
    fn restaurant_totals_add_up_to_the_grand_total() {
        let (pizza, sushi) = (Uuid::new_v4(), Uuid::new_v4());
        let (margherita, roll) = (Uuid::new_v4(), Uuid::new_v4());
        let orders = vec![
            order(pizza, OrderStatus::Pending, &[(margherita, 2, 40)]),
            order(pizza, OrderStatus::Confirmed, &[(margherita, 1, 40), (margherita, 1, 40)]),
            order(sushi, OrderStatus::Pending, &[(roll, 3, 25)]),
        ];

        let report = build_report(Uuid::new_v4(), Utc::now().date_naive(), &orders).unwrap();

        assert_eq!(report.total_orders, 3);
        assert_eq!(report.total_amount, 80 + 80 + 75);
        let sum: i64 = report.restaurants.iter().map(|g| g.total_amount).sum();
        assert_eq!(sum, report.total_amount);

        let pizza_group = report
            .restaurants
            .iter()
            .find(|g| g.restaurant_id == pizza)
            .unwrap();
        assert_eq!(pizza_group.orders_count, 2);
        assert_eq!(pizza_group.items.len(), 1);
        assert_eq!(pizza_group.items[0].quantity, 4);
        // The second order lists the same item twice but counts once.
        assert_eq!(pizza_group.items[0].orders_count, 2);

        let by_status: i64 = report.by_status.iter().map(|s| s.orders_count).sum();
        assert_eq!(by_status, 3);
        assert!((report.average_order_value - 235.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_report_has_zero_average() {
        let report = build_report(Uuid::new_v4(), Utc::now().date_naive(), &[]).unwrap();
        assert_eq!(report.total_orders, 0);
        assert_eq!(report.average_order_value, 0.0);
        assert!(report.restaurants.is_empty());
    }

    #[test]
    fn report_totals_past_i64_are_rejected() {
        let (restaurant, dish) = (Uuid::new_v4(), Uuid::new_v4());
        let half = i64::MAX / 2 + 1;
        let orders = vec![
            order(restaurant, OrderStatus::Pending, &[(dish, 1, half)]),
            order(restaurant, OrderStatus::Pending, &[(dish, 1, half)]),
        ];

        let err = build_report(Uuid::new_v4(), Utc::now().date_naive(), &orders).unwrap_err();
        assert_eq!(err.code(), "AMOUNT_OVERFLOW");

        let today = Utc::now().date_naive();
        let err = build_stats(Uuid::new_v4(), today, today, &orders).unwrap_err();
        assert_eq!(err.code(), "AMOUNT_OVERFLOW");
    }

    #[test]
    fn stats_split_revenue_by_status() {
        let (restaurant, dish) = (Uuid::new_v4(), Uuid::new_v4());
        let orders = vec![
            order(restaurant, OrderStatus::Pending, &[(dish, 1, 30)]),
            order(restaurant, OrderStatus::Delivered, &[(dish, 2, 30)]),
            order(restaurant, OrderStatus::Delivered, &[(dish, 1, 90)]),
        ];
        let today = Utc::now().date_naive();

        let stats = build_stats(Uuid::new_v4(), today, today, &orders).unwrap();

        assert_eq!(stats.total_orders, 3);
        assert_eq!(stats.total_revenue, 180);
        assert!((stats.average_order_value - 60.0).abs() < f64::EPSILON);
        let delivered = stats
            .by_status
            .iter()
            .find(|s| s.status == OrderStatus::Delivered)
            .unwrap();
        assert_eq!((delivered.orders_count, delivered.total_amount), (2, 150));
    }

    #[test]
    fn day_range_honours_the_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let range = day_range(date, offset).unwrap();
        assert_eq!(range.from.to_rfc3339(), "2026-03-09T22:00:00+00:00");
        assert_eq!(range.to - range.from, Duration::days(1));
    }
}
