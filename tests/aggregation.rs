mod common;

use chrono::{Duration, NaiveDate};
use common::*;
use crew_meals_api::{
    dto::orders::{CancelOrderRequest, UpdateOrderStatusRequest},
    jobs::reminders,
    models::{OrderStatus, Role},
    routes::params::{AggregationQuery, StatsQuery},
    services::{
        aggregation::{
            aggregate_by_restaurant_at, order_stats_at, send_reminders_at,
            users_without_order_today_at,
        },
        order_service::{cancel_order_at, create_order_at, update_order_status_at},
    },
};
use uuid::Uuid;

#[tokio::test]
async fn restaurant_totals_match_included_orders() {
    let app = test_app();
    let project = open_project(&app).await;
    let producer = seed_user(&app, Role::Producer).await;
    let (pizza, sushi) = (Uuid::new_v4(), Uuid::new_v4());

    let mut expected_total = 0;
    for (restaurant, price) in [(pizza, 40), (pizza, 35), (sushi, 55)] {
        let crew = crew_member(&app, project.id).await;
        create_order_at(
            &app.state,
            &crew,
            regular_order(project.id, restaurant, vec![line(1, price)]),
            noon(),
        )
        .await
        .unwrap();
        expected_total += price;
    }

    // A cancelled order is left out of the rollup.
    let quitter = crew_member(&app, project.id).await;
    let cancelled = create_order_at(
        &app.state,
        &quitter,
        regular_order(project.id, sushi, vec![line(4, 55)]),
        noon(),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    cancel_order_at(
        &app.state,
        &quitter,
        cancelled.order.order.id,
        CancelOrderRequest::default(),
        noon(),
    )
    .await
    .unwrap();

    let report = aggregate_by_restaurant_at(
        &app.state,
        &producer,
        project.id,
        AggregationQuery::default(),
        noon() + Duration::hours(1),
    )
    .await
    .unwrap()
    .data
    .unwrap();

    assert_eq!(report.date, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
    assert_eq!(report.total_orders, 3);
    assert_eq!(report.total_amount, expected_total);
    let by_restaurant: i64 = report.restaurants.iter().map(|g| g.total_amount).sum();
    assert_eq!(by_restaurant, report.total_amount);
    assert_eq!(report.restaurants.len(), 2);
    let pizza_group = report
        .restaurants
        .iter()
        .find(|g| g.restaurant_id == pizza)
        .unwrap();
    assert_eq!(pizza_group.orders_count, 2);
}

#[tokio::test]
async fn aggregation_filters_by_status_and_day() {
    let app = test_app();
    let project = open_project(&app).await;
    let admin = seed_user(&app, Role::Admin).await;

    let mut ids = Vec::new();
    for _ in 0..2 {
        let crew = crew_member(&app, project.id).await;
        let created = create_order_at(
            &app.state,
            &crew,
            regular_order(project.id, Uuid::new_v4(), vec![line(1, 20)]),
            noon(),
        )
        .await
        .unwrap()
        .data
        .unwrap();
        ids.push(created.order.order.id);
    }
    update_order_status_at(
        &app.state,
        &admin,
        ids[0],
        UpdateOrderStatusRequest {
            status: "CONFIRMED".into(),
        },
        noon(),
    )
    .await
    .unwrap();

    let confirmed = aggregate_by_restaurant_at(
        &app.state,
        &admin,
        project.id,
        AggregationQuery {
            date: None,
            status: Some("CONFIRMED".into()),
        },
        noon(),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(confirmed.total_orders, 1);
    assert_eq!(confirmed.by_status.len(), 1);
    assert_eq!(confirmed.by_status[0].status, OrderStatus::Confirmed);

    let yesterday = aggregate_by_restaurant_at(
        &app.state,
        &admin,
        project.id,
        AggregationQuery {
            date: NaiveDate::from_ymd_opt(2026, 3, 9),
            status: None,
        },
        noon(),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(yesterday.total_orders, 0);

    let err = aggregate_by_restaurant_at(
        &app.state,
        &admin,
        project.id,
        AggregationQuery {
            date: None,
            status: Some("LOST".into()),
        },
        noon(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "INVALID_STATUS");
}

#[tokio::test]
async fn crew_members_cannot_read_the_rollup() {
    let app = test_app();
    let project = open_project(&app).await;
    let crew = crew_member(&app, project.id).await;

    let err = aggregate_by_restaurant_at(
        &app.state,
        &crew,
        project.id,
        AggregationQuery::default(),
        noon(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn users_without_order_is_the_set_difference() {
    let app = test_app();
    let project = open_project(&app).await;
    let producer = seed_user(&app, Role::Producer).await;

    let ordered = crew_member(&app, project.id).await;
    let waiting_a = crew_member(&app, project.id).await;
    let waiting_b = crew_member(&app, project.id).await;
    let cancelled = crew_member(&app, project.id).await;

    create_order_at(
        &app.state,
        &ordered,
        regular_order(project.id, Uuid::new_v4(), vec![line(1, 20)]),
        noon(),
    )
    .await
    .unwrap();
    let dropped = create_order_at(
        &app.state,
        &cancelled,
        regular_order(project.id, Uuid::new_v4(), vec![line(1, 20)]),
        noon(),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    cancel_order_at(
        &app.state,
        &cancelled,
        dropped.order.order.id,
        CancelOrderRequest::default(),
        noon(),
    )
    .await
    .unwrap();

    let mut expected = vec![waiting_a.user_id, waiting_b.user_id, cancelled.user_id];
    expected.sort();

    let first = users_without_order_today_at(&app.state, &producer, project.id, noon())
        .await
        .unwrap()
        .data
        .unwrap();
    let second = users_without_order_today_at(&app.state, &producer, project.id, noon())
        .await
        .unwrap()
        .data
        .unwrap();

    assert_eq!(first.user_ids, expected);
    assert_eq!(first.user_ids, second.user_ids);
}

#[tokio::test]
async fn reminders_are_sent_once_per_user_per_day() {
    let app = test_app();
    let project = open_project(&app).await;
    let producer = seed_user(&app, Role::Producer).await;
    let waiting = crew_member(&app, project.id).await;
    let ordered = crew_member(&app, project.id).await;

    create_order_at(
        &app.state,
        &ordered,
        regular_order(project.id, Uuid::new_v4(), vec![line(1, 20)]),
        noon(),
    )
    .await
    .unwrap();

    let first = send_reminders_at(&app.state, &producer, project.id, noon())
        .await
        .unwrap()
        .data
        .unwrap();
    assert_eq!(first.notified, vec![waiting.user_id]);

    let second = send_reminders_at(&app.state, &producer, project.id, noon() + Duration::minutes(5))
        .await
        .unwrap()
        .data
        .unwrap();
    assert!(second.notified.is_empty());
    assert_eq!(second.already_reminded, vec![waiting.user_id]);

    // The scheduled sweep shares the ledger.
    let swept = reminders::run_once(&app.state, noon() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(swept.len(), 1);
    assert!(swept[0].notified.is_empty());

    let reminders_sent = app
        .notifier
        .sent_to(waiting.user_id)
        .into_iter()
        .filter(|n| n.payload["kind"] == "ORDER_REMINDER")
        .count();
    assert_eq!(reminders_sent, 1);
    assert!(
        app.notifier
            .sent_to(ordered.user_id)
            .iter()
            .all(|n| n.payload["kind"] != "ORDER_REMINDER")
    );

    let err = send_reminders_at(&app.state, &waiting, project.id, noon())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}

#[tokio::test]
async fn scheduled_sweep_skips_projects_with_closed_windows() {
    let app = test_app();
    let closed = seed_project(&app, noon() - Duration::hours(3), 30).await;
    crew_member(&app, closed.id).await;

    let reports = reminders::run_once(&app.state, noon()).await.unwrap();
    assert!(reports.is_empty());
    assert!(app.state.reminders.is_empty());
}

#[tokio::test]
async fn report_rejects_totals_beyond_the_amount_range() {
    let app = test_app();
    let project = open_project(&app).await;
    let producer = seed_user(&app, Role::Producer).await;
    let restaurant = Uuid::new_v4();

    // Each order fits on its own; their sum does not.
    for _ in 0..2 {
        let crew = crew_member(&app, project.id).await;
        create_order_at(
            &app.state,
            &crew,
            regular_order(project.id, restaurant, vec![line(1, i64::MAX / 2 + 1)]),
            noon(),
        )
        .await
        .unwrap();
    }

    let err = aggregate_by_restaurant_at(
        &app.state,
        &producer,
        project.id,
        AggregationQuery::default(),
        noon(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "AMOUNT_OVERFLOW");
    assert_eq!(err.status().as_u16(), 422);
}

#[tokio::test]
async fn stats_cover_every_day_in_the_range() {
    let app = test_app();
    let project = open_project(&app).await;
    let producer = seed_user(&app, Role::Producer).await;

    for price in [40, 60] {
        let crew = crew_member(&app, project.id).await;
        create_order_at(
            &app.state,
            &crew,
            regular_order(project.id, Uuid::new_v4(), vec![line(1, price)]),
            noon(),
        )
        .await
        .unwrap();
    }
    // Exception orders skip the window, so the next day can still take one.
    let vip = seed_user(&app, Role::Vip).await;
    join(&app, project.id, &vip).await;
    let late = exception_order(Some(project.id), "FULL", vec![line(2, 50)]);
    create_order_at(&app.state, &vip, late, noon() + Duration::days(1))
        .await
        .unwrap();

    let day = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
    let next = NaiveDate::from_ymd_opt(2026, 3, 11).unwrap();

    let both = order_stats_at(
        &app.state,
        &producer,
        project.id,
        StatsQuery {
            from: Some(day),
            to: Some(next),
        },
        noon() + Duration::days(1),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!(both.total_orders, 3);
    assert_eq!(both.total_revenue, 200);
    assert!((both.average_order_value - 200.0 / 3.0).abs() < 1e-9);
    let pending_approval = both
        .by_status
        .iter()
        .find(|s| s.status == OrderStatus::PendingApproval)
        .unwrap();
    assert_eq!(pending_approval.total_amount, 100);

    let first_day = order_stats_at(
        &app.state,
        &producer,
        project.id,
        StatsQuery {
            from: Some(day),
            to: Some(day),
        },
        noon() + Duration::days(1),
    )
    .await
    .unwrap()
    .data
    .unwrap();
    assert_eq!((first_day.total_orders, first_day.total_revenue), (2, 100));

    let err = order_stats_at(
        &app.state,
        &producer,
        project.id,
        StatsQuery {
            from: Some(next),
            to: Some(day),
        },
        noon(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "BAD_REQUEST");

    let crew = crew_member(&app, project.id).await;
    let err = order_stats_at(&app.state, &crew, project.id, StatsQuery::default(), noon())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
}
