#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use crew_meals_api::{
    config::AppConfig,
    dto::orders::{CreateOrderRequest, OrderItemRequest},
    middleware::auth::AuthUser,
    models::{OrderType, Project, ProjectMembership, Role, User},
    notify::RecordingNotifier,
    state::AppState,
    store::{MemoryRepository, Repository},
};
use uuid::Uuid;

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "test-jwt-secret".into(),
        access_token_secret: "test-access-secret".into(),
        access_tag_secret: "test-tag-secret".into(),
        project_token_ttl_hours: 24,
        tracking_token_ttl_hours: 24 * 7,
        regular_meal_budget: 50,
        exception_quota_days: 21,
        order_day_utc_offset_minutes: 0,
        reminder_interval_secs: 0,
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryRepository>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryRepository::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let state = AppState::new(store.clone(), notifier.clone(), test_config());
    TestApp {
        state,
        store,
        notifier,
    }
}

/// Midday, so local-day arithmetic never straddles midnight.
pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

pub async fn seed_user(app: &TestApp, role: Role) -> AuthUser {
    let id = Uuid::new_v4();
    app.store
        .insert_user(User {
            id,
            email: format!("{id}@crew.test"),
            password_hash: String::new(),
            role,
            is_active: true,
            created_at: noon(),
        })
        .await
        .unwrap();
    AuthUser::new(id, role)
}

pub async fn seed_project(
    app: &TestApp,
    start_date: DateTime<Utc>,
    order_window_minutes: i32,
) -> Project {
    app.store
        .insert_project(Project {
            id: Uuid::new_v4(),
            name: "Night exterior".into(),
            location: Some("Backlot".into()),
            start_date,
            order_window_minutes,
            is_active: true,
            created_at: start_date - Duration::days(1),
        })
        .await
        .unwrap()
}

/// A project whose window opened 45 minutes before [`noon`] and lasts an hour.
pub async fn open_project(app: &TestApp) -> Project {
    seed_project(app, noon() - Duration::minutes(45), 60).await
}

pub async fn join(app: &TestApp, project_id: Uuid, user: &AuthUser) {
    app.store
        .upsert_membership(ProjectMembership {
            project_id,
            user_id: user.user_id,
            role: user.role,
            is_active: true,
            joined_at: noon(),
        })
        .await
        .unwrap();
}

pub async fn crew_member(app: &TestApp, project_id: Uuid) -> AuthUser {
    let user = seed_user(app, Role::Regular).await;
    join(app, project_id, &user).await;
    user
}

pub fn line(quantity: i32, price: i64) -> OrderItemRequest {
    OrderItemRequest {
        menu_item_id: Uuid::new_v4(),
        quantity,
        price,
        special_instructions: None,
    }
}

pub fn regular_order(project_id: Uuid, restaurant_id: Uuid, items: Vec<OrderItemRequest>) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: None,
        project_id: Some(project_id),
        restaurant_id,
        order_type: Some(OrderType::Regular),
        exception_type: None,
        exception_reason: None,
        items,
        delivery_address: Some("Unit base, tent 3".into()),
        delivery_lat: None,
        delivery_lng: None,
    }
}

pub fn exception_order(
    project_id: Option<Uuid>,
    exception_type: &str,
    items: Vec<OrderItemRequest>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        user_id: None,
        project_id,
        restaurant_id: Uuid::new_v4(),
        order_type: Some(OrderType::Exception),
        exception_type: Some(exception_type.to_string()),
        exception_reason: Some("Late wrap on set".into()),
        items,
        delivery_address: None,
        delivery_lat: None,
        delivery_lng: None,
    }
}
