use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{models::{Project, ProjectMembership}, services::order_window::WindowStatus};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    /// Defaults to 60.
    pub order_window_minutes: Option<i32>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub order_window_minutes: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RedeemProjectTokenRequest {
    /// Bare token or the JSON payload scanned from the QR code.
    pub token: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderWindowView {
    pub project_id: Uuid,
    pub is_open: bool,
    /// `NOT_STARTED`, `OPEN` or `CLOSED`.
    pub state: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub minutes_until_start: Option<i64>,
    pub minutes_remaining: Option<i64>,
    pub minutes_since_close: Option<i64>,
}

impl OrderWindowView {
    pub fn new(
        project_id: Uuid,
        bounds: (DateTime<Utc>, DateTime<Utc>),
        status: WindowStatus,
    ) -> Self {
        let (window_start, window_end) = bounds;
        let mut view = Self {
            project_id,
            is_open: status.is_open(),
            state: String::new(),
            window_start,
            window_end,
            minutes_until_start: None,
            minutes_remaining: None,
            minutes_since_close: None,
        };
        match status {
            WindowStatus::NotStarted {
                minutes_until_start,
            } => {
                view.state = "NOT_STARTED".into();
                view.minutes_until_start = Some(minutes_until_start);
            }
            WindowStatus::Open { minutes_remaining } => {
                view.state = "OPEN".into();
                view.minutes_remaining = Some(minutes_remaining);
            }
            WindowStatus::Closed {
                minutes_since_close,
            } => {
                view.state = "CLOSED".into();
                view.minutes_since_close = Some(minutes_since_close);
            }
        }
        view
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectAccessGranted {
    pub project: Project,
    pub membership: ProjectMembership,
    /// False when the caller already was a member.
    pub newly_joined: bool,
    pub order_window: OrderWindowView,
    pub token_expires_at: DateTime<Utc>,
}
