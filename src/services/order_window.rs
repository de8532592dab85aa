//! Admission window for regular orders and the per-day duplicate guard.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Order, Project},
    store::Repository,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowStatus {
    #[serde(rename_all = "camelCase")]
    NotStarted { minutes_until_start: i64 },
    #[serde(rename_all = "camelCase")]
    Open { minutes_remaining: i64 },
    #[serde(rename_all = "camelCase")]
    Closed { minutes_since_close: i64 },
}

impl WindowStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, WindowStatus::Open { .. })
    }

    /// Maps a non-open window to the admission error a regular order receives.
    pub fn admit(self) -> AppResult<()> {
        match self {
            WindowStatus::Open { .. } => Ok(()),
            WindowStatus::NotStarted {
                minutes_until_start,
            } => Err(AppError::WindowNotStarted {
                minutes_until_start,
            }),
            WindowStatus::Closed {
                minutes_since_close,
            } => Err(AppError::WindowClosed {
                minutes_since_close,
            }),
        }
    }
}

pub fn window_bounds(project: &Project) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = project.start_date;
    let end = start + Duration::minutes(i64::from(project.order_window_minutes.max(0)));
    (start, end)
}

/// Both bounds are inclusive.
pub fn check_window(project: &Project, now: DateTime<Utc>) -> WindowStatus {
    let (start, end) = window_bounds(project);
    if now < start {
        WindowStatus::NotStarted {
            minutes_until_start: ceil_minutes(start - now),
        }
    } else if now > end {
        WindowStatus::Closed {
            minutes_since_close: ceil_minutes(now - end),
        }
    } else {
        WindowStatus::Open {
            minutes_remaining: ceil_minutes(end - now),
        }
    }
}

fn ceil_minutes(delta: Duration) -> i64 {
    let ms = delta.num_milliseconds().max(0);
    (ms + 59_999) / 60_000
}

pub fn local_day(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Local midnight of the day `now` falls on, expressed in UTC.
pub fn start_of_local_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let midnight = local_day(now, offset).and_time(chrono::NaiveTime::MIN);
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Read-only duplicate check. The insert itself is guarded atomically by the repository.
pub async fn check_duplicate(
    store: &dyn Repository,
    user_id: Uuid,
    project_id: Uuid,
    since_start_of_local_day: DateTime<Utc>,
) -> AppResult<()> {
    let existing: Option<Order> = store
        .find_active_regular_order_since(user_id, project_id, since_start_of_local_day)
        .await?;
    match existing {
        Some(order) => Err(AppError::DuplicateOrder {
            existing_order_id: Some(order.id),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(start_date: DateTime<Utc>, order_window_minutes: i32) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "Night shoot".into(),
            location: None,
            start_date,
            order_window_minutes,
            is_active: true,
            created_at: start_date,
        }
    }

    #[test]
    fn open_inside_window() {
        let now = Utc::now();
        let p = project(now - Duration::minutes(45), 60);
        assert_eq!(
            check_window(&p, now),
            WindowStatus::Open {
                minutes_remaining: 15
            }
        );
    }

    #[test]
    fn closed_after_window() {
        let now = Utc::now();
        let p = project(now - Duration::minutes(45), 30);
        let status = check_window(&p, now);
        assert_eq!(
            status,
            WindowStatus::Closed {
                minutes_since_close: 15
            }
        );
        assert_eq!(status.admit().unwrap_err().code(), "WINDOW_CLOSED");
    }

    #[test]
    fn not_started_rounds_up() {
        let now = Utc::now();
        let p = project(now + Duration::seconds(90), 60);
        assert_eq!(
            check_window(&p, now),
            WindowStatus::NotStarted {
                minutes_until_start: 2
            }
        );
    }

    #[test]
    fn bounds_are_inclusive() {
        let start = Utc::now();
        let p = project(start, 30);
        assert!(check_window(&p, start).is_open());
        assert!(check_window(&p, start + Duration::minutes(30)).is_open());
        assert!(!check_window(&p, start + Duration::minutes(30) + Duration::milliseconds(1)).is_open());
    }

    #[test]
    fn local_midnight_respects_offset() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(local_day(now, offset), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(
            start_of_local_day(now, offset),
            Utc.with_ymd_and_hms(2026, 3, 1, 22, 0, 0).unwrap()
        );
    }
}
