//! Reminder sweep: notify active members who have not ordered today.
//!
//! Each (project, local day, user) triple is notified at most once per process. A triple is
//! claimed before sending and released again if delivery fails, so a concurrent sweep never
//! double-sends and a failed send is retried on the next pass.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    dto::aggregation::ReminderReport,
    error::AppResult,
    models::Project,
    services::{
        aggregation::users_without_order,
        order_window::{WindowStatus, check_window, local_day, start_of_local_day},
    },
    state::AppState,
};

type ReminderKey = (Uuid, NaiveDate, Uuid);

#[derive(Debug, Default)]
pub struct ReminderLedger {
    sent: Mutex<HashSet<ReminderKey>>,
}

impl ReminderLedger {
    /// Every mutation is a single set operation, so a poisoned set is still consistent.
    fn sent(&self) -> MutexGuard<'_, HashSet<ReminderKey>> {
        self.sent.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("reminder ledger lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Returns false when the triple was already claimed.
    fn claim(&self, key: ReminderKey) -> bool {
        self.sent().insert(key)
    }

    fn release(&self, key: &ReminderKey) {
        self.sent().remove(key);
    }

    fn prune_before(&self, day: NaiveDate) {
        self.sent().retain(|(_, d, _)| *d >= day);
    }

    pub fn len(&self) -> usize {
        self.sent().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn reminder_message(project: &Project, window: WindowStatus) -> String {
    match window {
        WindowStatus::Open { minutes_remaining } => format!(
            "Ordering for {} closes in {} minutes",
            project.name, minutes_remaining
        ),
        WindowStatus::NotStarted {
            minutes_until_start,
        } => format!(
            "Ordering for {} opens in {} minutes",
            project.name, minutes_until_start
        ),
        WindowStatus::Closed { .. } => format!("You have not ordered for {} today", project.name),
    }
}

pub async fn remind_project(
    state: &AppState,
    project: &Project,
    now: DateTime<Utc>,
) -> AppResult<ReminderReport> {
    let offset = state.config.order_day_offset();
    let day = local_day(now, offset);
    let pending =
        users_without_order(state.store.as_ref(), project.id, start_of_local_day(now, offset))
            .await?;

    let window = check_window(project, now);
    let message = reminder_message(project, window);
    let mut report = ReminderReport {
        project_id: project.id,
        date: day,
        notified: Vec::new(),
        already_reminded: Vec::new(),
        failed: Vec::new(),
    };

    for user_id in pending {
        let key = (project.id, day, user_id);
        if !state.reminders.claim(key) {
            report.already_reminded.push(user_id);
            continue;
        }
        let payload = serde_json::json!({
            "projectId": project.id,
            "date": day,
            "kind": "ORDER_REMINDER",
        });
        match state.notifier.notify(user_id, &message, payload).await {
            Ok(()) => report.notified.push(user_id),
            Err(err) => {
                tracing::warn!(error = %err, user_id = %user_id, "reminder failed");
                state.reminders.release(&key);
                report.failed.push(user_id);
            }
        }
    }

    tracing::info!(
        project_id = %project.id,
        notified = report.notified.len(),
        skipped = report.already_reminded.len(),
        failed = report.failed.len(),
        "reminder sweep finished"
    );
    Ok(report)
}

/// One pass over every active project whose order window is open.
pub async fn run_once(state: &AppState, now: DateTime<Utc>) -> AppResult<Vec<ReminderReport>> {
    let offset = state.config.order_day_offset();
    state.reminders.prune_before(local_day(now, offset));

    let mut reports = Vec::new();
    for project in state.store.list_active_projects().await? {
        if !check_window(&project, now).is_open() {
            continue;
        }
        reports.push(remind_project(state, &project, now).await?);
    }
    Ok(reports)
}

pub fn spawn(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = run_once(&state, Utc::now()).await {
                tracing::warn!(error = %err, "reminder sweep failed");
            }
        }
    })
}
