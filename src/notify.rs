//! Outbound notifications to crew members.
//!
//! Delivery channels (push, SMS, email) live outside this service; a [`Notifier`] is the
//! seam they plug into. The default [`TracingNotifier`] only emits a structured log line.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: Uuid, message: &str, payload: Value) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, user_id: Uuid, message: &str, payload: Value) -> anyhow::Result<()> {
        tracing::info!(user_id = %user_id, %payload, "{message}");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub user_id: Uuid,
    pub message: String,
    pub payload: Value,
}

/// Keeps every notification in memory. Used by tests to observe what was sent.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, user_id: Uuid) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id == user_id)
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: Uuid, message: &str, payload: Value) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recording notifier poisoned"))?
            .push(SentNotification {
                user_id,
                message: message.to_string(),
                payload,
            });
        Ok(())
    }
}

/// Fire-and-forget: the request never waits on, or fails because of, delivery.
pub fn dispatch(notifier: Arc<dyn Notifier>, user_id: Uuid, message: String, payload: Value) {
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(user_id, &message, payload).await {
            tracing::warn!(error = %err, user_id = %user_id, "notification failed");
        }
    });
}
