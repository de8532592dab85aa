use serde_json::Value;
use uuid::Uuid;

use crate::{error::AppResult, store::AuditEntry, store::Repository};

pub async fn log_audit(
    store: &dyn Repository,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) -> AppResult<()> {
    store
        .append_audit(AuditEntry {
            id: Uuid::new_v4(),
            user_id,
            action: action.to_string(),
            resource: resource.map(str::to_string),
            metadata,
        })
        .await
}

/// Audit is best effort: a failed write is logged and swallowed.
pub async fn record(
    store: &dyn Repository,
    user_id: Option<Uuid>,
    action: &str,
    resource: Option<&str>,
    metadata: Option<Value>,
) {
    if let Err(err) = log_audit(store, user_id, action, resource, metadata).await {
        tracing::warn!(error = %err, action, "audit log failed");
    }
}
