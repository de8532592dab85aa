use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Producer,
    ProjectManager,
    Vip,
    Regular,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Producer => "PRODUCER",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::Vip => "VIP",
            Role::Regular => "REGULAR",
        }
    }

    /// Roles whose exception orders never draw on the per-user quota.
    pub fn has_unlimited_exceptions(&self) -> bool {
        matches!(self, Role::Vip | Role::Admin | Role::Producer)
    }

    /// Unknown role strings degrade to `Regular`, the least privileged role.
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "ADMIN" => Role::Admin,
            "PRODUCER" => Role::Producer,
            "PROJECT_MANAGER" => Role::ProjectManager,
            "VIP" => Role::Vip,
            _ => Role::Regular,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Regular,
    Exception,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Regular => "REGULAR",
            OrderType::Exception => "EXCEPTION",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "REGULAR" => Ok(OrderType::Regular),
            "EXCEPTION" => Ok(OrderType::Exception),
            other => Err(AppError::BadRequest(format!("Unknown order type {other}"))),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PendingApproval,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PendingApproval => "PENDING_APPROVAL",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Parses a status as stored in the database, including `PENDING_APPROVAL`.
    pub fn from_stored(value: &str) -> Result<Self, AppError> {
        match value {
            "PENDING_APPROVAL" => Ok(OrderStatus::PendingApproval),
            other => Self::parse_requested(other),
        }
    }

    /// Parses a status requested through the status-update surface. Exactly six values
    /// are recognized; `READY` is accepted as another spelling of `OUT_FOR_DELIVERY`.
    pub fn parse_requested(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "PREPARING" => Ok(OrderStatus::Preparing),
            "READY" | "OUT_FOR_DELIVERY" => Ok(OrderStatus::OutForDelivery),
            "DELIVERED" => Ok(OrderStatus::Delivered),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            _ => Err(AppError::InvalidStatus(value.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (PendingApproval, Confirmed)
                | (PendingApproval, Pending)
                | (PendingApproval, Cancelled)
                | (Confirmed, Preparing)
                | (Confirmed, Cancelled)
                | (Preparing, OutForDelivery)
                | (OutForDelivery, Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionType {
    Full,
    Limited,
    SelfPaid,
}

impl ExceptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionType::Full => "FULL",
            ExceptionType::Limited => "LIMITED",
            ExceptionType::SelfPaid => "SELF_PAID",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "FULL" => Ok(ExceptionType::Full),
            "LIMITED" => Ok(ExceptionType::Limited),
            "SELF_PAID" => Ok(ExceptionType::SelfPaid),
            _ => Err(AppError::InvalidExceptionType(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExceptionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionStatus::Pending => "PENDING",
            ExceptionStatus::Approved => "APPROVED",
            ExceptionStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "PENDING" => Ok(ExceptionStatus::Pending),
            "APPROVED" => Ok(ExceptionStatus::Approved),
            "REJECTED" => Ok(ExceptionStatus::Rejected),
            other => Err(AppError::Internal(anyhow::anyhow!(
                "unknown exception status {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub start_date: DateTime<Utc>,
    pub order_window_minutes: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMembership {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    pub restaurant_id: Uuid,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub user_pay_amount: i64,
    pub exception_amount: i64,
    pub delivery_address: Option<String>,
    pub delivery_lat: Option<f64>,
    pub delivery_lng: Option<f64>,
    pub order_day: NaiveDate,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub menu_item_id: Uuid,
    pub quantity: i32,
    pub unit_price: i64,
    pub special_instructions: Option<String>,
}

impl OrderItem {
    /// `None` when the line does not fit in `i64`.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderException {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub exception_type: ExceptionType,
    pub requested_amount: i64,
    pub status: ExceptionStatus,
    pub reason: String,
    /// Counts against the requester's exception quota.
    pub quota_used: bool,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<OrderException>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_is_an_alias_for_out_for_delivery() {
        assert_eq!(
            OrderStatus::parse_requested("READY").unwrap(),
            OrderStatus::OutForDelivery
        );
    }

    #[test]
    fn pending_approval_is_not_requestable() {
        let err = OrderStatus::parse_requested("PENDING_APPROVAL").unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus(_)));
        assert_eq!(
            OrderStatus::from_stored("PENDING_APPROVAL").unwrap(),
            OrderStatus::PendingApproval
        );
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let all = [
            OrderStatus::Pending,
            OrderStatus::PendingApproval,
            OrderStatus::Confirmed,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ];
        for next in all {
            assert!(!OrderStatus::Delivered.can_transition_to(next));
            assert!(!OrderStatus::Cancelled.can_transition_to(next));
        }
        assert!(!OrderStatus::Preparing.can_transition_to(OrderStatus::Cancelled));
    }
}
