//! Storage capability injected into every service.
//!
//! [`postgres::PgRepository`] backs the running service; [`memory::MemoryRepository`] is a
//! drop-in used by the test suite. Both honour the same atomicity contract: a regular
//! order is inserted only if the user has no other non-cancelled regular order in the same
//! project on the same local day, and status changes are compare-and-set.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        ExceptionStatus, Order, OrderStatus, OrderWithItems, Project, ProjectMembership, User,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(OrderWithItems),
    /// Another non-cancelled regular order already holds the (user, project, day) slot.
    Duplicate { existing_order_id: Option<Uuid> },
    /// The requester already spent their exception quota inside the window.
    QuotaExhausted { last_used_at: DateTime<Utc> },
}

#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor: Uuid,
    pub at: DateTime<Utc>,
    pub cancellation_reason: Option<String>,
    /// Set when the order leaves `PENDING_APPROVAL`; applied to the linked exception.
    pub exception_status: Option<ExceptionStatus>,
}

#[derive(Debug, Clone, Copy)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    /// Exclusive.
    pub to: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.from && at < self.to
    }
}

#[derive(Debug, Clone)]
pub struct OrderListFilter {
    pub status: Option<OrderStatus>,
    pub newest_first: bool,
    pub limit: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    pub active_members: Vec<Uuid>,
    pub users_with_orders: HashSet<Uuid>,
}

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: String,
    pub resource: Option<String>,
    pub metadata: Option<Value>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>>;

    /// Fails with `BadRequest` when the email is taken.
    async fn insert_user(&self, user: User) -> AppResult<User>;

    async fn insert_project(&self, project: Project) -> AppResult<Project>;

    async fn update_project(&self, project: Project) -> AppResult<Project>;

    async fn find_project(&self, id: Uuid) -> AppResult<Option<Project>>;

    async fn list_active_projects(&self) -> AppResult<Vec<Project>>;

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ProjectMembership>>;

    /// Creates the membership or re-activates an existing one. The flag reports creation.
    async fn upsert_membership(
        &self,
        membership: ProjectMembership,
    ) -> AppResult<(ProjectMembership, bool)>;

    async fn find_active_regular_order_since(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Option<Order>>;

    /// Persists order, items and exception as one unit. When the exception is
    /// quota-consuming and `quota_since` is set, the insert is refused if the same user
    /// holds another quota-consuming exception created at or after `quota_since`.
    async fn insert_order(
        &self,
        order: OrderWithItems,
        quota_since: Option<DateTime<Utc>>,
    ) -> AppResult<InsertOutcome>;

    async fn find_order(&self, id: Uuid) -> AppResult<Option<OrderWithItems>>;

    async fn list_user_orders(
        &self,
        user_id: Uuid,
        filter: OrderListFilter,
    ) -> AppResult<(Vec<Order>, i64)>;

    /// Returns `None` when the order is no longer in `transition.from`.
    async fn transition_order(&self, transition: StatusTransition) -> AppResult<Option<Order>>;

    /// Non-cancelled orders of a project created within `range`, read from one snapshot.
    async fn orders_snapshot(
        &self,
        project_id: Uuid,
        range: DateRange,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<OrderWithItems>>;

    /// Active members and the users holding a non-cancelled order since `since`, read
    /// from one snapshot.
    async fn roster_snapshot(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<RosterSnapshot>;

    async fn append_audit(&self, entry: AuditEntry) -> AppResult<()>;
}
