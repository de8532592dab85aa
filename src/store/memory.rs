use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    AuditEntry, DateRange, InsertOutcome, OrderListFilter, Repository, RosterSnapshot,
    StatusTransition,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        Order, OrderException, OrderItem, OrderStatus, OrderType, OrderWithItems, Project,
        ProjectMembership, User,
    },
};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, Project>,
    memberships: HashMap<(Uuid, Uuid), ProjectMembership>,
    orders: HashMap<Uuid, Order>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    exceptions: HashMap<Uuid, OrderException>,
    audit: Vec<AuditEntry>,
}

impl Inner {
    fn assemble(&self, order: &Order) -> OrderWithItems {
        OrderWithItems {
            order: order.clone(),
            items: self.items.get(&order.id).cloned().unwrap_or_default(),
            exception: self.exceptions.get(&order.id).cloned(),
        }
    }

    fn holds_daily_slot(order: &Order, candidate: &Order) -> bool {
        order.order_type == OrderType::Regular
            && order.status != OrderStatus::Cancelled
            && order.user_id == candidate.user_id
            && order.project_id == candidate.project_id
            && order.order_day == candidate.order_day
    }
}

/// Single-mutex repository; every operation observes and mutates one consistent state.
#[derive(Default)]
pub struct MemoryRepository {
    inner: Mutex<Inner>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory repository poisoned")))
    }

    pub fn audit_actions(&self) -> Vec<String> {
        self.lock()
            .map(|inner| inner.audit.iter().map(|e| e.action.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: User) -> AppResult<User> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(AppError::BadRequest("Email is already taken".into()));
        }
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn insert_project(&self, project: Project) -> AppResult<Project> {
        let mut inner = self.lock()?;
        inner.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn update_project(&self, project: Project) -> AppResult<Project> {
        let mut inner = self.lock()?;
        match inner.projects.get_mut(&project.id) {
            Some(existing) => {
                *existing = project.clone();
                Ok(project)
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn find_project(&self, id: Uuid) -> AppResult<Option<Project>> {
        Ok(self.lock()?.projects.get(&id).cloned())
    }

    async fn list_active_projects(&self) -> AppResult<Vec<Project>> {
        let inner = self.lock()?;
        let mut projects: Vec<Project> =
            inner.projects.values().filter(|p| p.is_active).cloned().collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ProjectMembership>> {
        Ok(self.lock()?.memberships.get(&(project_id, user_id)).cloned())
    }

    async fn upsert_membership(
        &self,
        membership: ProjectMembership,
    ) -> AppResult<(ProjectMembership, bool)> {
        let mut inner = self.lock()?;
        let key = (membership.project_id, membership.user_id);
        match inner.memberships.get_mut(&key) {
            Some(existing) => {
                existing.is_active = true;
                existing.role = membership.role;
                Ok((existing.clone(), false))
            }
            None => {
                inner.memberships.insert(key, membership.clone());
                Ok((membership, true))
            }
        }
    }

    async fn find_active_regular_order_since(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let inner = self.lock()?;
        Ok(inner
            .orders
            .values()
            .filter(|o| {
                o.user_id == user_id
                    && o.project_id == Some(project_id)
                    && o.order_type == OrderType::Regular
                    && o.status != OrderStatus::Cancelled
                    && o.created_at >= since
            })
            .min_by_key(|o| o.created_at)
            .cloned())
    }

    async fn insert_order(
        &self,
        order: OrderWithItems,
        quota_since: Option<DateTime<Utc>>,
    ) -> AppResult<InsertOutcome> {
        let mut inner = self.lock()?;
        let candidate = &order.order;
        if let (Some(since), Some(exception)) = (quota_since, &order.exception) {
            if exception.quota_used {
                if let Some(last_used_at) = inner
                    .exceptions
                    .values()
                    .filter(|e| e.user_id == exception.user_id && e.quota_used)
                    .map(|e| e.created_at)
                    .filter(|at| *at >= since)
                    .max()
                {
                    return Ok(InsertOutcome::QuotaExhausted { last_used_at });
                }
            }
        }
        if candidate.order_type == OrderType::Regular && candidate.project_id.is_some() {
            if let Some(existing) = inner
                .orders
                .values()
                .find(|o| Inner::holds_daily_slot(o, candidate))
            {
                return Ok(InsertOutcome::Duplicate {
                    existing_order_id: Some(existing.id),
                });
            }
        }

        let id = candidate.id;
        inner.orders.insert(id, candidate.clone());
        inner.items.insert(id, order.items.clone());
        if let Some(exception) = &order.exception {
            inner.exceptions.insert(id, exception.clone());
        }
        Ok(InsertOutcome::Inserted(order))
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<OrderWithItems>> {
        let inner = self.lock()?;
        Ok(inner.orders.get(&id).map(|o| inner.assemble(o)))
    }

    async fn list_user_orders(
        &self,
        user_id: Uuid,
        filter: OrderListFilter,
    ) -> AppResult<(Vec<Order>, i64)> {
        let inner = self.lock()?;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        if filter.newest_first {
            orders.reverse();
        }
        let total = orders.len() as i64;
        let page = orders
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn transition_order(&self, transition: StatusTransition) -> AppResult<Option<Order>> {
        let mut inner = self.lock()?;
        let Some(order) = inner.orders.get_mut(&transition.order_id) else {
            return Ok(None);
        };
        if order.status != transition.from {
            return Ok(None);
        }
        order.status = transition.to;
        order.updated_at = transition.at;
        if transition.to == OrderStatus::Delivered {
            order.delivered_at = Some(transition.at);
        }
        if transition.cancellation_reason.is_some() {
            order.cancellation_reason = transition.cancellation_reason.clone();
        }
        let updated = order.clone();

        if let Some(status) = transition.exception_status {
            if let Some(exception) = inner.exceptions.get_mut(&transition.order_id) {
                exception.status = status;
                exception.reviewed_by = Some(transition.actor);
                exception.reviewed_at = Some(transition.at);
            }
        }
        Ok(Some(updated))
    }

    async fn orders_snapshot(
        &self,
        project_id: Uuid,
        range: DateRange,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<OrderWithItems>> {
        let inner = self.lock()?;
        let mut orders: Vec<OrderWithItems> = inner
            .orders
            .values()
            .filter(|o| o.project_id == Some(project_id))
            .filter(|o| o.status != OrderStatus::Cancelled)
            .filter(|o| status.is_none_or(|s| o.status == s))
            .filter(|o| range.contains(o.created_at))
            .map(|o| inner.assemble(o))
            .collect();
        orders.sort_by_key(|o| o.order.created_at);
        Ok(orders)
    }

    async fn roster_snapshot(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<RosterSnapshot> {
        let inner = self.lock()?;
        let active_members = inner
            .memberships
            .values()
            .filter(|m| m.project_id == project_id && m.is_active)
            .map(|m| m.user_id)
            .collect();
        let users_with_orders: HashSet<Uuid> = inner
            .orders
            .values()
            .filter(|o| o.project_id == Some(project_id))
            .filter(|o| o.status != OrderStatus::Cancelled && o.created_at >= since)
            .map(|o| o.user_id)
            .collect();
        Ok(RosterSnapshot {
            active_members,
            users_with_orders,
        })
    }

    async fn append_audit(&self, entry: AuditEntry) -> AppResult<()> {
        self.lock()?.audit.push(entry);
        Ok(())
    }
}
