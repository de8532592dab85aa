use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    AccessMode, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection,
    DbBackend, DbErr, EntityTrait, IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, SqlErr, Statement, TransactionTrait,
};
use uuid::Uuid;

use super::{
    AuditEntry, DateRange, InsertOutcome, OrderListFilter, Repository, RosterSnapshot,
    StatusTransition,
};
use crate::{
    db::{DbPool, orm_from_pool},
    entity::{
        order_exceptions::{
            ActiveModel as ExceptionActive, Column as ExceptionCol, Entity as OrderExceptions,
            Model as ExceptionModel,
        },
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        project_members::{
            ActiveModel as MemberActive, Column as MemberCol, Entity as ProjectMembers,
            Model as MemberModel,
        },
        projects::{
            ActiveModel as ProjectActive, Column as ProjectCol, Entity as Projects,
            Model as ProjectModel,
        },
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Model as UserModel},
    },
    error::{AppError, AppResult},
    models::{
        ExceptionStatus, ExceptionType, Order, OrderException, OrderItem, OrderStatus, OrderType,
        OrderWithItems, Project, ProjectMembership, Role, User,
    },
};

const REGULAR: &str = "REGULAR";
const CANCELLED: &str = "CANCELLED";

#[derive(Clone)]
pub struct PgRepository {
    orm: DatabaseConnection,
    pool: DbPool,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self {
            orm: orm_from_pool(&pool),
            pool,
        }
    }

    pub fn orm(&self) -> &DatabaseConnection {
        &self.orm
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[async_trait]
impl Repository for PgRepository {
    async fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = Users::find()
            .filter(UserCol::Email.eq(email))
            .one(&self.orm)
            .await?;
        Ok(user.map(user_from_entity))
    }

    async fn insert_user(&self, user: User) -> AppResult<User> {
        let inserted = UserActive {
            id: Set(user.id),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            role: Set(user.role.as_str().to_string()),
            is_active: Set(user.is_active),
            created_at: Set(user.created_at.into()),
        }
        .insert(&self.orm)
        .await;

        match inserted {
            Ok(model) => Ok(user_from_entity(model)),
            Err(err) if is_unique_violation(&err) => {
                Err(AppError::BadRequest("Email is already taken".into()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn insert_project(&self, project: Project) -> AppResult<Project> {
        let model = project_active(&project).insert(&self.orm).await?;
        Ok(project_from_entity(model))
    }

    async fn update_project(&self, project: Project) -> AppResult<Project> {
        match project_active(&project).update(&self.orm).await {
            Ok(model) => Ok(project_from_entity(model)),
            Err(DbErr::RecordNotUpdated) => Err(AppError::NotFound),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_project(&self, id: Uuid) -> AppResult<Option<Project>> {
        let project = Projects::find_by_id(id).one(&self.orm).await?;
        Ok(project.map(project_from_entity))
    }

    async fn list_active_projects(&self) -> AppResult<Vec<Project>> {
        let projects = Projects::find()
            .filter(ProjectCol::IsActive.eq(true))
            .order_by_asc(ProjectCol::CreatedAt)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(project_from_entity)
            .collect();
        Ok(projects)
    }

    async fn find_membership(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Option<ProjectMembership>> {
        let member = ProjectMembers::find_by_id((project_id, user_id))
            .one(&self.orm)
            .await?;
        Ok(member.map(membership_from_entity))
    }

    async fn upsert_membership(
        &self,
        membership: ProjectMembership,
    ) -> AppResult<(ProjectMembership, bool)> {
        let key = (membership.project_id, membership.user_id);
        if let Some(existing) = ProjectMembers::find_by_id(key).one(&self.orm).await? {
            let mut active: MemberActive = existing.into();
            active.is_active = Set(true);
            active.role = Set(membership.role.as_str().to_string());
            let updated = active.update(&self.orm).await?;
            return Ok((membership_from_entity(updated), false));
        }

        let inserted = MemberActive {
            project_id: Set(membership.project_id),
            user_id: Set(membership.user_id),
            role: Set(membership.role.as_str().to_string()),
            is_active: Set(true),
            joined_at: Set(membership.joined_at.into()),
        }
        .insert(&self.orm)
        .await;

        match inserted {
            Ok(model) => Ok((membership_from_entity(model), true)),
            // A concurrent redemption created it first.
            Err(err) if is_unique_violation(&err) => {
                let model = ProjectMembers::find_by_id(key)
                    .one(&self.orm)
                    .await?
                    .ok_or(AppError::NotFound)?;
                Ok((membership_from_entity(model), false))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_active_regular_order_since(
        &self,
        user_id: Uuid,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<Option<Order>> {
        let order = Orders::find()
            .filter(
                Condition::all()
                    .add(OrderCol::UserId.eq(user_id))
                    .add(OrderCol::ProjectId.eq(project_id))
                    .add(OrderCol::OrderType.eq(REGULAR))
                    .add(OrderCol::Status.ne(CANCELLED))
                    .add(OrderCol::CreatedAt.gte(since)),
            )
            .order_by_asc(OrderCol::CreatedAt)
            .one(&self.orm)
            .await?;
        order.map(order_from_entity).transpose()
    }

    async fn insert_order(
        &self,
        order: OrderWithItems,
        quota_since: Option<DateTime<Utc>>,
    ) -> AppResult<InsertOutcome> {
        let txn = self.orm.begin().await?;

        if let (Some(since), Some(exception)) = (quota_since, &order.exception) {
            if exception.quota_used {
                // Serializes quota checks per user until the transaction ends.
                txn.execute(Statement::from_sql_and_values(
                    DbBackend::Postgres,
                    "SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))",
                    [exception.user_id.to_string().into()],
                ))
                .await?;
                let last = OrderExceptions::find()
                    .filter(
                        Condition::all()
                            .add(ExceptionCol::UserId.eq(exception.user_id))
                            .add(ExceptionCol::QuotaUsed.eq(true))
                            .add(ExceptionCol::CreatedAt.gte(since)),
                    )
                    .order_by_desc(ExceptionCol::CreatedAt)
                    .one(&txn)
                    .await?;
                if let Some(last) = last {
                    txn.rollback().await?;
                    return Ok(InsertOutcome::QuotaExhausted {
                        last_used_at: last.created_at.with_timezone(&Utc),
                    });
                }
            }
        }

        // The partial unique index `orders_one_regular_per_day` arbitrates concurrent inserts.
        let inserted = match order_active(&order.order).insert(&txn).await {
            Ok(model) => model,
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                let existing = Orders::find()
                    .filter(
                        Condition::all()
                            .add(OrderCol::UserId.eq(order.order.user_id))
                            .add(OrderCol::ProjectId.eq(order.order.project_id))
                            .add(OrderCol::OrderDay.eq(order.order.order_day))
                            .add(OrderCol::OrderType.eq(REGULAR))
                            .add(OrderCol::Status.ne(CANCELLED)),
                    )
                    .one(&self.orm)
                    .await?;
                return Ok(InsertOutcome::Duplicate {
                    existing_order_id: existing.map(|o| o.id),
                });
            }
            Err(err) => return Err(err.into()),
        };

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let model = OrderItemActive {
                id: Set(item.id),
                order_id: Set(inserted.id),
                menu_item_id: Set(item.menu_item_id),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                special_instructions: Set(item.special_instructions.clone()),
            }
            .insert(&txn)
            .await?;
            items.push(order_item_from_entity(model));
        }

        let exception = match &order.exception {
            Some(exception) => {
                let model = ExceptionActive {
                    id: Set(exception.id),
                    order_id: Set(inserted.id),
                    user_id: Set(exception.user_id),
                    exception_type: Set(exception.exception_type.as_str().to_string()),
                    requested_amount: Set(exception.requested_amount),
                    status: Set(exception.status.as_str().to_string()),
                    reason: Set(exception.reason.clone()),
                    quota_used: Set(exception.quota_used),
                    reviewed_by: Set(None),
                    reviewed_at: Set(None),
                    created_at: Set(exception.created_at.into()),
                }
                .insert(&txn)
                .await?;
                Some(exception_from_entity(model)?)
            }
            None => None,
        };

        txn.commit().await?;

        Ok(InsertOutcome::Inserted(OrderWithItems {
            order: order_from_entity(inserted)?,
            items,
            exception,
        }))
    }

    async fn find_order(&self, id: Uuid) -> AppResult<Option<OrderWithItems>> {
        let Some(order) = Orders::find_by_id(id).one(&self.orm).await? else {
            return Ok(None);
        };
        let items = OrderItems::find()
            .filter(OrderItemCol::OrderId.eq(order.id))
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_item_from_entity)
            .collect();
        let exception = OrderExceptions::find()
            .filter(ExceptionCol::OrderId.eq(order.id))
            .one(&self.orm)
            .await?
            .map(exception_from_entity)
            .transpose()?;

        Ok(Some(OrderWithItems {
            order: order_from_entity(order)?,
            items,
            exception,
        }))
    }

    async fn list_user_orders(
        &self,
        user_id: Uuid,
        filter: OrderListFilter,
    ) -> AppResult<(Vec<Order>, i64)> {
        let mut condition = Condition::all().add(OrderCol::UserId.eq(user_id));
        if let Some(status) = filter.status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }

        let mut finder = Orders::find().filter(condition);
        finder = if filter.newest_first {
            finder.order_by_desc(OrderCol::CreatedAt)
        } else {
            finder.order_by_asc(OrderCol::CreatedAt)
        };

        let total = finder.clone().count(&self.orm).await? as i64;

        let orders = finder
            .limit(filter.limit)
            .offset(filter.offset)
            .all(&self.orm)
            .await?
            .into_iter()
            .map(order_from_entity)
            .collect::<AppResult<Vec<_>>>()?;

        Ok((orders, total))
    }

    async fn transition_order(&self, transition: StatusTransition) -> AppResult<Option<Order>> {
        let at: sea_orm::prelude::DateTimeWithTimeZone = transition.at.into();
        let txn = self.orm.begin().await?;

        let mut update = Orders::update_many()
            .col_expr(OrderCol::Status, Expr::value(transition.to.as_str()))
            .col_expr(OrderCol::UpdatedAt, Expr::value(at))
            .filter(OrderCol::Id.eq(transition.order_id))
            .filter(OrderCol::Status.eq(transition.from.as_str()));
        if transition.to == OrderStatus::Delivered {
            update = update.col_expr(OrderCol::DeliveredAt, Expr::value(at));
        }
        if let Some(reason) = &transition.cancellation_reason {
            update = update.col_expr(OrderCol::CancellationReason, Expr::value(reason.clone()));
        }

        let result = update.exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Ok(None);
        }

        if let Some(status) = transition.exception_status {
            OrderExceptions::update_many()
                .col_expr(ExceptionCol::Status, Expr::value(status.as_str()))
                .col_expr(ExceptionCol::ReviewedBy, Expr::value(transition.actor))
                .col_expr(ExceptionCol::ReviewedAt, Expr::value(at))
                .filter(ExceptionCol::OrderId.eq(transition.order_id))
                .exec(&txn)
                .await?;
        }

        let model = Orders::find_by_id(transition.order_id)
            .one(&txn)
            .await?
            .ok_or(AppError::NotFound)?;
        txn.commit().await?;

        order_from_entity(model).map(Some)
    }

    async fn orders_snapshot(
        &self,
        project_id: Uuid,
        range: DateRange,
        status: Option<OrderStatus>,
    ) -> AppResult<Vec<OrderWithItems>> {
        let txn = self
            .orm
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await?;

        let mut condition = Condition::all()
            .add(OrderCol::ProjectId.eq(project_id))
            .add(OrderCol::Status.ne(CANCELLED))
            .add(OrderCol::CreatedAt.gte(range.from))
            .add(OrderCol::CreatedAt.lt(range.to));
        if let Some(status) = status {
            condition = condition.add(OrderCol::Status.eq(status.as_str()));
        }

        let orders = Orders::find()
            .filter(condition)
            .order_by_asc(OrderCol::CreatedAt)
            .all(&txn)
            .await?;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let (items, exceptions) = if ids.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let items = OrderItems::find()
                .filter(OrderItemCol::OrderId.is_in(ids.clone()))
                .all(&txn)
                .await?;
            let exceptions = OrderExceptions::find()
                .filter(ExceptionCol::OrderId.is_in(ids))
                .all(&txn)
                .await?;
            (items, exceptions)
        };

        txn.commit().await?;

        let mut items_by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
        for item in items {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(order_item_from_entity(item));
        }
        let mut exception_by_order: HashMap<Uuid, ExceptionModel> =
            exceptions.into_iter().map(|e| (e.order_id, e)).collect();

        orders
            .into_iter()
            .map(|model| {
                let id = model.id;
                Ok(OrderWithItems {
                    order: order_from_entity(model)?,
                    items: items_by_order.remove(&id).unwrap_or_default(),
                    exception: exception_by_order
                        .remove(&id)
                        .map(exception_from_entity)
                        .transpose()?,
                })
            })
            .collect()
    }

    async fn roster_snapshot(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> AppResult<RosterSnapshot> {
        let txn = self
            .orm
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await?;

        let active_members: Vec<Uuid> = ProjectMembers::find()
            .select_only()
            .column(MemberCol::UserId)
            .filter(MemberCol::ProjectId.eq(project_id))
            .filter(MemberCol::IsActive.eq(true))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        let ordered: Vec<Uuid> = Orders::find()
            .select_only()
            .column(OrderCol::UserId)
            .distinct()
            .filter(OrderCol::ProjectId.eq(project_id))
            .filter(OrderCol::Status.ne(CANCELLED))
            .filter(OrderCol::CreatedAt.gte(since))
            .into_tuple::<Uuid>()
            .all(&txn)
            .await?;

        txn.commit().await?;

        Ok(RosterSnapshot {
            active_members,
            users_with_orders: ordered.into_iter().collect(),
        })
    }

    async fn append_audit(&self, entry: AuditEntry) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, resource, metadata)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.resource)
        .bind(entry.metadata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn corrupt(column: &str, value: &str) -> AppError {
    AppError::Internal(anyhow::anyhow!("unexpected {column} value {value:?}"))
}

fn user_from_entity(model: UserModel) -> User {
    User {
        id: model.id,
        email: model.email,
        password_hash: model.password_hash,
        role: Role::parse_lossy(&model.role),
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn project_active(project: &Project) -> ProjectActive {
    ProjectActive {
        id: Set(project.id),
        name: Set(project.name.clone()),
        location: Set(project.location.clone()),
        start_date: Set(project.start_date.into()),
        order_window_minutes: Set(project.order_window_minutes),
        is_active: Set(project.is_active),
        created_at: Set(project.created_at.into()),
    }
}

fn project_from_entity(model: ProjectModel) -> Project {
    Project {
        id: model.id,
        name: model.name,
        location: model.location,
        start_date: model.start_date.with_timezone(&Utc),
        order_window_minutes: model.order_window_minutes,
        is_active: model.is_active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn membership_from_entity(model: MemberModel) -> ProjectMembership {
    ProjectMembership {
        project_id: model.project_id,
        user_id: model.user_id,
        role: Role::parse_lossy(&model.role),
        is_active: model.is_active,
        joined_at: model.joined_at.with_timezone(&Utc),
    }
}

fn order_active(order: &Order) -> OrderActive {
    OrderActive {
        id: Set(order.id),
        user_id: Set(order.user_id),
        project_id: Set(order.project_id),
        restaurant_id: Set(order.restaurant_id),
        order_type: Set(order.order_type.as_str().to_string()),
        status: Set(order.status.as_str().to_string()),
        total_amount: Set(order.total_amount),
        user_pay_amount: Set(order.user_pay_amount),
        exception_amount: Set(order.exception_amount),
        delivery_address: Set(order.delivery_address.clone()),
        delivery_lat: Set(order.delivery_lat),
        delivery_lng: Set(order.delivery_lng),
        order_day: Set(order.order_day),
        cancellation_reason: Set(order.cancellation_reason.clone()),
        created_at: Set(order.created_at.into()),
        updated_at: Set(order.updated_at.into()),
        delivered_at: Set(order.delivered_at.map(Into::into)),
    }
}

fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        project_id: model.project_id,
        restaurant_id: model.restaurant_id,
        order_type: OrderType::parse(&model.order_type)
            .map_err(|_| corrupt("order_type", &model.order_type))?,
        status: OrderStatus::from_stored(&model.status)
            .map_err(|_| corrupt("status", &model.status))?,
        total_amount: model.total_amount,
        user_pay_amount: model.user_pay_amount,
        exception_amount: model.exception_amount,
        delivery_address: model.delivery_address,
        delivery_lat: model.delivery_lat,
        delivery_lng: model.delivery_lng,
        order_day: model.order_day,
        cancellation_reason: model.cancellation_reason,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        delivered_at: model.delivered_at.map(|dt| dt.with_timezone(&Utc)),
    })
}

fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        menu_item_id: model.menu_item_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        special_instructions: model.special_instructions,
    }
}

fn exception_from_entity(model: ExceptionModel) -> AppResult<OrderException> {
    Ok(OrderException {
        id: model.id,
        order_id: model.order_id,
        user_id: model.user_id,
        exception_type: ExceptionType::parse(&model.exception_type)
            .map_err(|_| corrupt("exception_type", &model.exception_type))?,
        requested_amount: model.requested_amount,
        status: ExceptionStatus::parse(&model.status)
            .map_err(|_| corrupt("exception status", &model.status))?,
        reason: model.reason,
        quota_used: model.quota_used,
        reviewed_by: model.reviewed_by,
        reviewed_at: model.reviewed_at.map(|dt| dt.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
    })
}
