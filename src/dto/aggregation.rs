use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::OrderStatus;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemRollup {
    pub menu_item_id: Uuid,
    pub quantity: i64,
    pub total_amount: i64,
    /// Number of orders containing this item.
    pub orders_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantGroup {
    pub restaurant_id: Uuid,
    pub orders_count: i64,
    pub total_amount: i64,
    pub items: Vec<ItemRollup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusBreakdown {
    pub status: OrderStatus,
    pub orders_count: i64,
    pub total_amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RestaurantAggregation {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub total_orders: i64,
    pub total_amount: i64,
    pub average_order_value: f64,
    pub restaurants: Vec<RestaurantGroup>,
    pub by_status: Vec<StatusBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub project_id: Uuid,
    pub from: NaiveDate,
    /// Inclusive.
    pub to: NaiveDate,
    pub total_orders: i64,
    pub total_revenue: i64,
    pub average_order_value: f64,
    pub by_status: Vec<StatusBreakdown>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsersWithoutOrders {
    pub project_id: Uuid,
    pub date: NaiveDate,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReminderReport {
    pub project_id: Uuid,
    pub date: NaiveDate,
    /// Users notified by this call.
    pub notified: Vec<Uuid>,
    /// Users already reminded earlier today.
    pub already_reminded: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}
