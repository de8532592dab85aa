use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    models::{Order, OrderType, OrderWithItems},
    services::access_token::IssuedToken,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub menu_item_id: Uuid,
    pub quantity: i32,
    /// Unit price in minor currency units.
    pub price: i64,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Must match the authenticated caller when present.
    pub user_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub restaurant_id: Uuid,
    /// Defaults to `REGULAR`.
    pub order_type: Option<OrderType>,
    pub exception_type: Option<String>,
    pub exception_reason: Option<String>,
    pub items: Vec<OrderItemRequest>,
    pub delivery_address: Option<String>,
    pub delivery_lat: Option<f64>,
    pub delivery_lng: Option<f64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrder {
    #[serde(flatten)]
    pub order: OrderWithItems,
    /// Issued for regular orders only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking: Option<IssuedToken>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrackOrderRequest {
    /// Bare token or the JSON payload scanned from the QR code.
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackedOrder {
    #[serde(flatten)]
    pub order: OrderWithItems,
    pub token_expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<Order>,
}
