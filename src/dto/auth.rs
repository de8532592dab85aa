use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::Role;

/// Self-service sign-up always yields a `REGULAR` crew account.
#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Ready to send as the `Authorization` header value.
    pub token: String,
    pub user_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

/// Identity resolved from the bearer token.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user_id: Uuid,
    pub role: Role,
}

/// Bearer JWT claims. An unknown role fails decoding.
#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
}
