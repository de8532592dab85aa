use serde::Deserialize;
use utoipa::ToSchema;

use crate::services::access_token::TokenType;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenRequest {
    pub token: String,
    pub expected_type: Option<TokenType>,
}
