use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{
    dto::auth::Claims,
    error::AppError,
    models::Role,
    permissions::{self, Action},
    state::AppState,
};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn ensure(&self, action: Action) -> Result<(), AppError> {
        permissions::ensure(self.role, action)
    }

    pub fn can(&self, action: Action) -> bool {
        permissions::allows(self.role, action)
    }

    /// Resolves a raw bearer JWT (without the `Bearer ` prefix).
    pub fn from_bearer(token: &str, secret: &str) -> Result<Self, AppError> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

        Ok(AuthUser {
            user_id: decoded.claims.sub,
            role: decoded.claims.role,
        })
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;

        AuthUser::from_bearer(token, &state.config.jwt_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth_service::issue_bearer;

    #[test]
    fn bearer_round_trips_the_typed_role() {
        let user_id = Uuid::new_v4();
        let issued = issue_bearer("secret", user_id, Role::Producer).unwrap();
        assert_eq!(issued.role, Role::Producer);

        let raw = issued.token.strip_prefix("Bearer ").unwrap();
        let user = AuthUser::from_bearer(raw, "secret").unwrap();
        assert_eq!(user.user_id, user_id);
        assert_eq!(user.role, Role::Producer);
        assert!(user.can(Action::ViewAggregation));
    }

    #[test]
    fn bearer_signed_with_another_secret_is_rejected() {
        let issued = issue_bearer("secret", Uuid::new_v4(), Role::Regular).unwrap();
        let raw = issued.token.strip_prefix("Bearer ").unwrap();
        let err = AuthUser::from_bearer(raw, "other").unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn unknown_role_claim_is_rejected() {
        use jsonwebtoken::{EncodingKey, Header, encode};

        let claims = serde_json::json!({
            "sub": Uuid::new_v4(),
            "role": "SUPERUSER",
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        let raw = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"secret")).unwrap();
        assert!(AuthUser::from_bearer(&raw, "secret").is_err());
    }
}
