use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit,
    dto::auth::{Claims, LoginRequest, LoginResponse, RegisterRequest},
    error::{AppError, AppResult},
    models::{Role, User},
    response::{ApiResponse, Meta},
    state::AppState,
};

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

const BEARER_TTL_HOURS: i64 = 24;

/// Signs a bearer token for `user_id` carrying its role.
pub fn issue_bearer(secret: &str, user_id: Uuid, role: Role) -> AppResult<LoginResponse> {
    let expires_at = Utc::now()
        .checked_add_signed(Duration::hours(BEARER_TTL_HOURS))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id,
        role,
        exp: expires_at.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?;

    Ok(LoginResponse {
        token: format!("Bearer {token}"),
        user_id,
        role,
        expires_at,
    })
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let RegisterRequest { email, password } = payload;
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.len() < 6 {
        return Err(AppError::BadRequest(
            "Email and a password of at least 6 characters are required".into(),
        ));
    }

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::BadRequest("Email is already taken".to_string()));
    }

    let user = state
        .store
        .insert_user(User {
            id: Uuid::new_v4(),
            email,
            password_hash: hash_password(&password)?,
            role: Role::Regular,
            is_active: true,
            created_at: Utc::now(),
        })
        .await?;

    audit::record(
        state.store.as_ref(),
        Some(user.id),
        "user_register",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id })),
    )
    .await;

    Ok(ApiResponse::success("User created", user, None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let LoginRequest { email, password } = payload;
    let user = state
        .store
        .find_user_by_email(&email.trim().to_lowercase())
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::BadRequest("Invalid email or password".into()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;

    if Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_err()
    {
        return Err(AppError::BadRequest("Invalid email or password".into()));
    }

    let resp = issue_bearer(&state.config.jwt_secret, user.id, user.role)?;

    audit::record(
        state.store.as_ref(),
        Some(user.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": user.id, "role": user.role.as_str() })),
    )
    .await;

    Ok(ApiResponse::success(
        "Logged in",
        resp,
        Some(Meta::empty()),
    ))
}
