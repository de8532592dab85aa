//! Signed, time-limited access tokens for project entry and order tracking.
//!
//! The outer envelope is an HS256 JWT. Inside it, `hash` is an HMAC-SHA256 over the
//! canonical subject identifiers, keyed independently of the envelope signature, so a
//! validly signed envelope whose subject was swapped is still rejected.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    ProjectAccess,
    OrderTracking,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::ProjectAccess => "PROJECT_ACCESS",
            TokenType::OrderTracking => "ORDER_TRACKING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSubject {
    Project { project_id: Uuid },
    Order { order_id: Uuid, user_id: Uuid },
}

impl TokenSubject {
    pub fn token_type(&self) -> TokenType {
        match self {
            TokenSubject::Project { .. } => TokenType::ProjectAccess,
            TokenSubject::Order { .. } => TokenType::OrderTracking,
        }
    }

    /// Canonical byte string the integrity tag is computed over.
    fn canonical(&self) -> String {
        match self {
            TokenSubject::Project { project_id } => project_id.to_string(),
            TokenSubject::Order { order_id, user_id } => format!("{order_id}-{user_id}"),
        }
    }

    fn ids(&self) -> SubjectIds {
        match *self {
            TokenSubject::Project { project_id } => SubjectIds {
                project_id: Some(project_id),
                ..SubjectIds::default()
            },
            TokenSubject::Order { order_id, user_id } => SubjectIds {
                order_id: Some(order_id),
                user_id: Some(user_id),
                ..SubjectIds::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectIds {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub project_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessClaims {
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(flatten)]
    subject: SubjectIds,
    valid_until: DateTime<Utc>,
    hash: String,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub subject_type: TokenType,
    pub subject_ids: SubjectIds,
    pub generated_at: DateTime<Utc>,
}

/// What ends up encoded in a QR code or a link.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RedeemablePayload {
    pub token: String,
    pub metadata: TokenMetadata,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub payload: RedeemablePayload,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedToken {
    pub token_type: TokenType,
    pub subject_ids: SubjectIds,
    pub expires_at: DateTime<Utc>,
    pub remaining_seconds: i64,
}

impl ValidatedToken {
    pub fn project_id(&self) -> Option<Uuid> {
        self.subject_ids.project_id
    }

    /// `(order_id, user_id)` for order-tracking tokens.
    pub fn order_owner(&self) -> Option<(Uuid, Uuid)> {
        self.subject_ids.order_id.zip(self.subject_ids.user_id)
    }
}

#[derive(Clone)]
pub struct AccessTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    tag_key: Vec<u8>,
}

impl AccessTokenService {
    pub fn new(signing_secret: &str, tag_secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(signing_secret.as_bytes()),
            decoding: DecodingKey::from_secret(signing_secret.as_bytes()),
            tag_key: tag_secret.as_bytes().to_vec(),
        }
    }

    pub fn issue(
        &self,
        subject: TokenSubject,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AppResult<IssuedToken> {
        let valid_until = now + ttl;
        let claims = AccessClaims {
            token_type: subject.token_type(),
            subject: subject.ids(),
            valid_until,
            hash: self.integrity_tag(&subject)?,
            iat: now.timestamp(),
            exp: valid_until.timestamp(),
        };
        let token = self.seal(&claims)?;

        tracing::debug!(
            token_type = subject.token_type().as_str(),
            expires_at = %valid_until,
            "access token issued"
        );

        Ok(IssuedToken {
            payload: RedeemablePayload {
                token: token.clone(),
                metadata: TokenMetadata {
                    subject_type: subject.token_type(),
                    subject_ids: subject.ids(),
                    generated_at: now,
                },
            },
            token,
            expires_at: valid_until,
        })
    }

    pub fn validate(
        &self,
        token: &str,
        expected: Option<TokenType>,
        now: DateTime<Utc>,
    ) -> AppResult<ValidatedToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        // `valid_until` is checked against the caller's clock below.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let claims = decode::<AccessClaims>(token, &self.decoding, &validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "access token rejected");
                AppError::TokenMalformed
            })?
            .claims;

        let subject = subject_from_claims(&claims)?;

        if now > claims.valid_until {
            return Err(AppError::TokenExpired);
        }

        if let Some(expected) = expected {
            if expected != claims.token_type {
                return Err(AppError::TokenTypeMismatch {
                    expected: expected.as_str(),
                    actual: claims.token_type.as_str(),
                });
            }
        }

        if !self.verify_tag(&subject, &claims.hash)? {
            tracing::warn!(
                token_type = claims.token_type.as_str(),
                "access token integrity tag mismatch"
            );
            return Err(AppError::TokenTagMismatch);
        }

        Ok(ValidatedToken {
            token_type: claims.token_type,
            subject_ids: subject.ids(),
            expires_at: claims.valid_until,
            remaining_seconds: (claims.valid_until - now).num_seconds(),
        })
    }

    /// Accepts either the bare token or the JSON payload scanned from a QR code.
    pub fn validate_input(
        &self,
        input: &str,
        expected: Option<TokenType>,
        now: DateTime<Utc>,
    ) -> AppResult<ValidatedToken> {
        let token = extract_token(input)?;
        self.validate(&token, expected, now)
    }

    fn seal(&self, claims: &AccessClaims) -> AppResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    }

    fn mac(&self) -> AppResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.tag_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
    }

    fn integrity_tag(&self, subject: &TokenSubject) -> AppResult<String> {
        let mut mac = self.mac()?;
        mac.update(subject.canonical().as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify_tag(&self, subject: &TokenSubject, tag: &str) -> AppResult<bool> {
        let Ok(raw) = hex::decode(tag) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(subject.canonical().as_bytes());
        Ok(mac.verify_slice(&raw).is_ok())
    }
}

fn subject_from_claims(claims: &AccessClaims) -> AppResult<TokenSubject> {
    let ids = claims.subject;
    match claims.token_type {
        TokenType::ProjectAccess => ids
            .project_id
            .map(|project_id| TokenSubject::Project { project_id })
            .ok_or(AppError::TokenMalformed),
        TokenType::OrderTracking => match (ids.order_id, ids.user_id) {
            (Some(order_id), Some(user_id)) => Ok(TokenSubject::Order { order_id, user_id }),
            _ => Err(AppError::TokenMalformed),
        },
    }
}

/// Extracts the bare token from either a raw token or a JSON object with a `token` field.
pub fn extract_token(input: &str) -> AppResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::TokenMalformed);
    }
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(trimmed) {
            return match map.get("token").and_then(|t| t.as_str()) {
                Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
                _ => Err(AppError::TokenMalformed),
            };
        }
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AccessTokenService {
        AccessTokenService::new("envelope-secret", "tag-secret")
    }

    #[test]
    fn project_token_valid_within_ttl_and_expired_after() {
        let svc = service();
        let now = Utc::now();
        let project_id = Uuid::new_v4();
        let issued = svc
            .issue(TokenSubject::Project { project_id }, Duration::hours(24), now)
            .unwrap();

        let ok = svc
            .validate(&issued.token, Some(TokenType::ProjectAccess), now + Duration::hours(1))
            .unwrap();
        assert_eq!(ok.project_id(), Some(project_id));
        assert_eq!(ok.remaining_seconds, 23 * 3600);

        let err = svc
            .validate(&issued.token, None, now + Duration::hours(25))
            .unwrap_err();
        assert!(matches!(err, AppError::TokenExpired));
    }

    #[test]
    fn swapped_subject_fails_tag_check() {
        let svc = service();
        let now = Utc::now();
        let issued = svc
            .issue(
                TokenSubject::Order {
                    order_id: Uuid::new_v4(),
                    user_id: Uuid::new_v4(),
                },
                Duration::days(7),
                now,
            )
            .unwrap();

        let mut claims = decode::<AccessClaims>(&issued.token, &svc.decoding, &{
            let mut v = Validation::new(Algorithm::HS256);
            v.validate_exp = false;
            v
        })
        .unwrap()
        .claims;
        claims.subject.user_id = Some(Uuid::new_v4());
        let forged = svc.seal(&claims).unwrap();

        let err = svc.validate(&forged, None, now).unwrap_err();
        assert!(matches!(err, AppError::TokenTagMismatch));
    }

    #[test]
    fn tag_keyed_separately_from_envelope() {
        let now = Utc::now();
        let subject = TokenSubject::Project {
            project_id: Uuid::new_v4(),
        };
        let issued = service().issue(subject, Duration::hours(1), now).unwrap();
        let other_tag_key = AccessTokenService::new("envelope-secret", "rotated-tag-secret");
        let err = other_tag_key.validate(&issued.token, None, now).unwrap_err();
        assert!(matches!(err, AppError::TokenTagMismatch));
    }

    #[test]
    fn wrong_signature_is_malformed() {
        let now = Utc::now();
        let issued = service()
            .issue(
                TokenSubject::Project {
                    project_id: Uuid::new_v4(),
                },
                Duration::hours(1),
                now,
            )
            .unwrap();
        let other = AccessTokenService::new("another-secret", "tag-secret");
        assert!(matches!(
            other.validate(&issued.token, None, now).unwrap_err(),
            AppError::TokenMalformed
        ));
        assert!(matches!(
            service().validate("not-a-token", None, now).unwrap_err(),
            AppError::TokenMalformed
        ));
    }

    #[test]
    fn expected_type_is_enforced() {
        let svc = service();
        let now = Utc::now();
        let issued = svc
            .issue(
                TokenSubject::Project {
                    project_id: Uuid::new_v4(),
                },
                Duration::hours(1),
                now,
            )
            .unwrap();
        let err = svc
            .validate(&issued.token, Some(TokenType::OrderTracking), now)
            .unwrap_err();
        assert_eq!(err.code(), "TOKEN_TYPE_MISMATCH");
    }

    #[test]
    fn json_envelope_is_unwrapped() {
        let svc = service();
        let now = Utc::now();
        let issued = svc
            .issue(
                TokenSubject::Project {
                    project_id: Uuid::new_v4(),
                },
                Duration::hours(1),
                now,
            )
            .unwrap();
        let scanned = serde_json::to_string(&issued.payload).unwrap();
        assert!(svc.validate_input(&scanned, None, now).is_ok());
        assert!(matches!(
            extract_token("   ").unwrap_err(),
            AppError::TokenMalformed
        ));
        assert!(matches!(
            extract_token(r#"{"url":"x"}"#).unwrap_err(),
            AppError::TokenMalformed
        ));
    }
}
