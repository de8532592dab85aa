use std::env;
use std::str::FromStr;

use anyhow::Context;
use chrono::{Duration, FixedOffset, Offset, Utc};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_secret: String,
    pub access_tag_secret: String,
    pub project_token_ttl_hours: i64,
    pub tracking_token_ttl_hours: i64,
    pub regular_meal_budget: i64,
    pub exception_quota_days: i64,
    pub order_day_utc_offset_minutes: i32,
    pub reminder_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("APP_PORT", 3000);
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let access_token_secret =
            env::var("ACCESS_TOKEN_SECRET").context("ACCESS_TOKEN_SECRET is not set")?;
        let access_tag_secret =
            env::var("ACCESS_TAG_SECRET").unwrap_or_else(|_| access_token_secret.clone());
        let order_day_utc_offset_minutes: i32 = parse_or("ORDER_DAY_UTC_OFFSET_MINUTES", 0);
        if order_day_utc_offset_minutes.abs() >= 24 * 60 {
            anyhow::bail!("ORDER_DAY_UTC_OFFSET_MINUTES must be within one day");
        }
        let project_token_ttl_hours = ttl_hours("PROJECT_TOKEN_TTL_HOURS", 24)?;
        let tracking_token_ttl_hours = ttl_hours("TRACKING_TOKEN_TTL_HOURS", 24 * 7)?;
        let exception_quota_days: i64 = parse_or("EXCEPTION_QUOTA_DAYS", 21);
        if !(1..=MAX_QUOTA_DAYS).contains(&exception_quota_days) {
            anyhow::bail!("EXCEPTION_QUOTA_DAYS must be between 1 and {MAX_QUOTA_DAYS}");
        }

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret,
            access_token_secret,
            access_tag_secret,
            project_token_ttl_hours,
            tracking_token_ttl_hours,
            regular_meal_budget: parse_or("REGULAR_MEAL_BUDGET", 50),
            exception_quota_days,
            order_day_utc_offset_minutes,
            reminder_interval_secs: parse_or("REMINDER_INTERVAL_SECS", 900),
        })
    }

    /// Offset used to decide which calendar day an order belongs to.
    pub fn order_day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.order_day_utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn project_token_ttl(&self) -> Duration {
        Duration::hours(self.project_token_ttl_hours)
    }

    pub fn tracking_token_ttl(&self) -> Duration {
        Duration::hours(self.tracking_token_ttl_hours)
    }

    /// Look-back window for quota-consuming exception orders.
    pub fn exception_quota_window(&self) -> Duration {
        Duration::days(self.exception_quota_days)
    }
}

/// Ten years; keeps `Duration::hours` far from its range limit.
const MAX_TTL_HOURS: i64 = 24 * 366 * 10;
const MAX_QUOTA_DAYS: i64 = 366;

fn ttl_hours(key: &str, default: i64) -> anyhow::Result<i64> {
    check_ttl(key, parse_or(key, default))
}

fn check_ttl(key: &str, hours: i64) -> anyhow::Result<i64> {
    if !(1..=MAX_TTL_HOURS).contains(&hours) {
        anyhow::bail!("{key} must be between 1 and {MAX_TTL_HOURS} hours");
    }
    Ok(hours)
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_day_offset_is_in_minutes() {
        let config = AppConfig {
            database_url: String::new(),
            host: "127.0.0.1".into(),
            port: 0,
            jwt_secret: "jwt".into(),
            access_token_secret: "access".into(),
            access_tag_secret: "tag".into(),
            project_token_ttl_hours: 24,
            tracking_token_ttl_hours: 24,
            regular_meal_budget: 50,
            exception_quota_days: 21,
            order_day_utc_offset_minutes: 180,
            reminder_interval_secs: 0,
        };
        assert_eq!(config.order_day_offset().local_minus_utc(), 3 * 3600);
        assert_eq!(config.exception_quota_window(), Duration::days(21));
    }

    #[test]
    fn token_ttl_must_be_positive_and_bounded() {
        assert_eq!(check_ttl("PROJECT_TOKEN_TTL_HOURS", 24).unwrap(), 24);
        assert!(check_ttl("PROJECT_TOKEN_TTL_HOURS", 0).is_err());
        assert!(check_ttl("PROJECT_TOKEN_TTL_HOURS", -5).is_err());
        assert!(check_ttl("TRACKING_TOKEN_TTL_HOURS", i64::MAX).is_err());
    }
}
