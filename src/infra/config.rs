use std::net::SocketAddr;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::{
    application::use_cases::reconciliation::ReconciliationSettings,
    domain::entities::entitlement::{MAX_DURATION_DAYS, is_valid_duration_days},
};

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    pub database_url: String,
    /// Shared rate-limit counters. The in-process limiter is used when unset.
    pub redis_url: Option<String>,
    pub poll_rate_limit_max: u64,
    pub poll_rate_limit_window_ms: u64,
    /// Gateway API secret. A `test_` prefix selects the gateway's test environment.
    pub gateway_secret_key: SecretString,
    /// Overrides the base URL derived from the secret key (e.g. a local stub).
    pub gateway_api_base: Option<Url>,
    pub gateway_webhook_secret: Option<SecretString>,
    /// Accept webhooks without a signature when no secret is configured.
    /// SECURITY: development only.
    pub allow_unsigned_webhooks: bool,
    pub default_duration_days: i32,
    pub online_sales_point_code: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default(
            "BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 3001)),
        );
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let database_url: String = get_env("DATABASE_URL");
        let redis_url = optional_env("REDIS_URL");
        let poll_rate_limit_max: u64 = get_env_default("POLL_RATE_LIMIT_MAX", 60);
        let poll_rate_limit_window_ms: u64 = get_env_default("POLL_RATE_LIMIT_WINDOW_MS", 60_000);

        let gateway_secret_key = SecretString::new(get_env::<String>("GATEWAY_SECRET_KEY").into());
        let gateway_api_base: Option<Url> = optional_env("GATEWAY_API_BASE")
            .map(|raw| raw.parse().expect("GATEWAY_API_BASE must be a valid URL"));
        let gateway_webhook_secret =
            optional_env("GATEWAY_WEBHOOK_SECRET").map(|s| SecretString::new(s.into()));
        // Default to false - unsigned webhooks must be an explicit choice
        let allow_unsigned_webhooks: bool = get_env_default("ALLOW_UNSIGNED_WEBHOOKS", false);

        let default_duration_days = checked_duration_days(get_env_default(
            "DEFAULT_DURATION_DAYS",
            365,
        ))
        .expect("DEFAULT_DURATION_DAYS out of range");
        let online_sales_point_code: String =
            get_env_default("ONLINE_SALES_POINT_CODE", "ONLINE".to_string());

        Self {
            bind_addr,
            cors_origin,
            database_url,
            redis_url,
            poll_rate_limit_max,
            poll_rate_limit_window_ms,
            gateway_secret_key,
            gateway_api_base,
            gateway_webhook_secret,
            allow_unsigned_webhooks,
            default_duration_days,
            online_sales_point_code,
        }
    }

    pub fn reconciliation_settings(&self) -> ReconciliationSettings {
        ReconciliationSettings {
            online_sales_point_code: self.online_sales_point_code.clone(),
            default_duration_days: self.default_duration_days,
        }
    }

    /// Seconds advertised in `Retry-After` for rate-limited polls (at least 1).
    pub fn poll_retry_after_secs(&self) -> u64 {
        self.poll_rate_limit_window_ms.div_ceil(1000).max(1)
    }
}

fn checked_duration_days(days: i32) -> Result<i32, String> {
    if is_valid_duration_days(days) {
        Ok(days)
    } else {
        Err(format!("{days} is not between 1 and {MAX_DURATION_DAYS}"))
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
