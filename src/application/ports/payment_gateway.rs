use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{entitlement::is_valid_duration_days, payment_status::PaymentStatus},
};

// ============================================================================
// Port Types - gateway-agnostic checkout view
// ============================================================================

/// Metadata keys written into the checkout when it is created.
pub const META_CUSTOMER_EMAIL: &str = "customer_email";
pub const META_CUSTOMER_NAME: &str = "customer_name";
pub const META_DURATION_DAYS: &str = "duration_days";
pub const META_USER_ID: &str = "user_id";

/// Live state of one checkout as reported by the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub id: String,
    /// Raw gateway status string; see [`GatewayCheckout::payment_status`].
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Free-form metadata. Gateways send an object, `null`, or an empty array.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl GatewayCheckout {
    pub fn payment_status(&self) -> PaymentStatus {
        PaymentStatus::from_gateway_status(&self.status)
    }

    /// Read a metadata entry as a non-empty string. Numbers are accepted too.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        let value = self.metadata.as_object()?.get(key)?;
        let s = match value {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!s.is_empty()).then_some(s)
    }

    pub fn customer_email(&self) -> Option<String> {
        self.metadata_str(META_CUSTOMER_EMAIL)
            .map(|email| email.to_lowercase())
    }

    pub fn customer_name(&self) -> Option<String> {
        self.metadata_str(META_CUSTOMER_NAME)
    }

    /// Purchased access period. Values outside `1..=MAX_DURATION_DAYS` are ignored.
    pub fn duration_days(&self) -> Option<i32> {
        let raw = self.metadata_str(META_DURATION_DAYS)?;
        match raw.parse::<i32>() {
            Ok(days) if is_valid_duration_days(days) => Some(days),
            _ => {
                tracing::warn!(checkout_id = %self.id, duration_days = %raw, "Ignoring out-of-range duration_days in checkout metadata");
                None
            }
        }
    }

    /// Purchaser account id, present when the buyer was signed in at checkout.
    pub fn user_id(&self) -> Option<Uuid> {
        let raw = self.metadata_str(META_USER_ID)?;
        match Uuid::parse_str(&raw) {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(checkout_id = %self.id, user_id = %raw, "Ignoring malformed user_id in checkout metadata");
                None
            }
        }
    }
}

/// Event pushed by the gateway to the webhook endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: GatewayCheckout,
}

// ============================================================================
// Port Trait
// ============================================================================

/// Read-only view of the payment gateway.
///
/// Implementations may fail transiently; callers fall back to stored state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<GatewayCheckout>;
}
