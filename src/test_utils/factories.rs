//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::{
    application::{
        activation_code::generate_activation_code,
        ports::payment_gateway::GatewayCheckout,
        use_cases::reconciliation::{ActivationKeyProfile, OnlinePaymentProfile},
    },
    domain::entities::{payment_source::PaymentSource, payment_status::PaymentStatus},
};

/// A fresh, well-formed checkout id (32 hex characters).
pub fn test_checkout_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Create a gateway checkout with the given raw gateway status.
pub fn create_test_checkout(
    checkout_id: &str,
    status: &str,
    overrides: impl FnOnce(&mut GatewayCheckout),
) -> GatewayCheckout {
    let mut checkout = GatewayCheckout {
        id: checkout_id.to_string(),
        status: status.to_string(),
        amount: 1000,
        currency: Some("dzd".to_string()),
        invoice_id: None,
        payment_method: Some("edahabia".to_string()),
        metadata: serde_json::json!({
            "customer_email": "buyer@example.com",
            "customer_name": "Test Buyer",
        }),
    };
    overrides(&mut checkout);
    checkout
}

/// Create a pending, unlinked payment row.
pub fn create_test_payment(
    checkout_id: &str,
    overrides: impl FnOnce(&mut OnlinePaymentProfile),
) -> OnlinePaymentProfile {
    let mut payment = OnlinePaymentProfile {
        id: Uuid::new_v4(),
        checkout_id: checkout_id.to_string(),
        status: PaymentStatus::Pending,
        customer_email: "buyer@example.com".to_string(),
        customer_name: Some("Test Buyer".to_string()),
        amount: 1000,
        currency: "dzd".to_string(),
        duration_days: 365,
        activation_key_id: None,
        user_id: None,
        invoice_id: None,
        payment_method: None,
        paid_at: None,
        created_at: Some(test_datetime()),
        updated_at: Some(test_datetime()),
    };
    overrides(&mut payment);
    payment
}

/// Create an unused online activation key with no checkout attribution.
pub fn create_test_key(overrides: impl FnOnce(&mut ActivationKeyProfile)) -> ActivationKeyProfile {
    let mut key = ActivationKeyProfile {
        id: Uuid::new_v4(),
        key_code: generate_activation_code(),
        duration_days: 365,
        payment_source: PaymentSource::Online,
        sales_point_id: None,
        price_paid: 1000,
        is_used: false,
        used_by: None,
        used_at: None,
        expires_at: None,
        payment_id: None,
        source_checkout_id: None,
        notes: None,
        created_at: Some(test_datetime()),
    };
    overrides(&mut key);
    key
}

pub fn test_datetime() -> NaiveDateTime {
    chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}
