use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use serde::Deserialize;
use tracing::warn;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::{
        use_cases::reconciliation::ReconciliationOutcome, validators::is_valid_checkout_id,
    },
};

pub fn router() -> Router<AppState> {
    Router::new().route("/status", get(get_payment_status))
}

#[derive(Deserialize)]
struct StatusQuery {
    checkout_id: Option<String>,
}

/// GET /api/payments/status?checkout_id=...
///
/// Polled by the checkout return page until the payment settles.
async fn get_payment_status(
    State(app_state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> AppResult<Json<ReconciliationOutcome>> {
    // Validate before any store, limiter or gateway access
    let checkout_id = query
        .checkout_id
        .filter(|id| is_valid_checkout_id(id))
        .ok_or_else(|| AppError::InvalidInput("Missing or invalid checkout_id".into()))?;

    let config = &app_state.config;
    let allowed = app_state
        .rate_limiter
        .allow(
            &format!("poll:{checkout_id}"),
            config.poll_rate_limit_max,
            config.poll_rate_limit_window_ms,
        )
        .await?;
    if !allowed {
        warn!(checkout_id = %checkout_id, "Payment status poll rate limited");
        return Err(AppError::RateLimited {
            retry_after_secs: config.poll_retry_after_secs(),
        });
    }

    let outcome = app_state
        .reconciliation_use_cases
        .reconcile(&checkout_id)
        .await?;

    Ok(Json(outcome))
}
