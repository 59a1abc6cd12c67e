use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use serde::Serialize;

use crate::{
    adapters::http::app_state::AppState, app_error::AppResult,
    use_cases::gateway_webhook::WebhookAck,
};

/// Header carrying the hex HMAC of the raw body.
const SIGNATURE_HEADER: &str = "signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/gateway", post(receive_gateway_webhook).get(webhook_health))
}

/// POST /api/webhooks/gateway
///
/// Processing failures surface as 5xx so the gateway redelivers.
async fn receive_gateway_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let ack = app_state
        .webhook_use_cases
        .handle_delivery(&body, signature)
        .await?;

    Ok(Json(ack))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookHealth {
    status: &'static str,
    signature_required: bool,
}

async fn webhook_health(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(WebhookHealth {
        status: "ok",
        signature_required: app_state.webhook_use_cases.signature_required(),
    })
}
