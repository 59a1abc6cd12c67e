use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{payment_gateway::GatewayWebhookEvent, webhook_verifier::WebhookVerifier},
        use_cases::reconciliation::{ReconcileSource, ReconciliationUseCases},
        validators::is_valid_checkout_id,
    },
    domain::entities::payment_status::PaymentStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEventKind {
    CheckoutPaid,
    CheckoutFailed,
    CheckoutCanceled,
    Unhandled,
}

impl WebhookEventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "checkout.paid" => Self::CheckoutPaid,
            "checkout.failed" => Self::CheckoutFailed,
            "checkout.canceled" | "checkout.cancelled" => Self::CheckoutCanceled,
            _ => Self::Unhandled,
        }
    }

    /// Gateway status implied by the event, whatever the payload says.
    fn implied_status(self) -> Option<&'static str> {
        match self {
            Self::CheckoutPaid => Some("paid"),
            Self::CheckoutFailed => Some("failed"),
            Self::CheckoutCanceled => Some("canceled"),
            Self::Unhandled => None,
        }
    }
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_type: String,
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PaymentStatus>,
}

#[derive(Clone)]
pub struct GatewayWebhookUseCases {
    reconciliation: Arc<ReconciliationUseCases>,
    verifier: Arc<dyn WebhookVerifier>,
}

impl GatewayWebhookUseCases {
    pub fn new(
        reconciliation: Arc<ReconciliationUseCases>,
        verifier: Arc<dyn WebhookVerifier>,
    ) -> Self {
        Self {
            reconciliation,
            verifier,
        }
    }

    pub fn signature_required(&self) -> bool {
        self.verifier.signature_required()
    }

    /// Authenticate, parse and apply one raw webhook delivery.
    #[instrument(skip(self, raw_body, signature), fields(body_len = raw_body.len()))]
    pub async fn handle_delivery(
        &self,
        raw_body: &str,
        signature: Option<&str>,
    ) -> AppResult<WebhookAck> {
        self.verifier.verify(raw_body, signature)?;

        let event: GatewayWebhookEvent = serde_json::from_str(raw_body).map_err(|e| {
            warn!(error = %e, "Rejecting malformed webhook payload");
            AppError::InvalidInput("Invalid webhook payload".into())
        })?;

        if !is_valid_checkout_id(&event.data.id) {
            return Err(AppError::InvalidInput("Invalid checkout id".into()));
        }

        self.handle_event(event).await
    }

    /// Route a verified event. Paid events run the same issuance path as polling.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type, checkout_id = %event.data.id))]
    pub async fn handle_event(&self, event: GatewayWebhookEvent) -> AppResult<WebhookAck> {
        let kind = WebhookEventKind::parse(&event.event_type);
        let Some(status) = kind.implied_status() else {
            info!("Ignoring unhandled webhook event type");
            return Ok(WebhookAck {
                received: true,
                event_type: event.event_type,
                handled: false,
                status: None,
            });
        };

        let mut checkout = event.data;
        checkout.status = status.to_string();

        let outcome = self
            .reconciliation
            .apply_gateway_report(&checkout, ReconcileSource::Webhook)
            .await?;

        info!(status = %outcome.status, "Webhook event applied");
        Ok(WebhookAck {
            received: true,
            event_type: event.event_type,
            handled: true,
            status: Some(outcome.status),
        })
    }
}
