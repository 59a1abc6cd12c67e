pub mod gateway_webhook;
pub mod reconciliation;
