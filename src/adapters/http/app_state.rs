use std::sync::Arc;

use crate::{
    infra::{config::AppConfig, rate_limit::RateLimiterTrait},
    use_cases::{gateway_webhook::GatewayWebhookUseCases, reconciliation::ReconciliationUseCases},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub reconciliation_use_cases: Arc<ReconciliationUseCases>,
    pub webhook_use_cases: Arc<GatewayWebhookUseCases>,
    pub rate_limiter: Arc<dyn RateLimiterTrait>,
}
