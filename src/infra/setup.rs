use crate::{
    adapters::http::app_state::AppState,
    infra::{
        chargily_client::ChargilyClient,
        config::AppConfig,
        postgres_persistence,
        rate_limit::{InMemoryRateLimiter, RateLimiterTrait, RedisRateLimiter},
        webhook_signature::HmacWebhookVerifier,
    },
    use_cases::{gateway_webhook::GatewayWebhookUseCases, reconciliation::ReconciliationUseCases},
};
use std::fs::File;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let rate_limiter: Arc<dyn RateLimiterTrait> = match &config.redis_url {
        Some(redis_url) => {
            info!("Using Redis rate limiter");
            Arc::new(RedisRateLimiter::new(redis_url).await?)
        }
        None => {
            warn!("REDIS_URL not set, poll rate limits are per instance");
            Arc::new(InMemoryRateLimiter::new())
        }
    };

    let gateway = Arc::new(ChargilyClient::new(
        config.gateway_secret_key.clone(),
        config.gateway_api_base.clone(),
    )?);
    info!(base_url = %gateway.base_url(), "Payment gateway configured");

    if config.gateway_webhook_secret.is_none() && config.allow_unsigned_webhooks {
        warn!("GATEWAY_WEBHOOK_SECRET not set, accepting unsigned webhooks");
    }
    let verifier = Arc::new(HmacWebhookVerifier::new(
        config.gateway_webhook_secret.clone(),
        config.allow_unsigned_webhooks,
    ));

    let reconciliation_use_cases = Arc::new(ReconciliationUseCases::new(
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc.clone(),
        postgres_arc,
        gateway,
        config.reconciliation_settings(),
    ));
    let webhook_use_cases = Arc::new(GatewayWebhookUseCases::new(
        reconciliation_use_cases.clone(),
        verifier,
    ));

    Ok(AppState {
        config: Arc::new(config),
        reconciliation_use_cases,
        webhook_use_cases,
        rate_limiter,
    })
}

pub fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "medexam_billing=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs)
    let file = File::create("app.log")?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
    Ok(())
}
