use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::webhook_verifier::WebhookVerifier,
};

type HmacSha256 = Hmac<Sha256>;

/// Verifies the gateway's `signature` header: hex HMAC-SHA256 of the raw body.
pub struct HmacWebhookVerifier {
    secret: Option<SecretString>,
    allow_unsigned: bool,
}

impl HmacWebhookVerifier {
    pub fn new(secret: Option<SecretString>, allow_unsigned: bool) -> Self {
        Self {
            secret,
            allow_unsigned,
        }
    }
}

impl WebhookVerifier for HmacWebhookVerifier {
    fn verify(&self, payload: &str, signature: Option<&str>) -> AppResult<()> {
        let Some(secret) = &self.secret else {
            if self.allow_unsigned {
                tracing::warn!("Webhook signature verification skipped (no secret configured)");
                return Ok(());
            }
            tracing::error!("Webhook secret not configured, refusing delivery");
            return Err(AppError::Configuration("webhook not configured".into()));
        };

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Missing signature".into()))?;
        let provided = hex::decode(signature)
            .map_err(|_| AppError::Unauthorized("Invalid signature".into()))?;

        let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| AppError::Unauthorized("Invalid signature".into()))
    }

    fn signature_required(&self) -> bool {
        self.secret.is_some()
    }
}

/// Compute the signature the gateway would send for `payload`.
pub fn sign_payload(secret: &str, payload: &str) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
