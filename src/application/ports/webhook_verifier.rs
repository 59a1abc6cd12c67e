use crate::app_error::AppResult;

/// Authenticity check for webhook deliveries.
///
/// The signature scheme belongs to the gateway; the application only asks
/// whether a raw body and its signature header belong together.
pub trait WebhookVerifier: Send + Sync {
    /// Returns `Err(AppError::Unauthorized)` if the delivery must be rejected.
    fn verify(&self, payload: &str, signature: Option<&str>) -> AppResult<()>;

    /// Whether deliveries without a signature are refused.
    fn signature_required(&self) -> bool;
}
