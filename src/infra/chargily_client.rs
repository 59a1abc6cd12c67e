use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::{InfraError, http_client::try_build_client};
use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_gateway::{GatewayCheckout, PaymentGateway},
};

const CHARGILY_LIVE_API_BASE: &str = "https://pay.chargily.net/api/v2/";
const CHARGILY_TEST_API_BASE: &str = "https://pay.chargily.net/test/api/v2/";

/// Chargily Pay V2 client, read-only: the reconciliation flow only looks up checkouts.
#[derive(Clone)]
pub struct ChargilyClient {
    client: Client,
    secret_key: SecretString,
    base_url: Url,
}

impl ChargilyClient {
    /// `base_url` overrides the environment implied by the key prefix.
    pub fn new(secret_key: SecretString, base_url: Option<Url>) -> Result<Self, InfraError> {
        let base_url = match base_url {
            Some(mut url) => {
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                url
            }
            None => Self::default_base_url(secret_key.expose_secret())?,
        };

        Ok(Self {
            client: try_build_client().map_err(InfraError::HttpClient)?,
            secret_key,
            base_url,
        })
    }

    /// Test-mode keys (`test_...`) talk to the sandbox.
    fn default_base_url(secret_key: &str) -> Result<Url, InfraError> {
        let raw = if secret_key.starts_with("test_") {
            CHARGILY_TEST_API_BASE
        } else {
            CHARGILY_LIVE_API_BASE
        };
        Url::parse(raw).map_err(|e| InfraError::Config(format!("invalid gateway URL: {e}")))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn checkout_url(&self, checkout_id: &str) -> AppResult<Url> {
        self.base_url
            .join(&format!("checkouts/{checkout_id}"))
            .map_err(|e| AppError::Internal(format!("Invalid checkout URL: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ChargilyErrorResponse {
    message: Option<String>,
}

#[async_trait]
impl PaymentGateway for ChargilyClient {
    async fn get_checkout(&self, checkout_id: &str) -> AppResult<GatewayCheckout> {
        let response = self
            .client
            .get(self.checkout_url(checkout_id)?)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(checkout_id, error = %e, "Chargily request failed");
                AppError::UpstreamUnavailable("gateway request failed".into())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::UpstreamUnavailable(format!("failed to read gateway response: {e}"))
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<ChargilyErrorResponse>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_default();
            tracing::warn!(checkout_id, status = %status, message = %message, "Chargily API error");
            return Err(AppError::UpstreamUnavailable(match status {
                StatusCode::NOT_FOUND => "checkout not found at gateway".to_string(),
                _ => format!("gateway returned {status}"),
            }));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(checkout_id, error = %e, "Failed to parse Chargily checkout");
            AppError::UpstreamUnavailable("unreadable gateway response".into())
        })
    }
}
