//! HTTP client factory with consistent timeout configuration.
//!
//! Outbound clients (the payment gateway) are built here rather than with
//! `reqwest::Client::new()`, so a hung upstream never pins a poll request.

use reqwest::Client;
use std::time::Duration;

/// Connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total request/response time. A poll that exceeds this falls back to stored state.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub fn try_build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .build()
}
