//! Shared HTTP helpers for provider clients.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{ProviderError, ProviderResult};

/// Build an HTTP client with the given request timeout.
pub(crate) fn build_client(timeout: Duration) -> ProviderResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ProviderError::Network)
}

/// API key, or an `Unconfigured` error naming the provider.
pub(crate) fn require_key<'a>(key: &'a Option<String>, provider: &str) -> ProviderResult<&'a str> {
    key.as_deref()
        .ok_or_else(|| ProviderError::unconfigured(provider))
}

/// Map transport errors, turning reqwest timeouts into `Timeout`.
pub(crate) fn send_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Network(e)
    }
}

/// Pass through successful responses, classify the rest by status.
pub(crate) async fn check_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(500).collect();
    Err(ProviderError::from_http_status(status.as_u16(), body))
}
