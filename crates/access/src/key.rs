//! API key validation against the API gateway.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::{key_suffix, API_KEY_HEADER};

/// Verdict returned when an API key fails validation.
///
/// `status` mirrors the HTTP status the subscription handler should answer
/// with; `key_suffix` is the loggable tail of the offending key and must
/// never be echoed to the client.
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct KeyErr {
    pub msg: String,
    pub status: StatusCode,
    pub key_suffix: String,
    pub description: String,
}

impl KeyErr {
    pub fn new(msg: impl Into<String>, status: StatusCode, key_suffix: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            status,
            key_suffix: key_suffix.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Deserialize)]
struct GatewayError {
    #[serde(default)]
    error: String,
}

/// Validates API keys by calling the gateway's key-validation endpoint.
pub struct KeyProcessor {
    validation_url: String,
    client: reqwest::Client,
}

impl KeyProcessor {
    pub fn new(validation_url: String, client: reqwest::Client) -> Self {
        Self {
            validation_url,
            client,
        }
    }

    /// Validates the supplied key. An empty key is rejected without a round
    /// trip; otherwise the gateway's status decides.
    pub async fn validate(&self, key: &str) -> Result<(), KeyErr> {
        if key.is_empty() {
            return Err(KeyErr::new("Empty api key", StatusCode::UNAUTHORIZED, ""));
        }

        let suffix = key_suffix(key);
        tracing::info!(
            url = %self.validation_url,
            api_key_last_chars = suffix,
            "calling the API gateway to validate api key"
        );

        let resp = self
            .client
            .get(&self.validation_url)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|err| {
                tracing::error!(
                    url = %self.validation_url,
                    api_key_last_chars = suffix,
                    error = %err,
                    "cannot send request to the API gateway"
                );
                KeyErr::new(
                    "Request to validate api key failed",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    suffix,
                )
            })?;

        let status = resp.status();
        if status == StatusCode::OK {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let gateway_msg = serde_json::from_str::<GatewayError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);

        let msg = match status {
            StatusCode::UNAUTHORIZED => "Invalid api key",
            StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded",
            StatusCode::FORBIDDEN => "Operation forbidden",
            _ => "Request to validate api key returned an unexpected response",
        };
        tracing::error!(
            api_key_last_chars = suffix,
            status = status.as_u16(),
            gateway_message = %gateway_msg,
            "api key rejected by the API gateway"
        );

        Err(KeyErr::new(msg, status, suffix).with_description(gateway_msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_key_is_rejected_without_a_gateway_call() {
        let processor = KeyProcessor::new(
            "http://gateway.invalid/validate".to_string(),
            reqwest::Client::new(),
        );

        let err = processor.validate("").await.expect_err("empty key");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.msg, "Empty api key");
    }

    #[tokio::test]
    async fn unreachable_gateway_maps_to_internal_error() {
        let processor = KeyProcessor::new(
            // Reserved TLD, guaranteed to fail resolution.
            "http://gateway.invalid/validate".to_string(),
            reqwest::Client::new(),
        );

        let err = processor.validate("some-api-key").await.expect_err("no gateway");
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.key_suffix, "me-api-key");
    }
}
