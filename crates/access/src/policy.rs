//! Subscription policy lookup.
//!
//! The gateway exposes the x-policies attached to an API key as a loosely
//! formatted document; the policy names are extracted with a regex rather
//! than a full parse, matching the gateway's contract.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use thiserror::Error;

use crate::{key_suffix, API_KEY_HEADER};

const ADVANCED_NOTIFICATIONS_POLICY: &str = "ADVANCED_NOTIFICATIONS";
const INTERNAL_UNSTABLE_POLICY: &str = "INTERNAL_UNSTABLE";

static X_POLICIES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"['"]x-policy['"]\s*:\s*['"](.*)?['"]"#).expect("x-policy pattern"));

/// Per-subscriber delivery options derived from the key's x-policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    /// CREATE notifications pass through instead of being downgraded to UPDATE.
    pub receive_advanced_notifications: bool,
    /// RELATEDCONTENT notifications are delivered.
    pub receive_internal_unstable: bool,
}

/// Failure while fetching or decoding x-policies.
#[derive(Debug, Error)]
#[error("{msg}")]
pub struct PolicyErr {
    pub msg: String,
    pub status: StatusCode,
    pub key_suffix: String,
    pub description: String,
}

impl PolicyErr {
    fn new(msg: impl Into<String>, status: StatusCode, key_suffix: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            status,
            key_suffix: key_suffix.into(),
            description: String::new(),
        }
    }

    fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Looks up the x-policies of an API key and folds them into
/// [`SubscriptionOptions`].
pub struct PolicyProcessor {
    policies_url: String,
    client: reqwest::Client,
}

impl PolicyProcessor {
    pub fn new(policies_url: String, client: reqwest::Client) -> Self {
        Self {
            policies_url,
            client,
        }
    }

    pub async fn subscription_options(&self, key: &str) -> Result<SubscriptionOptions, PolicyErr> {
        let policies = self.x_policies(key).await?;
        Ok(options_from_policies(&policies))
    }

    async fn x_policies(&self, key: &str) -> Result<Vec<String>, PolicyErr> {
        if key.is_empty() {
            // Policies are only requested after key validation.
            return Err(PolicyErr::new(
                "Empty api key used to get X-Policies",
                StatusCode::UNAUTHORIZED,
                "",
            ));
        }

        let suffix = key_suffix(key);
        let resp = self
            .client
            .get(&self.policies_url)
            .header(API_KEY_HEADER, key)
            .send()
            .await
            .map_err(|err| {
                PolicyErr::new(
                    "Request to get X-Policies assigned to API key failed",
                    StatusCode::INTERNAL_SERVER_ERROR,
                    suffix,
                )
                .with_description(err.to_string())
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|err| {
            PolicyErr::new(
                "Reading X-Policies assigned to API key failed",
                StatusCode::INTERNAL_SERVER_ERROR,
                suffix,
            )
            .with_description(err.to_string())
        })?;

        if status != StatusCode::OK {
            let msg = if status == StatusCode::NOT_FOUND {
                "X-Policies assigned to API key not found"
            } else {
                "Request to get X-Policies assigned to API key returned an unexpected response"
            };
            return Err(PolicyErr::new(msg, status, suffix).with_description(body));
        }

        extract_policies(&body).ok_or_else(|| {
            PolicyErr::new(
                "Decoding X-Policies assigned to API key failed",
                StatusCode::INTERNAL_SERVER_ERROR,
                suffix,
            )
        })
    }
}

fn extract_policies(body: &str) -> Option<Vec<String>> {
    let captures = X_POLICIES_PATTERN.captures(body)?;
    let raw = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    Some(
        raw.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn options_from_policies(policies: &[String]) -> SubscriptionOptions {
    SubscriptionOptions {
        receive_advanced_notifications: policies
            .iter()
            .any(|p| p == ADVANCED_NOTIFICATIONS_POLICY),
        receive_internal_unstable: policies.iter().any(|p| p == INTERNAL_UNSTABLE_POLICY),
    }
}
