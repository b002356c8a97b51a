//! Service configuration.
//!
//! Settings load from an optional `notifications-push` file source, with
//! `NOTIFICATIONS_PUSH`-prefixed environment variables overriding it
//! (`NOTIFICATIONS_PUSH_KAFKA_ADDRESS`). Everything has a
//! default so a bare environment starts against local dependencies.
//! Startup-time validation compiles the allow-list regex and parses the
//! gateway URLs; failures there are fatal.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid content uri allowlist: {0}")]
    UriAllowlist(#[from] regex::Error),

    #[error("invalid url for {name}: {message}")]
    Url { name: &'static str, message: String },

    #[error("invalid listen address: {0}")]
    ListenAddr(#[from] std::net::AddrParseError),

    #[error("{0}")]
    Validation(String),
}

/// Service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Resource of which notifications are produced (e.g. content or lists).
    #[serde(default = "default_resource")]
    pub resource: String,

    /// Kafka bootstrap servers.
    #[serde(default = "default_kafka_address")]
    pub kafka_address: String,

    /// Kafka topic to read from.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Kafka consumer group id.
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    /// Tolerated consumer lag, in messages, before the lag check warns.
    #[serde(default = "default_kafka_lag_tolerance")]
    pub kafka_lag_tolerance: i64,

    /// API base URL where resources are accessible.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// API gateway endpoint validating subscriber keys.
    #[serde(default = "default_api_key_validation_endpoint")]
    pub api_key_validation_endpoint: String,

    /// API gateway endpoint exposing the x-policies of a key.
    #[serde(default = "default_api_policies_endpoint")]
    pub api_policies_endpoint: String,

    /// API gateway good-to-go endpoint probed by the health check.
    #[serde(default = "default_api_gateway_gtg_endpoint")]
    pub api_gateway_gtg_endpoint: String,

    /// Server bind address.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of recent notifications kept for the history endpoint.
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Delay applied to each notification before forwarding, in seconds.
    #[serde(default = "default_notifications_delay_secs")]
    pub notifications_delay_secs: u64,

    /// Idle period between heartbeats on a push stream, in seconds.
    #[serde(default = "default_heartbeat_period_secs")]
    pub heartbeat_period_secs: u64,

    /// Regex allow-list for content URIs of incoming events.
    #[serde(default = "default_content_uri_allowlist")]
    pub content_uri_allowlist: String,

    /// Allow-listed content types for incoming events.
    #[serde(default = "default_content_type_allowlist")]
    pub content_type_allowlist: Vec<String>,

    /// Origin systems accepted for annotation events.
    #[serde(default = "default_origin_allowlist")]
    pub origin_allowlist: Vec<String>,

    /// Whether the annotations pipeline is enabled.
    #[serde(default = "default_true")]
    pub annotations_enabled: bool,

    /// UUIDs marking end-to-end test transactions.
    #[serde(default)]
    pub e2e_test_ids: Vec<String>,

    /// Notification type URI used for plain updates.
    #[serde(default = "default_update_event_type")]
    pub update_event_type: String,

    /// Whether notifications carry the standout.scoop block.
    #[serde(default = "default_true")]
    pub include_scoop: bool,

    /// Types accepted in the `type` query parameter.
    #[serde(default = "default_supported_subscription_types")]
    pub supported_subscription_types: Vec<String>,

    /// Expansion of the `All` pseudo-type.
    #[serde(default = "default_all_subscription_types")]
    pub all_subscription_types: Vec<String>,

    /// Subscription type used when the client supplies none.
    #[serde(default = "default_subscription_type")]
    pub default_subscription_type: String,

    /// Editorial desks denied to standard consumers.
    #[serde(default)]
    pub blocked_editorial_desks: Vec<String>,

    /// Publication UUIDs deliverable to standard consumers; empty allows all.
    #[serde(default)]
    pub allowed_publications: Vec<String>,

    /// Log level / env-filter directive.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            kafka_address: default_kafka_address(),
            topic: default_topic(),
            consumer_group: default_consumer_group(),
            kafka_lag_tolerance: default_kafka_lag_tolerance(),
            api_base_url: default_api_base_url(),
            api_key_validation_endpoint: default_api_key_validation_endpoint(),
            api_policies_endpoint: default_api_policies_endpoint(),
            api_gateway_gtg_endpoint: default_api_gateway_gtg_endpoint(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            history_size: default_history_size(),
            notifications_delay_secs: default_notifications_delay_secs(),
            heartbeat_period_secs: default_heartbeat_period_secs(),
            content_uri_allowlist: default_content_uri_allowlist(),
            content_type_allowlist: default_content_type_allowlist(),
            origin_allowlist: default_origin_allowlist(),
            annotations_enabled: true,
            e2e_test_ids: Vec::new(),
            update_event_type: default_update_event_type(),
            include_scoop: true,
            supported_subscription_types: default_supported_subscription_types(),
            all_subscription_types: default_all_subscription_types(),
            default_subscription_type: default_subscription_type(),
            blocked_editorial_desks: Vec::new(),
            allowed_publications: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the optional file source and environment
    /// overrides.
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("notifications-push").required(false))
            .add_source(config::Environment::with_prefix("NOTIFICATIONS_PUSH").separator("__"));

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Startup validation; bad values here are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.uri_allowlist()?;
        self.socket_addr()?;
        parse_url("api_key_validation_endpoint", &self.api_key_validation_endpoint)?;
        parse_url("api_policies_endpoint", &self.api_policies_endpoint)?;
        parse_url("api_gateway_gtg_endpoint", &self.api_gateway_gtg_endpoint)?;

        if self.history_size == 0 {
            return Err(ConfigError::Validation(
                "history_size must be >= 1".to_string(),
            ));
        }
        if self.heartbeat_period_secs == 0 {
            return Err(ConfigError::Validation(
                "heartbeat_period_secs must be >= 1".to_string(),
            ));
        }
        if self.default_subscription_type.is_empty() {
            return Err(ConfigError::Validation(
                "default_subscription_type must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The compiled content URI allow-list.
    pub fn uri_allowlist(&self) -> Result<Regex, ConfigError> {
        Ok(Regex::new(&self.content_uri_allowlist)?)
    }

    pub fn content_type_allowlist(&self) -> HashSet<String> {
        self.content_type_allowlist.iter().cloned().collect()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(format!("{}:{}", self.bind_addr, self.port).parse()?)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.notifications_delay_secs)
    }

    pub fn heartbeat_period(&self) -> Duration {
        Duration::from_secs(self.heartbeat_period_secs)
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|err| ConfigError::Url {
        name,
        message: err.to_string(),
    })
}

fn default_resource() -> String {
    "content".to_string()
}

fn default_kafka_address() -> String {
    "localhost:9092".to_string()
}

fn default_topic() -> String {
    "PostPublicationEvents".to_string()
}

fn default_consumer_group() -> String {
    "notifications-push".to_string()
}

fn default_kafka_lag_tolerance() -> i64 {
    120
}

fn default_api_base_url() -> String {
    "http://api.ft.com".to_string()
}

fn default_api_key_validation_endpoint() -> String {
    "http://localhost:8080/api-gateway/validate".to_string()
}

fn default_api_policies_endpoint() -> String {
    "http://localhost:8080/api-gateway/policies".to_string()
}

fn default_api_gateway_gtg_endpoint() -> String {
    "http://localhost:8080/api-gateway/__gtg".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_history_size() -> usize {
    200
}

fn default_notifications_delay_secs() -> u64 {
    30
}

fn default_heartbeat_period_secs() -> u64 {
    30
}

fn default_content_uri_allowlist() -> String {
    r"^http://(methode|wordpress|content|upp)-(article|collection|content-placeholder|content)-(mapper|unfolder|validator)(-pr|-iw)?(-uk-.*)?\.svc\.ft\.com(:\d{2,5})?/(content|complementarycontent)/[\w-]+.*$".to_string()
}

fn default_content_type_allowlist() -> Vec<String> {
    vec![
        "application/vnd.ft-upp-article+json".to_string(),
        "application/vnd.ft-upp-audio+json".to_string(),
        "application/vnd.ft-upp-content-package+json".to_string(),
        "application/vnd.ft-upp-live-blog-post+json".to_string(),
        "application/vnd.ft-upp-live-blog-package+json".to_string(),
        "application/vnd.ft-upp-page+json".to_string(),
        "application/vnd.ft-upp-list+json".to_string(),
    ]
}

fn default_origin_allowlist() -> Vec<String> {
    vec!["http://cmdb.ft.com/systems/pac".to_string()]
}

fn default_update_event_type() -> String {
    "http://www.ft.com/thing/ThingChangeType/UPDATE".to_string()
}

fn default_supported_subscription_types() -> Vec<String> {
    vec![
        "Article".to_string(),
        "ContentPackage".to_string(),
        "Audio".to_string(),
        "LiveBlogPost".to_string(),
        "LiveBlogPackage".to_string(),
        "Page".to_string(),
        "List".to_string(),
        "Annotations".to_string(),
        "All".to_string(),
    ]
}

fn default_all_subscription_types() -> Vec<String> {
    vec![
        "Article".to_string(),
        "ContentPackage".to_string(),
        "Audio".to_string(),
    ]
}

fn default_subscription_type() -> String {
    "Article".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let cfg = AppConfig::default();
        cfg.validate().expect("defaults are valid");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.history_size, 200);
        assert_eq!(cfg.notifications_delay_secs, 30);
        assert_eq!(cfg.default_subscription_type, "Article");
    }

    #[test]
    fn bad_allowlist_regex_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.content_uri_allowlist = "[unclosed".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::UriAllowlist(_))));
    }

    #[test]
    fn bad_gateway_url_is_fatal() {
        let mut cfg = AppConfig::default();
        cfg.api_key_validation_endpoint = "not a url".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::Url { .. })));
    }

    #[test]
    fn zero_history_size_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.history_size = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn durations_derive_from_seconds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.delay(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_period(), Duration::from_secs(30));
    }

    #[test]
    fn socket_addr_combines_bind_addr_and_port() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.socket_addr().unwrap().port(), 8080);
    }
}
