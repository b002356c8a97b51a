//! Composite health checks and standard service plumbing.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::state::AppState;

const SERVICE_NAME: &str = "notifications-push";

/// Liveness/lag view of the message bus, implemented by the Kafka consumer.
/// The probes block on broker round trips, so callers run them on the
/// blocking pool.
pub trait BusMonitor: Send + Sync {
    fn connectivity_check(&self) -> Result<(), String>;
    fn lag_check(&self) -> Result<(), String>;
}

impl BusMonitor for consumer::MessageConsumer {
    fn connectivity_check(&self) -> Result<(), String> {
        consumer::MessageConsumer::connectivity_check(self).map_err(|err| err.to_string())
    }

    fn lag_check(&self) -> Result<(), String> {
        consumer::MessageConsumer::lag_check(self).map_err(|err| err.to_string())
    }
}

/// Composite readiness: the bus and the API gateway must both be reachable;
/// consumer lag is informational.
pub struct HealthCheck {
    bus: Option<Arc<dyn BusMonitor>>,
    gateway_gtg_url: String,
    client: reqwest::Client,
}

impl HealthCheck {
    pub fn new(bus: Arc<dyn BusMonitor>, gateway_gtg_url: String, client: reqwest::Client) -> Self {
        Self {
            bus: Some(bus),
            gateway_gtg_url,
            client,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(client: reqwest::Client) -> Self {
        Self {
            bus: None,
            gateway_gtg_url: "http://gateway.invalid/__gtg".to_string(),
            client,
        }
    }

    async fn check_bus_connectivity(&self) -> Result<(), String> {
        run_bus_probe(self.bus.clone(), |bus| bus.connectivity_check()).await
    }

    async fn check_bus_lag(&self) -> Result<(), String> {
        run_bus_probe(self.bus.clone(), |bus| bus.lag_check()).await
    }

    async fn check_gateway(&self) -> Result<(), String> {
        let resp = self
            .client
            .get(&self.gateway_gtg_url)
            .send()
            .await
            .map_err(|_| "Error making http request to GTG endpoint".to_string())?;

        // Forbidden still proves the gateway answers.
        if resp.status() == StatusCode::OK || resp.status() == StatusCode::FORBIDDEN {
            Ok(())
        } else {
            Err("Unable to verify ApiGateway service is working".to_string())
        }
    }

    /// Readiness verdict: bus reachable AND gateway reachable.
    pub async fn gtg(&self) -> Result<(), String> {
        self.check_bus_connectivity().await?;
        self.check_gateway().await?;
        Ok(())
    }

    /// Full report for the health endpoint.
    pub async fn report(&self) -> serde_json::Value {
        let bus = self.check_bus_connectivity().await;
        let lag = self.check_bus_lag().await;
        let gateway = self.check_gateway().await;
        let healthy = bus.is_ok() && gateway.is_ok();

        json!({
            "systemCode": SERVICE_NAME,
            "name": "Notifications Push",
            "description": "Checks if all the dependent services are reachable and healthy.",
            "ok": healthy,
            "checks": [
                check_entry(
                    "message-queue-reachable",
                    "MessageQueueReachable",
                    "Notifications about newly modified/published content will not reach this app, nor will they reach its clients.",
                    &bus,
                ),
                check_entry(
                    "message-queue-lag",
                    "MessageQueueLag",
                    "Notifications will reach subscribers with delay.",
                    &lag,
                ),
                check_entry(
                    "api-gateway-reachable",
                    "ApiGatewayReachable",
                    "Subscribers cannot be authenticated and no new push streams can be opened.",
                    &gateway,
                ),
            ],
        })
    }
}

async fn run_bus_probe<F>(bus: Option<Arc<dyn BusMonitor>>, probe: F) -> Result<(), String>
where
    F: FnOnce(&dyn BusMonitor) -> Result<(), String> + Send + 'static,
{
    let Some(bus) = bus else {
        return Err("message bus consumer not configured".to_string());
    };
    tokio::task::spawn_blocking(move || probe(bus.as_ref()))
        .await
        .map_err(|err| format!("health probe panicked: {err}"))?
}

fn check_entry(
    id: &str,
    name: &str,
    business_impact: &str,
    outcome: &Result<(), String>,
) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "ok": outcome.is_ok(),
        "businessImpact": business_impact,
        "checkOutput": match outcome {
            Ok(()) => "OK".to_string(),
            Err(msg) => msg.clone(),
        },
    })
}

/// `GET /__health`
pub async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health.report().await)
}

/// `GET /__gtg`
pub async fn handle_gtg(State(state): State<Arc<AppState>>) -> Response {
    match state.health.gtg().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason).into_response(),
    }
}

/// `GET /__ping`
pub async fn handle_ping() -> &'static str {
    "pong"
}

/// `GET /__build-info`
pub async fn handle_build_info() -> impl IntoResponse {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HealthyBus;

    impl BusMonitor for HealthyBus {
        fn connectivity_check(&self) -> Result<(), String> {
            Ok(())
        }

        fn lag_check(&self) -> Result<(), String> {
            Ok(())
        }
    }

    struct UnreachableBus;

    impl BusMonitor for UnreachableBus {
        fn connectivity_check(&self) -> Result<(), String> {
            Err("Error connecting to kafka queue".to_string())
        }

        fn lag_check(&self) -> Result<(), String> {
            Err("Error connecting to kafka queue".to_string())
        }
    }

    #[tokio::test]
    async fn gtg_fails_when_the_bus_is_unreachable() {
        let health = HealthCheck::new(
            Arc::new(UnreachableBus),
            "http://gateway.invalid/__gtg".to_string(),
            reqwest::Client::new(),
        );
        let err = health.gtg().await.unwrap_err();
        assert!(err.contains("kafka"));
    }

    #[tokio::test]
    async fn gtg_fails_when_the_gateway_is_unreachable() {
        let health = HealthCheck::new(
            Arc::new(HealthyBus),
            "http://gateway.invalid/__gtg".to_string(),
            reqwest::Client::new(),
        );
        let err = health.gtg().await.unwrap_err();
        assert!(err.contains("GTG endpoint"));
    }

    #[tokio::test]
    async fn report_lists_all_three_checks() {
        let health = HealthCheck::new(
            Arc::new(UnreachableBus),
            "http://gateway.invalid/__gtg".to_string(),
            reqwest::Client::new(),
        );
        let report = health.report().await;
        let checks = report["checks"].as_array().unwrap();
        assert_eq!(checks.len(), 3);
        assert_eq!(report["ok"], false);
        assert_eq!(checks[0]["id"], "message-queue-reachable");
        assert_eq!(checks[1]["id"], "message-queue-lag");
        assert_eq!(checks[2]["id"], "api-gateway-reachable");
    }
}
