//! Read-only snapshot of recently dispatched notifications.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use access::SubscriptionOptions;
use dispatch::NotificationResponse;

use crate::error::ServerError;
use crate::routes::api_key;
use crate::state::AppState;

/// `GET /__history`
///
/// Anonymous calls are allowed and always see the downgraded projection.
/// With a valid API key the ADVANCED_NOTIFICATIONS policy enables CREATE
/// passthrough. Provenance fields are never included.
pub async fn handle_history(
    State(state): State<Arc<AppState>>,
    params: Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let key = api_key(&headers, &params);

    let mut create_allowed = false;
    if !key.is_empty() {
        if let Err(err) = state.key_processor.validate(&key).await {
            return ServerError::from(err).into_response();
        }
        match state.policy_processor.subscription_options(&key).await {
            Ok(options) => create_allowed = options.receive_advanced_notifications,
            Err(err) => return ServerError::from(err).into_response(),
        }
    }

    let options = SubscriptionOptions {
        receive_advanced_notifications: create_allowed,
        ..Default::default()
    };
    let entries: Vec<NotificationResponse> = state
        .history
        .snapshot()
        .iter()
        .map(|n| NotificationResponse::from_notification(n, &options).strip_provenance())
        .collect();

    match serde_json::to_string(&entries) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                "application/json; charset=UTF-8",
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::warn!(error = %err, "serving /__history request failed");
            ServerError::from(err).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::health::HealthCheck;
    use crate::shutdown::ShutdownRegistry;
    use access::{KeyProcessor, PolicyProcessor, RuleTableEvaluator};
    use dispatch::{Dispatcher, History, Notification, CONTENT_CREATE_TYPE};
    use std::time::Duration;

    fn state_with_history() -> Arc<AppState> {
        let history = Arc::new(History::new(10));
        history.push(Notification {
            api_url: "test-api/content/3cc23068-e501-11e9-9743-db5a370481bc".to_string(),
            id: "http://www.ft.com/thing/3cc23068-e501-11e9-9743-db5a370481bc".to_string(),
            event_type: CONTENT_CREATE_TYPE.to_string(),
            publish_reference: "tid_history".to_string(),
            last_modified: "2019-10-02T15:13:19.52Z".to_string(),
            ..Default::default()
        });

        let dispatcher = Arc::new(Dispatcher::new(
            Duration::ZERO,
            Arc::clone(&history),
            Arc::new(RuleTableEvaluator::default()),
        ));
        let client = reqwest::Client::new();
        Arc::new(AppState {
            resource: "content".to_string(),
            dispatcher,
            history,
            key_processor: KeyProcessor::new("http://gateway.invalid/validate".into(), client.clone()),
            policy_processor: PolicyProcessor::new("http://gateway.invalid/policies".into(), client.clone()),
            health: HealthCheck::for_tests(client),
            heartbeat_period: Duration::from_secs(30),
            default_subscription_type: "Article".to_string(),
            supported_subscription_types: vec!["Article".to_string()],
            all_subscription_types: vec!["Article".to_string()],
            shutdown: ShutdownRegistry::new(),
        })
    }

    #[tokio::test]
    async fn anonymous_calls_see_the_downgraded_projection() {
        let state = state_with_history();
        let response = handle_history(State(state), Query(Vec::new()), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json; charset=UTF-8")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("/UPDATE"));
        assert!(!body.contains("/CREATE"));
        assert!(!body.contains("publishReference"));
    }

    #[tokio::test]
    async fn an_unreachable_gateway_fails_keyed_calls() {
        let state = state_with_history();
        let mut headers = HeaderMap::new();
        headers.insert("X-Api-Key", "some-api-key".parse().unwrap());
        let response = handle_history(State(state), Query(Vec::new()), headers).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
